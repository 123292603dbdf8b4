use super::*;
use serde_json::json;

mod api;

#[test]
fn task_page_deserializes_connector_shape() {
    let page: TaskPage = serde_json::from_value(json!({
        "current_page_number": 1,
        "total_result_pages_count": 1,
        "total_records_count": 2,
        "tasks_list": [
            {
                "task_id": 11,
                "unique_identifier": "a7c1",
                "status": "Completed",
                "target_locale": { "locale": "de-DE", "locale_display_name": "German" },
                "source_locale": { "locale": "en-GB", "locale_display_name": "English" },
                "name": "Homepage",
                "job_id": 4,
                "is_error": 0
            },
            {
                "task_id": 12,
                "status": "In Progress",
                "target_locale": { "locale": "fr-FR" }
            }
        ]
    }))
    .unwrap();

    assert_eq!(page.tasks_list.len(), 2);
    assert!(page.tasks_list[0].is_completed());
    assert!(!page.tasks_list[1].is_completed());
    assert_eq!(page.tasks_list[0].target_locale.locale_display_name, "German");
    assert_eq!(page.tasks_list[1].unique_identifier, "");
}

#[test]
fn payload_serializes_source_file_shape() {
    let payload = TranslatedPayload {
        translations: vec![TranslationEntry::new("title", json!("Hello"))],
        nested: HashMap::from([(
            "n1".to_string(),
            vec![TranslationEntry::new("text", json!("World"))],
        )]),
        label: Some("Home".to_string()),
        context_url: None,
    };

    let value = serde_json::to_value(&payload).unwrap();

    assert_eq!(
        value,
        json!({
            "translations": [{ "key": "title", "value": "Hello" }],
            "nested": { "n1": [{ "key": "text", "value": "World" }] },
            "label": "Home"
        })
    );
}
