use super::*;
use crate::config::TaskApiConfig;
use crate::error::Error;
use crate::tasks::api::{API_KEY_HEADER, HttpTaskApi};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client(server: &MockServer) -> HttpTaskApi {
    HttpTaskApi::new(&TaskApiConfig {
        base_url: format!("{}/api/v3", server.uri()),
        api_key: "secret".to_string(),
        connector_key: "conn-1".to_string(),
        page_size: 25,
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn download_sends_key_and_returns_raw_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/task/download"))
        .and(header(API_KEY_HEADER, "secret"))
        .and(query_param("task_id", "17"))
        .and(query_param("connector_key", "conn-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"translations":[]}"#))
        .expect(1)
        .mount(&server)
        .await;

    let body = client(&server).await.download_task(17).await.unwrap();

    assert_eq!(body, r#"{"translations":[]}"#);
}

#[tokio::test]
async fn metadata_is_sent_for_a_single_task() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v3/task/metadata"))
        .and(body_json(json!({
            "task_ids": [5],
            "task_metadata": { "localizedId": "abc" },
            "connector_key": "conn-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response_data": {} })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .await
        .update_task_metadata(5, json!({ "localizedId": "abc" }))
        .await
        .unwrap();
}

#[tokio::test]
async fn confirm_cancel_and_error_post_task_id() {
    let server = MockServer::start().await;
    let task_body = json!({ "task_id": 9, "connector_key": "conn-1" });
    Mock::given(method("POST"))
        .and(path("/api/v3/task/download/confirm"))
        .and(body_json(&task_body))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v3/task/cancel"))
        .and(body_json(&task_body))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v3/task/error"))
        .and(body_json(json!({
            "task_id": 9,
            "error_message": "Status 400: bad",
            "error_stacktrace": "",
            "connector_key": "conn-1"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server).await;
    api.confirm_download(9).await.unwrap();
    api.cancel_task(9).await.unwrap();
    api.error_task(9, "Status 400: bad").await.unwrap();
}

#[tokio::test]
async fn task_pages_are_unwrapped_from_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/submission/tasks"))
        .and(query_param("submission_id", "3"))
        .and(query_param("page_number", "2"))
        .and(query_param("page_size", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response_data": {
                "current_page_number": 2,
                "total_result_pages_count": 2,
                "total_records_count": 26,
                "tasks_list": [
                    { "task_id": 40, "status": "Completed", "target_locale": { "locale": "de-DE" } }
                ]
            }
        })))
        .mount(&server)
        .await;

    let page = client(&server).await.get_tasks(3, 2).await.unwrap();

    assert_eq!(page.total_records_count, 26);
    assert_eq!(page.tasks_list[0].task_id, 40);
    assert_eq!(page.tasks_list[0].target_locale.locale, "de-DE");
}

#[tokio::test]
async fn error_status_carries_body_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/task/download"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({ "status": 404, "message": "Task not found" })),
        )
        .mount(&server)
        .await;

    let err = client(&server).await.download_task(1).await.unwrap_err();

    match &err {
        Error::Api {
            status,
            message,
            body,
        } => {
            assert_eq!(*status, 404);
            assert_eq!(message, "Task not found");
            assert!(body.is_some());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.display_message(), "Status 404: Task not found");
}

#[tokio::test]
async fn error_without_body_uses_reason_phrase() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/task/cancel"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server).await.cancel_task(1).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Api { status: 503, ref message, body: None } if message == "Service Unavailable"
    ));
}

#[test]
fn invalid_base_url_is_a_config_error() {
    let err = HttpTaskApi::new(&TaskApiConfig {
        base_url: "not a url".to_string(),
        ..Default::default()
    })
    .unwrap_err();

    assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "api.base_url"));
}
