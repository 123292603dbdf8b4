//! Building the source file for a new submission
//!
//! The source file lists, per content item, the values of the fields that are
//! sent for translation. The root item's values go into
//! [`TranslatedPayload::translations`]; values of nested items in the source
//! locale are grouped under their item id in [`TranslatedPayload::nested`].

use super::{TranslatedPayload, TranslationEntry};
use crate::content::{
    CircularMode, ContentDependencyTree, ContentItem, ContentReplacer, ContentSource,
    ItemContentDependencies, classify, deep_copy,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Translatable top-level fields, keyed by content schema
///
/// # Example JSON
///
/// ```json
/// { "https://example.com/page": ["title", "summary"] }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TranslatableFields(HashMap<String, Vec<String>>);

impl TranslatableFields {
    /// No translatable fields
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `fields` for `schema`
    pub fn with<I, S>(mut self, schema: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(schema.into())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Fields configured for `schema`
    pub fn for_schema(&self, schema: &str) -> &[String] {
        self.0.get(schema).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether no schema has fields
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

/// Keeps every item as is and records the visit order
struct Collector {
    visited: Mutex<Vec<ContentItem>>,
}

#[async_trait]
impl ContentReplacer for Collector {
    async fn replace(&self, original: &ContentItem, _body: Value) -> Result<ContentItem> {
        self.visited
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(original.clone());
        Ok(original.clone())
    }
}

fn field_entries(item: &ContentItem, fields: &TranslatableFields) -> Vec<TranslationEntry> {
    let Some(schema) = item.schema() else {
        return Vec::new();
    };

    fields
        .for_schema(schema)
        .iter()
        .filter_map(|field| {
            let value = item.body.get(field)?;
            if value.is_null() || classify(value).is_some() {
                return None;
            }
            Some(TranslationEntry::new(field.clone(), value.clone()))
        })
        .collect()
}

/// Collect the translatable values of `root_id` and everything it links to
///
/// Nested items take part only when their locale is `source_locale`. Items whose
/// schema has no configured fields contribute nothing.
pub async fn collect_source_payload<S>(
    content: &S,
    root_id: &str,
    source_locale: &str,
    fields: &TranslatableFields,
) -> Result<TranslatedPayload>
where
    S: ContentSource + ?Sized,
{
    let collector = Collector {
        visited: Mutex::new(Vec::new()),
    };
    deep_copy(
        &[root_id.to_string()],
        content,
        &collector,
        CircularMode::Ignore,
    )
    .await?;
    let visited = collector
        .visited
        .into_inner()
        .unwrap_or_else(|e| e.into_inner());

    let root = visited
        .iter()
        .find(|item| item.id == root_id)
        .ok_or_else(|| Error::NotFound(format!("content item {root_id}")))?;

    let mut payload = TranslatedPayload {
        translations: field_entries(root, fields),
        label: Some(root.label.clone()).filter(|label| !label.is_empty()),
        ..Default::default()
    };

    for item in visited.iter().filter(|item| item.id != root_id) {
        if item.locale.as_deref() != Some(source_locale) {
            continue;
        }
        let entries = field_entries(item, fields);
        if !entries.is_empty() {
            payload.nested.insert(item.id.clone(), entries);
        }
    }

    tracing::debug!(
        root_id,
        items = visited.len(),
        root_fields = payload.translations.len(),
        nested = payload.nested.len(),
        "Collected source payload"
    );
    Ok(payload)
}

/// Remove every node that a matching node depends on, directly or not
///
/// A node matches when the predicate holds for it or for anything that
/// depends on it. Returns the content ids of the removed nodes.
pub fn prune_selection<F>(tree: &mut ContentDependencyTree, predicate: F) -> Vec<String>
where
    F: Fn(&ItemContentDependencies) -> bool,
{
    let matched = tree.filter_any(predicate);
    let ids: Vec<String> = matched
        .iter()
        .map(|&id| tree.node(id).content_id().to_string())
        .collect();
    tree.remove_content(&matched);
    ids
}
