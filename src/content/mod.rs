//! Content items, their dependency graph and the deep-copy engine
//!
//! The remote content service is reached only through [`ContentSource`] and
//! [`ContentClient`]; everything else in this module is pure graph and JSON work
//! over owned [`serde_json::Value`] bodies.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod body;
pub mod deep_copy;
pub mod dependency;
pub mod tree;

pub use body::{BodyPath, PathStep};
pub use deep_copy::{CircularMode, ContentReplacer, deep_copy};
pub use dependency::{
    ContentDependency, ContentDependencyInfo, DependencySchema, classify,
    identify_content_dependencies, update_dependency,
};
pub use tree::{
    CircularStage, ContentDependencyTree, DependantInfo, ItemContentDependencies, NodeId,
    RepositoryContentItem,
};

/// A content item as stored by the content service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    /// Item id
    pub id: String,
    /// Human-readable label
    #[serde(default)]
    pub label: String,
    /// Primary locale, if one has been assigned
    #[serde(default)]
    pub locale: Option<String>,
    /// JSON body, including the `_meta` block
    #[serde(default)]
    pub body: Value,
    /// Optimistic concurrency version
    #[serde(default)]
    pub version: Option<i64>,
    /// Workflow state id
    #[serde(default)]
    pub workflow_state: Option<String>,
}

impl ContentItem {
    /// Create an item with an id and body and no locale
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            locale: None,
            body,
            version: None,
            workflow_state: None,
        }
    }

    /// Builder-style locale assignment
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Builder-style label assignment
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Content type schema declared in `_meta.schema`
    pub fn schema(&self) -> Option<&str> {
        self.meta()?.get("schema")?.as_str()
    }

    /// Delivery key declared in `_meta.deliveryKey`
    pub fn delivery_key(&self) -> Option<&str> {
        self.meta()?.get("deliveryKey")?.as_str()
    }

    /// Hierarchy parent declared in `_meta.hierarchy.parentId`
    pub fn hierarchy_parent(&self) -> Option<&str> {
        self.meta()?.get("hierarchy")?.get("parentId")?.as_str()
    }

    fn meta(&self) -> Option<&Value> {
        self.body.get("_meta")
    }
}

/// Pagination details returned with a page of results
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Zero-based page number
    pub number: u32,
    /// Requested page size
    pub size: u32,
    /// Total number of elements across all pages
    pub total_elements: u64,
    /// Total number of pages
    pub total_pages: u32,
}

/// One page of results from the content service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Position of this page
    pub page: PageInfo,
}

/// Read access to content items by id
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the latest version of an item
    async fn fetch_item(&self, id: &str) -> Result<ContentItem>;
}

/// Operations the apply pipeline performs against the content service
#[async_trait]
pub trait ContentClient: ContentSource {
    /// One page of the localized copies of `item`
    async fn localizations(&self, item: &ContentItem, page: u32, size: u32)
    -> Result<Page<ContentItem>>;

    /// Request localized copies of `item` for `locales`
    ///
    /// Creation is asynchronous: the copies appear in [`Self::localizations`]
    /// some time after this returns.
    async fn localize(&self, item: &ContentItem, locales: &[String]) -> Result<()>;

    /// Assign a primary locale to an item that has none
    async fn set_locale(&self, item: &ContentItem, locale: &str) -> Result<ContentItem>;

    /// Store a new body for an item
    ///
    /// Fails with [`crate::Error::VersionConflict`] when `item.version` is stale.
    async fn update_item(&self, item: &ContentItem) -> Result<ContentItem>;

    /// Move an item to a workflow state
    async fn assign_workflow_state(&self, item: &ContentItem, state_id: &str)
    -> Result<ContentItem>;
}

/// Every localized copy of `item`, following pagination to the end
pub async fn all_localizations<C>(
    client: &C,
    item: &ContentItem,
    page_size: u32,
) -> Result<Vec<ContentItem>>
where
    C: ContentClient + ?Sized,
{
    let mut all = Vec::new();
    let mut page_number = 0;
    loop {
        let page = client
            .localizations(item, page_number, page_size.max(1))
            .await?;
        let received = page.items.len();
        all.extend(page.items);

        page_number += 1;
        if received == 0
            || page_number >= page.page.total_pages
            || all.len() as u64 >= page.page.total_elements
        {
            break;
        }
    }
    Ok(all)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MemoryContent;
    use serde_json::json;

    #[test]
    fn meta_accessors() {
        let item = ContentItem::new(
            "a",
            json!({
                "_meta": {
                    "schema": "https://example.com/banner",
                    "deliveryKey": "home-banner",
                    "hierarchy": { "parentId": "root" }
                }
            }),
        );

        assert_eq!(item.schema(), Some("https://example.com/banner"));
        assert_eq!(item.delivery_key(), Some("home-banner"));
        assert_eq!(item.hierarchy_parent(), Some("root"));
        assert_eq!(ContentItem::new("b", json!({})).schema(), None);
    }

    #[test]
    fn deserializes_camel_case() {
        let item: ContentItem = serde_json::from_value(json!({
            "id": "x",
            "label": "Banner",
            "locale": "en-GB",
            "body": { "title": "Hi" },
            "version": 3,
            "workflowState": "ready"
        }))
        .unwrap();

        assert_eq!(item.workflow_state.as_deref(), Some("ready"));
        assert_eq!(item.version, Some(3));
    }

    #[tokio::test]
    async fn all_localizations_follows_pages() {
        let content = MemoryContent::new();
        let source = content.insert(ContentItem::new("src", json!({})).with_locale("en-GB"));
        for locale in ["de-DE", "fr-FR", "es-ES", "it-IT", "nl-NL"] {
            content.insert_localization(&source, locale, json!({}));
        }

        let all = all_localizations(&content, &source, 2).await.unwrap();

        assert_eq!(all.len(), 5);
        assert_eq!(content.localization_page_requests(), 3);
    }
}
