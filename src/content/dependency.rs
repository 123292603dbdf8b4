//! Extraction and rewriting of dependency edges inside content bodies

use super::ContentItem;
use super::body::{BodyPath, PathStep};
use super::tree::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema URI of a content link
pub const CONTENT_LINK_SCHEMA: &str =
    "http://bigcontent.io/cms/schema/v1/core#/definitions/content-link";

/// Schema URI of a content reference
pub const CONTENT_REFERENCE_SCHEMA: &str =
    "http://bigcontent.io/cms/schema/v1/core#/definitions/content-reference";

/// Synthetic schema used for hierarchy parent edges
pub const HIERARCHY_SCHEMA: &str = "_hierarchy";

/// Kind of a dependency edge
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencySchema {
    /// Embedded content link; the linked item is delivered with its owner
    Link,
    /// Content reference; only the id is delivered
    Reference,
    /// Hierarchy parent declared in `_meta.hierarchy.parentId`
    Hierarchy,
}

impl DependencySchema {
    /// Schema identifier as it appears in bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencySchema::Link => CONTENT_LINK_SCHEMA,
            DependencySchema::Reference => CONTENT_REFERENCE_SCHEMA,
            DependencySchema::Hierarchy => HIERARCHY_SCHEMA,
        }
    }

    /// Recognise a link or reference schema URI
    pub fn from_schema_uri(uri: &str) -> Option<Self> {
        match uri {
            CONTENT_LINK_SCHEMA => Some(DependencySchema::Link),
            CONTENT_REFERENCE_SCHEMA => Some(DependencySchema::Reference),
            _ => None,
        }
    }
}

/// Target of a dependency edge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDependency {
    /// Edge kind
    pub schema: DependencySchema,
    /// Content type schema of the target
    pub content_type: String,
    /// Target id
    pub id: Option<String>,
}

/// A dependency found in an item body
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDependencyInfo {
    /// The edge target
    pub dependency: ContentDependency,
    /// Where the edge lives in the owner's body
    pub path: BodyPath,
    /// Graph node of the target, once resolved against a tree
    pub resolved: Option<NodeId>,
}

/// Recognise a link or reference object
///
/// Matches objects whose `_meta.schema` is a link or reference schema and that
/// carry string `contentType` and `id` members.
pub fn classify(value: &Value) -> Option<ContentDependency> {
    let object = value.as_object()?;
    let schema = object.get("_meta")?.get("schema")?.as_str()?;
    let schema = DependencySchema::from_schema_uri(schema)?;
    let content_type = object.get("contentType")?.as_str()?;
    let id = object.get("id")?.as_str()?;

    Some(ContentDependency {
        schema,
        content_type: content_type.to_string(),
        id: Some(id.to_string()),
    })
}

/// Walk a body and collect every value the classifier recognises
///
/// Recognised values are not descended into.
pub fn find_dependencies<F>(body: &Value, classifier: F) -> Vec<(ContentDependency, BodyPath)>
where
    F: Fn(&Value) -> Option<ContentDependency>,
{
    let mut found = Vec::new();
    let mut path = BodyPath::root();
    walk(body, &classifier, &mut path, &mut found);
    found
}

fn walk<F>(
    value: &Value,
    classifier: &F,
    path: &mut BodyPath,
    found: &mut Vec<(ContentDependency, BodyPath)>,
) where
    F: Fn(&Value) -> Option<ContentDependency>,
{
    if let Some(dependency) = classifier(value) {
        found.push((dependency, path.clone()));
        return;
    }

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                path.push(PathStep::Key(key.clone()));
                walk(child, classifier, path, found);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push(PathStep::Index(index));
                walk(child, classifier, path, found);
                path.pop();
            }
        }
        _ => {}
    }
}

/// All dependency edges of an item, including its hierarchy parent
pub fn identify_content_dependencies(item: &ContentItem) -> Vec<ContentDependencyInfo> {
    let mut dependencies: Vec<ContentDependencyInfo> = find_dependencies(&item.body, classify)
        .into_iter()
        .map(|(dependency, path)| ContentDependencyInfo {
            dependency,
            path,
            resolved: None,
        })
        .collect();

    if let Some(parent) = item.hierarchy_parent().filter(|p| !p.is_empty()) {
        dependencies.push(ContentDependencyInfo {
            dependency: ContentDependency {
                schema: DependencySchema::Hierarchy,
                content_type: String::new(),
                id: Some(parent.to_string()),
            },
            path: hierarchy_parent_path(),
            resolved: None,
        });
    }

    dependencies
}

/// Path of the hierarchy parent id inside a body
pub fn hierarchy_parent_path() -> BodyPath {
    BodyPath::keys(["_meta", "hierarchy", "parentId"])
}

/// Rewrite one edge of `body` to point at `id`, or remove it when `id` is `None`
///
/// Removing a link or reference deletes it from its parent object, or replaces
/// it with `null` inside an array. Removing a hierarchy edge deletes the parent id.
pub fn update_dependency(body: &mut Value, info: &ContentDependencyInfo, id: Option<&str>) {
    match (info.dependency.schema, id) {
        (_, None) => {
            info.path.remove(body);
        }
        (DependencySchema::Hierarchy, Some(id)) => {
            if let Some(slot) = info.path.get_mut(body) {
                *slot = Value::String(id.to_string());
            }
        }
        (_, Some(id)) => {
            if let Some(object) = info.path.get_mut(body).and_then(Value::as_object_mut) {
                object.insert("id".to_string(), Value::String(id.to_string()));
            }
        }
    }
}
