//! Dependency-first copy of a content graph
//!
//! [`deep_copy`] fetches every item reachable from the roots, lets a
//! [`ContentReplacer`] produce the item to use in place of each original, and
//! rewrites dependency edges so that replacements point at each other.
//! Dependencies are always replaced before the items that contain them.

use super::dependency::{identify_content_dependencies, update_dependency};
use super::{ContentItem, ContentSource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// What to do with an edge that points back into the current ancestor chain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CircularMode {
    /// Keep the edge's original id
    #[default]
    Ignore,
    /// Drop the edge, then rewrite the owner again once every item is mapped
    Repeat,
    /// Fail with [`Error::CyclicDependency`]
    Throw,
}

/// Produces the item used in place of an original
#[async_trait]
pub trait ContentReplacer: Send + Sync {
    /// Return (creating or updating as needed) the replacement for `original`
    ///
    /// `body` is a copy of the original body with dependency edges already
    /// rewritten to the replacements chosen so far.
    async fn replace(&self, original: &ContentItem, body: Value) -> Result<ContentItem>;

    /// Update `previous_id`, the first-pass replacement of `original`, once its
    /// circular edges can be resolved
    ///
    /// Other replacements already point at `previous_id`, so it stays the mapped
    /// id whatever this returns. Replacers that create a new item on every
    /// [`Self::replace`] call should override this to update in place.
    async fn repeat(
        &self,
        original: &ContentItem,
        previous_id: &str,
        body: Value,
    ) -> Result<ContentItem> {
        let _ = previous_id;
        self.replace(original, body).await
    }
}

/// State of one [`deep_copy`] call
struct DeepCopyContext {
    mode: CircularMode,
    cache: HashMap<String, ContentItem>,
    mapping: HashMap<String, String>,
    circular: Vec<String>,
    circular_seen: HashSet<String>,
}

impl DeepCopyContext {
    fn new(mode: CircularMode) -> Self {
        Self {
            mode,
            cache: HashMap::new(),
            mapping: HashMap::new(),
            circular: Vec::new(),
            circular_seen: HashSet::new(),
        }
    }

    fn defer(&mut self, owner: &str) {
        if self.circular_seen.insert(owner.to_string()) {
            self.circular.push(owner.to_string());
        }
    }
}

/// Copy the graph below `root_ids` and return the id mapping
///
/// Every visited id maps to the id of its replacement. Each id is fetched at
/// most once. Roots are processed in order.
pub async fn deep_copy<S, R>(
    root_ids: &[String],
    source: &S,
    replacer: &R,
    mode: CircularMode,
) -> Result<HashMap<String, String>>
where
    S: ContentSource + ?Sized,
    R: ContentReplacer + ?Sized,
{
    let mut ctx = DeepCopyContext::new(mode);

    for id in root_ids {
        let mut ancestors = vec![id.clone()];
        process_item(&mut ctx, source, replacer, id, &mut ancestors).await?;
    }

    if mode == CircularMode::Repeat && !ctx.circular.is_empty() {
        tracing::debug!(
            count = ctx.circular.len(),
            "Rewriting items with circular dependencies"
        );
        for owner in ctx.circular.clone() {
            let (Some(item), Some(previous)) =
                (ctx.cache.get(&owner).cloned(), ctx.mapping.get(&owner).cloned())
            else {
                continue;
            };
            let body = rewritten_body(&ctx, &item);
            let repeated = replacer.repeat(&item, &previous, body).await?;
            if repeated.id != previous {
                tracing::warn!(
                    content_id = %owner,
                    mapped_id = %previous,
                    repeated_id = %repeated.id,
                    "Repeat pass returned a different replacement, keeping the mapped one"
                );
            }
        }
    }

    Ok(ctx.mapping)
}

fn process_item<'a, S, R>(
    ctx: &'a mut DeepCopyContext,
    source: &'a S,
    replacer: &'a R,
    id: &'a str,
    ancestors: &'a mut Vec<String>,
) -> BoxFuture<'a, Result<()>>
where
    S: ContentSource + ?Sized,
    R: ContentReplacer + ?Sized,
{
    Box::pin(async move {
        if ctx.cache.contains_key(id) {
            return Ok(());
        }

        let item = source.fetch_item(id).await?;
        ctx.cache.insert(id.to_string(), item.clone());
        tracing::debug!(content_id = %item.id, "Visiting content item");

        for dep in identify_content_dependencies(&item) {
            let Some(dep_id) = dep.dependency.id else {
                continue;
            };

            if ancestors.contains(&dep_id) {
                match ctx.mode {
                    CircularMode::Throw => {
                        return Err(Error::CyclicDependency {
                            from: item.id.clone(),
                            to: dep_id,
                        });
                    }
                    CircularMode::Repeat | CircularMode::Ignore => {
                        tracing::debug!(from = %item.id, to = %dep_id, "Circular dependency");
                        ctx.defer(&item.id);
                    }
                }
                continue;
            }

            ancestors.push(dep_id.clone());
            let result = process_item(ctx, source, replacer, &dep_id, ancestors).await;
            ancestors.pop();
            result?;
        }

        rewrite_item(ctx, replacer, &item).await
    })
}

/// Copy of the item's body with edges rewritten from the current mapping
fn rewritten_body(ctx: &DeepCopyContext, item: &ContentItem) -> Value {
    let mut body = item.body.clone();

    for dep in identify_content_dependencies(item) {
        let Some(dep_id) = dep.dependency.id.as_deref() else {
            continue;
        };
        match ctx.mapping.get(dep_id) {
            Some(new_id) => update_dependency(&mut body, &dep, Some(new_id.as_str())),
            None if ctx.mode == CircularMode::Ignore => {}
            None => update_dependency(&mut body, &dep, None),
        }
    }
    body
}

/// Hand the rewritten item to the replacer and record its replacement
async fn rewrite_item<R>(ctx: &mut DeepCopyContext, replacer: &R, item: &ContentItem) -> Result<()>
where
    R: ContentReplacer + ?Sized,
{
    let body = rewritten_body(ctx, item);
    let replacement = replacer.replace(item, body).await?;
    ctx.mapping.insert(item.id.clone(), replacement.id);
    Ok(())
}
