//! Dependency graph over a set of content items
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Construction extracts
//! every edge, resolves edges whose target is part of the set, then sorts the
//! nodes into acyclic levels (each level only depends on earlier ones) and an
//! ordered list of nodes that take part in, or depend on, a cycle.

use super::ContentItem;
use super::body::BodyPath;
use super::dependency::{ContentDependencyInfo, DependencySchema, identify_content_dependencies};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Index of a node inside a [`ContentDependencyTree`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Position in the tree's arena
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A content item together with the repository it was read from
#[derive(Clone, Debug, PartialEq)]
pub struct RepositoryContentItem {
    /// Repository id, when known
    pub repository: Option<String>,
    /// The item
    pub content: ContentItem,
}

impl From<ContentItem> for RepositoryContentItem {
    fn from(content: ContentItem) -> Self {
        Self {
            repository: None,
            content,
        }
    }
}

/// Reverse edge: `from` depends on the node holding this record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependantInfo {
    /// The node whose body contains the edge
    pub from: NodeId,
    /// Edge kind
    pub schema: DependencySchema,
    /// Where the edge lives in `from`'s body
    pub path: BodyPath,
}

/// A graph node
#[derive(Clone, Debug, PartialEq)]
pub struct ItemContentDependencies {
    /// This node's id
    pub id: NodeId,
    /// The item the node stands for
    pub owner: RepositoryContentItem,
    /// Outgoing edges
    pub dependencies: Vec<ContentDependencyInfo>,
    /// Incoming edges from other nodes of the tree
    pub dependants: Vec<DependantInfo>,
}

impl ItemContentDependencies {
    /// Content item id of the owner
    pub fn content_id(&self) -> &str {
        &self.owner.content.id
    }
}

/// How deeply a node is entangled in cycles
///
/// Nodes are extracted into the circular list in increasing stage order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CircularStage {
    /// Reaches no other unresolved node
    Standalone = 0,
    /// Part of a loop that is intertwined with other unresolved nodes
    Intertwined = 1,
    /// Leads into a circular loop it is not intertwined with
    Parent = 2,
}

/// Dependency graph of a set of content items
#[derive(Clone, Debug)]
pub struct ContentDependencyTree {
    nodes: Vec<ItemContentDependencies>,
    all: Vec<NodeId>,
    by_id: HashMap<String, NodeId>,
    levels: Vec<Vec<NodeId>>,
    circular_links: Vec<NodeId>,
    required_schema: Vec<String>,
}

impl ContentDependencyTree {
    /// Build the graph for `items`
    pub fn new<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RepositoryContentItem>,
    {
        let mut nodes: Vec<ItemContentDependencies> = items
            .into_iter()
            .enumerate()
            .map(|(index, owner)| {
                let owner = owner.into();
                ItemContentDependencies {
                    id: NodeId(index),
                    dependencies: identify_content_dependencies(&owner.content),
                    dependants: Vec::new(),
                    owner,
                }
            })
            .collect();

        let by_id: HashMap<String, NodeId> = nodes
            .iter()
            .map(|node| (node.content_id().to_string(), node.id))
            .collect();
        resolve_dependencies(&mut nodes, &by_id);

        let mut required_schema: Vec<String> = Vec::new();
        for node in &nodes {
            if let Some(schema) = node.owner.content.schema()
                && !required_schema.iter().any(|s| s == schema)
            {
                required_schema.push(schema.to_string());
            }
        }

        let mut tree = Self {
            all: nodes.iter().map(|node| node.id).collect(),
            nodes,
            by_id,
            levels: Vec::new(),
            circular_links: Vec::new(),
            required_schema,
        };

        let remaining = tree.stage_acyclic();
        tree.stage_circular(remaining);

        tracing::debug!(
            nodes = tree.nodes.len(),
            levels = tree.levels.len(),
            circular = tree.circular_links.len(),
            "Built content dependency tree"
        );
        tree
    }

    /// Fill `levels`; returns the nodes that could not be staged
    fn stage_acyclic(&mut self) -> Vec<NodeId> {
        let mut staged = vec![false; self.nodes.len()];
        let mut remaining = self.all.clone();

        while !remaining.is_empty() {
            let (stage, rest): (Vec<NodeId>, Vec<NodeId>) =
                remaining.iter().partition(|&&id| {
                    self.nodes[id.0]
                        .dependencies
                        .iter()
                        .all(|dep| dep.resolved.is_none_or(|target| staged[target.0]))
                });

            if stage.is_empty() {
                break;
            }
            for id in &stage {
                staged[id.0] = true;
            }
            self.levels.push(stage);
            remaining = rest;
        }

        remaining
    }

    /// Fill `circular_links` with the unstaged nodes, least entangled first
    fn stage_circular(&mut self, mut remaining: Vec<NodeId>) {
        while !remaining.is_empty() {
            let stages: Vec<CircularStage> = remaining
                .iter()
                .map(|&id| self.top_level_circular(id, &remaining))
                .collect();
            let Some(&chosen) = stages.iter().min() else {
                break;
            };

            let mut rest = Vec::with_capacity(remaining.len());
            for (id, stage) in remaining.into_iter().zip(stages) {
                if stage == chosen {
                    self.circular_links.push(id);
                } else {
                    rest.push(id);
                }
            }
            remaining = rest;
        }
    }

    fn top_level_circular(&self, top: NodeId, unresolved: &[NodeId]) -> CircularStage {
        let mut scan = CircularScan {
            tree: self,
            self_loop: false,
            intertwined_loop: false,
            is_parent: false,
        };
        let has_circular =
            scan.traverse(top, Some(top), 0, unresolved, &mut HashSet::new(), false);

        if !has_circular {
            CircularStage::Standalone
        } else if scan.intertwined_loop && scan.self_loop && !scan.is_parent {
            CircularStage::Intertwined
        } else {
            CircularStage::Parent
        }
    }

    /// Node by id
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this tree.
    pub fn node(&self, id: NodeId) -> &ItemContentDependencies {
        &self.nodes[id.0]
    }

    /// Node of a content item, unless it was removed
    pub fn get(&self, content_id: &str) -> Option<&ItemContentDependencies> {
        self.by_id.get(content_id).map(|id| &self.nodes[id.0])
    }

    /// Every node still in the tree, in input order
    pub fn all(&self) -> impl Iterator<Item = &ItemContentDependencies> {
        self.all.iter().map(|id| &self.nodes[id.0])
    }

    /// Ids of every node still in the tree
    pub fn node_ids(&self) -> &[NodeId] {
        &self.all
    }

    /// Acyclic levels; each level depends only on earlier ones
    pub fn levels(&self) -> &[Vec<NodeId>] {
        &self.levels
    }

    /// Nodes involved in or leading into cycles, in extraction order
    pub fn circular_links(&self) -> &[NodeId] {
        &self.circular_links
    }

    /// Distinct body schemas present in the tree
    pub fn required_schema(&self) -> &[String] {
        &self.required_schema
    }

    /// Number of nodes still in the tree
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Whether the tree has no nodes left
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Visit `start` and, transitively, every node depending on it
    ///
    /// Each node is visited once. With `only_links`, only link edges are followed.
    pub fn traverse_dependants<F>(&self, start: NodeId, only_links: bool, mut visitor: F)
    where
        F: FnMut(&ItemContentDependencies),
    {
        let mut traversed = HashSet::new();
        self.traverse_from(start, only_links, &mut visitor, &mut traversed);
    }

    fn traverse_from<F>(
        &self,
        id: NodeId,
        only_links: bool,
        visitor: &mut F,
        traversed: &mut HashSet<NodeId>,
    ) where
        F: FnMut(&ItemContentDependencies),
    {
        traversed.insert(id);
        let node = &self.nodes[id.0];
        visitor(node);

        for dependant in &node.dependants {
            if only_links && dependant.schema != DependencySchema::Link {
                continue;
            }
            if !traversed.contains(&dependant.from) {
                self.traverse_from(dependant.from, only_links, visitor, traversed);
            }
        }
    }

    /// Nodes whose dependant closure (including themselves) contains a match
    pub fn filter_any<F>(&self, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&ItemContentDependencies) -> bool,
    {
        self.all
            .iter()
            .copied()
            .filter(|&id| {
                let mut matched = false;
                self.traverse_dependants(id, false, |node| {
                    if predicate(node) {
                        matched = true;
                    }
                });
                matched
            })
            .collect()
    }

    /// Drop nodes from `all`, `levels`, `circular_links` and the id index
    ///
    /// Edges of the remaining nodes are left untouched.
    pub fn remove_content(&mut self, ids: &[NodeId]) {
        let removed: HashSet<NodeId> = ids.iter().copied().collect();

        for level in &mut self.levels {
            level.retain(|id| !removed.contains(id));
        }
        self.all.retain(|id| !removed.contains(id));
        self.circular_links.retain(|id| !removed.contains(id));

        for id in &removed {
            let content_id = self.nodes[id.0].content_id();
            if self.by_id.get(content_id) == Some(id) {
                self.by_id.remove(content_id);
            }
        }
    }
}

fn resolve_dependencies(nodes: &mut [ItemContentDependencies], by_id: &HashMap<String, NodeId>) {
    let mut reverse = Vec::new();
    for node in nodes.iter_mut() {
        for dep in &mut node.dependencies {
            let Some(target) = dep.dependency.id.as_ref().and_then(|id| by_id.get(id)) else {
                continue;
            };
            dep.resolved = Some(*target);
            reverse.push((
                *target,
                DependantInfo {
                    from: node.id,
                    schema: dep.dependency.schema,
                    path: dep.path.clone(),
                },
            ));
        }
    }

    for (target, dependant) in reverse {
        nodes[target.0].dependants.push(dependant);
    }
}

/// Simulated depth-first walk classifying one unresolved node
struct CircularScan<'t> {
    tree: &'t ContentDependencyTree,
    self_loop: bool,
    intertwined_loop: bool,
    is_parent: bool,
}

impl CircularScan<'_> {
    fn traverse(
        &mut self,
        top: NodeId,
        item: Option<NodeId>,
        depth: usize,
        unresolved: &[NodeId],
        seen: &mut HashSet<NodeId>,
        intertwined: bool,
    ) -> bool {
        let Some(item) = item else {
            return false;
        };
        if top == item && depth > 0 {
            self.self_loop = true;
            return false;
        }

        let mut has_circular = false;
        if top != item && unresolved.contains(&item) {
            if !intertwined {
                // Does the loop through `item` lead back to `top`?
                let stored_self_loop = self.self_loop;
                let child_intertwined =
                    self.traverse(item, Some(item), 0, &[top], &mut HashSet::new(), true);
                self.self_loop = stored_self_loop;

                if child_intertwined {
                    self.intertwined_loop = true;
                } else {
                    self.is_parent = true;
                }
            }
            has_circular = true;
        }

        if !seen.insert(item) {
            return false;
        }

        let tree = self.tree;
        for dep in &tree.nodes[item.0].dependencies {
            has_circular =
                self.traverse(top, dep.resolved, depth + 1, unresolved, seen, intertwined)
                    || has_circular;
        }
        has_circular
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{link, page, reference};
    use serde_json::json;

    fn ids(tree: &ContentDependencyTree, nodes: &[NodeId]) -> Vec<String> {
        let mut ids: Vec<String> = nodes
            .iter()
            .map(|id| tree.node(*id).content_id().to_string())
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn resolves_edges_and_dependants() {
        let tree = ContentDependencyTree::new(vec![
            page("a", json!({ "card": link("b"), "missing": link("zzz") })),
            page("b", json!({})),
        ]);

        let a = tree.get("a").unwrap();
        let b = tree.get("b").unwrap();

        assert_eq!(a.dependencies.len(), 2);
        assert_eq!(a.dependencies[0].resolved.or(a.dependencies[1].resolved), Some(b.id));
        assert!(
            a.dependencies.iter().any(|d| d.resolved.is_none()),
            "dangling edge stays unresolved"
        );
        assert_eq!(b.dependants.len(), 1);
        assert_eq!(b.dependants[0].from, a.id);
    }

    #[test]
    fn dangling_references_do_not_block_staging() {
        let tree = ContentDependencyTree::new(vec![page(
            "a",
            json!({ "card": reference("not-in-set") }),
        )]);

        assert_eq!(tree.levels().len(), 1);
        assert!(tree.circular_links().is_empty());
    }

    #[test]
    fn diamond_is_staged_by_depth() {
        let tree = ContentDependencyTree::new(vec![
            page("top", json!({ "l": link("left"), "r": link("right") })),
            page("left", json!({ "x": link("bottom") })),
            page("right", json!({ "x": reference("bottom") })),
            page("bottom", json!({})),
        ]);

        let levels: Vec<Vec<String>> = tree.levels().iter().map(|l| ids(&tree, l)).collect();
        assert_eq!(
            levels,
            vec![
                vec!["bottom".to_string()],
                vec!["left".to_string(), "right".to_string()],
                vec!["top".to_string()],
            ]
        );
    }

    #[test]
    fn self_loop_is_circular() {
        let tree = ContentDependencyTree::new(vec![page("a", json!({ "me": link("a") }))]);

        assert!(tree.levels().is_empty());
        assert_eq!(ids(&tree, tree.circular_links()), vec!["a"]);
    }

    #[test]
    fn loop_members_come_before_the_node_leading_into_them() {
        let tree = ContentDependencyTree::new(vec![
            page("entry", json!({ "x": link("a") })),
            page("a", json!({ "x": link("b") })),
            page("b", json!({ "x": link("a") })),
        ]);

        let circular: Vec<&str> = tree
            .circular_links()
            .iter()
            .map(|id| tree.node(*id).content_id())
            .collect();

        assert_eq!(circular.len(), 3);
        assert_eq!(circular.last(), Some(&"entry"), "parent of a loop is extracted last");
    }

    #[test]
    fn hierarchy_edges_order_children_after_parents() {
        let child = ContentItem::new(
            "child",
            json!({ "_meta": { "schema": "https://example.com/node", "hierarchy": { "parentId": "root" } } }),
        );
        let root = ContentItem::new("root", json!({ "_meta": { "schema": "https://example.com/node" } }));

        let tree = ContentDependencyTree::new(vec![child, root]);

        assert_eq!(ids(&tree, &tree.levels()[0]), vec!["root"]);
        assert_eq!(ids(&tree, &tree.levels()[1]), vec!["child"]);
        assert_eq!(tree.required_schema(), &["https://example.com/node".to_string()]);
    }

    #[test]
    fn traverse_dependants_visits_each_once() {
        let tree = ContentDependencyTree::new(vec![
            page("leaf", json!({})),
            page("mid", json!({ "x": link("leaf") })),
            page("top", json!({ "x": link("mid"), "y": reference("leaf") })),
        ]);

        let mut visited = Vec::new();
        tree.traverse_dependants(tree.get("leaf").unwrap().id, false, |node| {
            visited.push(node.content_id().to_string());
        });
        assert_eq!(visited.len(), 3);
        assert_eq!(visited[0], "leaf");

        let mut links_only = Vec::new();
        tree.traverse_dependants(tree.get("leaf").unwrap().id, true, |node| {
            links_only.push(node.content_id().to_string());
        });
        assert_eq!(links_only, vec!["leaf", "mid", "top"]);
    }

    #[test]
    fn filter_any_matches_dependant_closure() {
        let tree = ContentDependencyTree::new(vec![
            page("leaf", json!({})),
            page("mid", json!({ "x": link("leaf") })),
            page("archived", json!({ "x": link("mid") })),
            page("other", json!({})),
        ]);

        let matches = tree.filter_any(|node| node.content_id() == "archived");

        assert_eq!(ids(&tree, &matches), vec!["archived", "leaf", "mid"]);
    }

    #[test]
    fn remove_content_drops_nodes_everywhere() {
        let mut tree = ContentDependencyTree::new(vec![
            page("a", json!({ "x": link("b") })),
            page("b", json!({ "x": link("a") })),
            page("c", json!({})),
        ]);
        let a = tree.get("a").unwrap().id;
        let c = tree.get("c").unwrap().id;

        tree.remove_content(&[a, c]);

        assert_eq!(tree.len(), 1);
        assert!(tree.get("a").is_none());
        assert!(tree.get("c").is_none());
        assert!(tree.levels().iter().all(|level| !level.contains(&c)));
        assert!(!tree.circular_links().contains(&a));
        assert!(tree.get("b").is_some());
    }
}
