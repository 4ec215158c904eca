//! Read-only graph walks
//!
//! Descendant searches are depth-first pre-order with children visited in
//! their stored order, so results are reproducible for a fixed tree shape.
//! Stale handles behave like empty trees.

use crate::graph::SceneGraph;
use crate::id::NodeId;
use crate::node::SceneNode;

/// Pre-order iterator over a subtree, root included
#[derive(Debug)]
pub struct Descendants<'g> {
    graph: &'g SceneGraph,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.graph.children(id).iter().rev().copied());
        Some(id)
    }
}

/// Iterator over strict ancestors, nearest first
#[derive(Debug)]
pub struct Ancestors<'g> {
    graph: &'g SceneGraph,
    current: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let parent = self.graph.parent(self.current?)?;
        self.current = Some(parent);
        Some(parent)
    }
}

/// Walk `root` and its descendants in pre-order
#[must_use]
pub fn descendants(graph: &SceneGraph, root: NodeId) -> Descendants<'_> {
    let stack = if graph.contains(root) {
        vec![root]
    } else {
        Vec::new()
    };
    Descendants { graph, stack }
}

/// Walk the parents of `node` up to the root
#[must_use]
pub fn ancestors(graph: &SceneGraph, node: NodeId) -> Ancestors<'_> {
    Ancestors {
        graph,
        current: Some(node),
    }
}

/// First node in the subtree of `root` (root included) matching `predicate`
pub fn find_object<P>(graph: &SceneGraph, root: NodeId, predicate: P) -> Option<NodeId>
where
    P: Fn(&SceneNode) -> bool,
{
    descendants(graph, root).find(|id| graph.node(*id).is_some_and(&predicate))
}

/// Every node in the subtree of `root` matching `predicate`, in pre-order
pub fn find_all<P>(graph: &SceneGraph, root: NodeId, predicate: P) -> Vec<NodeId>
where
    P: Fn(&SceneNode) -> bool,
{
    descendants(graph, root)
        .filter(|id| graph.node(*id).is_some_and(&predicate))
        .collect()
}

/// Node with `key` in the subtree of `root`
#[must_use]
pub fn find_by_key(graph: &SceneGraph, root: NodeId, key: &str) -> Option<NodeId> {
    find_object(graph, root, |node| node.key().as_str() == key)
}

/// Nearest strict ancestor of `node` matching `predicate`
///
/// A detached or destroyed `node` has no ancestors.
pub fn find_ancestor<P>(graph: &SceneGraph, node: NodeId, predicate: P) -> Option<NodeId>
where
    P: Fn(&SceneNode) -> bool,
{
    ancestors(graph, node).find(|id| graph.node(*id).is_some_and(&predicate))
}

/// `node` itself if it matches, otherwise its nearest matching ancestor
pub fn find_nearest<P>(graph: &SceneGraph, node: NodeId, predicate: P) -> Option<NodeId>
where
    P: Fn(&SceneNode) -> bool,
{
    if graph.node(node).is_some_and(&predicate) {
        return Some(node);
    }
    find_ancestor(graph, node, predicate)
}

/// Root of the tree containing `node`; `None` for stale handles
#[must_use]
pub fn root_of(graph: &SceneGraph, node: NodeId) -> Option<NodeId> {
    if !graph.contains(node) {
        return None;
    }
    Some(ancestors(graph, node).last().unwrap_or(node))
}
