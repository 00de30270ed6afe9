//! The interface between the renderer and an output tree.

use std::fmt;

use crate::reactive::Value;

/// Opaque handle to a node owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u64);

impl NodeHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Node operations the renderer needs from an output tree.
///
/// `insert` has DOM semantics: inserting a node that already has a parent
/// moves it. An `anchor` of `None` appends.
pub trait NodeOps {
    fn create_element(&mut self, tag: &str) -> NodeHandle;

    fn create_text(&mut self, text: &str) -> NodeHandle;

    fn create_comment(&mut self, text: &str) -> NodeHandle;

    /// Replace the content of a text or comment node.
    fn set_text(&mut self, node: NodeHandle, text: &str);

    /// Replace all children of an element with `text`.
    fn set_element_text(&mut self, node: NodeHandle, text: &str);

    fn insert(&mut self, node: NodeHandle, parent: NodeHandle, anchor: Option<NodeHandle>);

    fn remove_child(&mut self, parent: NodeHandle, node: NodeHandle);

    fn parent_of(&self, node: NodeHandle) -> Option<NodeHandle>;

    fn next_sibling(&self, node: NodeHandle) -> Option<NodeHandle>;

    /// Apply a property change. `new` of `None` removes the property.
    fn patch_prop(&mut self, node: NodeHandle, key: &str, old: Option<&Value>, new: Option<&Value>);
}
