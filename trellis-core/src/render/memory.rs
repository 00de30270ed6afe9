//! In-memory host.
//!
//! [`MemoryHost`] keeps a real node tree with DOM insertion semantics and
//! logs every operation the renderer performs, so tests can assert both the
//! resulting tree and how many mounts, moves and removals it took.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;

use super::host::{NodeHandle, NodeOps};
use crate::reactive::Value;

/// One logged host operation.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateElement { node: NodeHandle, tag: Rc<str> },
    CreateText { node: NodeHandle, text: String },
    CreateComment { node: NodeHandle, text: String },
    SetText { node: NodeHandle, text: String },
    SetElementText { node: NodeHandle, text: String },
    /// A detached node was attached.
    Insert { node: NodeHandle, parent: NodeHandle, anchor: Option<NodeHandle> },
    /// An attached node was re-inserted elsewhere.
    Move { node: NodeHandle, parent: NodeHandle, anchor: Option<NodeHandle> },
    Remove { parent: NodeHandle, node: NodeHandle },
    PatchProp { node: NodeHandle, key: Rc<str>, old: Option<Value>, new: Option<Value> },
}

#[derive(Debug)]
enum NodeData {
    Element {
        tag: Rc<str>,
        props: IndexMap<Rc<str>, Value>,
        text: Option<String>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug)]
struct MemNode {
    data: NodeData,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
}

/// Counts of structural operations in the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    pub created: usize,
    pub inserted: usize,
    pub moved: usize,
    pub removed: usize,
    pub text_updates: usize,
    pub prop_updates: usize,
}

#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: HashMap<NodeHandle, MemNode>,
    next_id: u64,
    ops: Vec<HostOp>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, data: NodeData) -> NodeHandle {
        let handle = NodeHandle::new(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            handle,
            MemNode {
                data,
                parent: None,
                children: Vec::new(),
            },
        );
        handle
    }

    /// Create a detached container element. Not logged.
    pub fn create_root(&mut self) -> NodeHandle {
        self.alloc(NodeData::Element {
            tag: Rc::from("root"),
            props: IndexMap::new(),
            text: None,
        })
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    /// Drain the operation log.
    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn counts(&self) -> OpCounts {
        let mut counts = OpCounts::default();
        for op in &self.ops {
            match op {
                HostOp::CreateElement { .. } | HostOp::CreateText { .. } | HostOp::CreateComment { .. } => {
                    counts.created += 1
                }
                HostOp::Insert { .. } => counts.inserted += 1,
                HostOp::Move { .. } => counts.moved += 1,
                HostOp::Remove { .. } => counts.removed += 1,
                HostOp::SetText { .. } | HostOp::SetElementText { .. } => counts.text_updates += 1,
                HostOp::PatchProp { .. } => counts.prop_updates += 1,
            }
        }
        counts
    }

    pub fn children(&self, node: NodeHandle) -> &[NodeHandle] {
        self.nodes.get(&node).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn contains(&self, node: NodeHandle) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn tag(&self, node: NodeHandle) -> Option<&str> {
        match &self.nodes.get(&node)?.data {
            NodeData::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn prop(&self, node: NodeHandle, key: &str) -> Option<&Value> {
        match &self.nodes.get(&node)?.data {
            NodeData::Element { props, .. } => props.get(key),
            _ => None,
        }
    }

    /// Concatenated text of `node` and its descendants.
    pub fn text_content(&self, node: NodeHandle) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeHandle, out: &mut String) {
        let Some(n) = self.nodes.get(&node) else {
            return;
        };
        match &n.data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Comment(_) => {}
            NodeData::Element { text: Some(text), .. } => out.push_str(text),
            NodeData::Element { text: None, .. } => {
                for child in &n.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Markup-like rendering of the children of `node`, for assertions.
    pub fn inner_html(&self, node: NodeHandle) -> String {
        let mut out = String::new();
        if let Some(n) = self.nodes.get(&node) {
            if let NodeData::Element { text: Some(text), .. } = &n.data {
                out.push_str(text);
            }
            for child in &n.children {
                self.serialize(*child, &mut out);
            }
        }
        out
    }

    fn serialize(&self, node: NodeHandle, out: &mut String) {
        let Some(n) = self.nodes.get(&node) else {
            return;
        };
        match &n.data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Comment(text) => {
                let _ = write!(out, "<!--{text}-->");
            }
            NodeData::Element { tag, props, .. } => {
                let _ = write!(out, "<{tag}");
                for (key, value) in props {
                    if let Some(attr) = attr_text(value) {
                        let _ = write!(out, " {key}=\"{attr}\"");
                    }
                }
                out.push('>');
                out.push_str(&self.inner_html(node));
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    /// Call the `on<Event>` handler registered on `node`, if any.
    pub fn dispatch(&self, node: NodeHandle, event: &str, args: &[Value]) -> Option<Value> {
        let key = handler_name(event);
        match self.prop(node, &key)? {
            Value::Func(handler) => Some(handler.call(args)),
            _ => None,
        }
    }

    fn detach(&mut self, node: NodeHandle) -> bool {
        let Some(parent) = self.nodes.get_mut(&node).and_then(|n| n.parent.take()) else {
            return false;
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != node);
        }
        true
    }
}

/// `click` -> `onClick`.
pub(crate) fn handler_name(event: &str) -> String {
    let mut chars = event.chars();
    match chars.next() {
        Some(first) => format!("on{}{}", first.to_uppercase(), chars.as_str()),
        None => "on".to_string(),
    }
}

fn attr_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Func(_) | Value::Bool(false) => None,
        Value::Bool(true) => Some(String::new()),
        Value::Number(n) => Some(n.to_string()),
        Value::Str(s) => Some(s.to_string()),
        Value::Target(_) | Value::Reactive(_) => Some(value.to_json().to_string()),
    }
}

impl NodeOps for MemoryHost {
    fn create_element(&mut self, tag: &str) -> NodeHandle {
        let tag: Rc<str> = Rc::from(tag);
        let node = self.alloc(NodeData::Element {
            tag: tag.clone(),
            props: IndexMap::new(),
            text: None,
        });
        self.ops.push(HostOp::CreateElement { node, tag });
        node
    }

    fn create_text(&mut self, text: &str) -> NodeHandle {
        let node = self.alloc(NodeData::Text(text.to_string()));
        self.ops.push(HostOp::CreateText {
            node,
            text: text.to_string(),
        });
        node
    }

    fn create_comment(&mut self, text: &str) -> NodeHandle {
        let node = self.alloc(NodeData::Comment(text.to_string()));
        self.ops.push(HostOp::CreateComment {
            node,
            text: text.to_string(),
        });
        node
    }

    fn set_text(&mut self, node: NodeHandle, text: &str) {
        if let Some(n) = self.nodes.get_mut(&node) {
            match &mut n.data {
                NodeData::Text(content) | NodeData::Comment(content) => *content = text.to_string(),
                NodeData::Element { .. } => {}
            }
        }
        self.ops.push(HostOp::SetText {
            node,
            text: text.to_string(),
        });
    }

    fn set_element_text(&mut self, node: NodeHandle, text: &str) {
        let children = self
            .nodes
            .get_mut(&node)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in children {
            if let Some(c) = self.nodes.get_mut(&child) {
                c.parent = None;
            }
        }
        if let Some(NodeData::Element { text: content, .. }) = self.nodes.get_mut(&node).map(|n| &mut n.data) {
            *content = (!text.is_empty()).then(|| text.to_string());
        }
        self.ops.push(HostOp::SetElementText {
            node,
            text: text.to_string(),
        });
    }

    fn insert(&mut self, node: NodeHandle, parent: NodeHandle, anchor: Option<NodeHandle>) {
        let moved = self.detach(node);
        if let Some(p) = self.nodes.get_mut(&parent) {
            let at = anchor
                .and_then(|a| p.children.iter().position(|c| *c == a))
                .unwrap_or(p.children.len());
            p.children.insert(at, node);
        }
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent = Some(parent);
        }
        self.ops.push(if moved {
            HostOp::Move { node, parent, anchor }
        } else {
            HostOp::Insert { node, parent, anchor }
        });
    }

    fn remove_child(&mut self, parent: NodeHandle, node: NodeHandle) {
        self.detach(node);
        self.ops.push(HostOp::Remove { parent, node });
    }

    fn parent_of(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(&node)?.parent
    }

    fn next_sibling(&self, node: NodeHandle) -> Option<NodeHandle> {
        let parent = self.parent_of(node)?;
        let siblings = self.children(parent);
        let at = siblings.iter().position(|c| *c == node)?;
        siblings.get(at + 1).copied()
    }

    fn patch_prop(&mut self, node: NodeHandle, key: &str, old: Option<&Value>, new: Option<&Value>) {
        let key: Rc<str> = Rc::from(key);
        if let Some(NodeData::Element { props, .. }) = self.nodes.get_mut(&node).map(|n| &mut n.data) {
            match new {
                Some(value) if !value.is_null() => {
                    props.insert(key.clone(), value.clone());
                }
                _ => {
                    props.shift_remove(&key);
                }
            }
        }
        self.ops.push(HostOp::PatchProp {
            node,
            key,
            old: old.cloned(),
            new: new.cloned(),
        });
    }
}
