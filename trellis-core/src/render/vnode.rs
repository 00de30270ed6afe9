//! Rendered nodes.
//!
//! A [`VNode`] describes one node of the output tree. After mounting, it
//! also remembers the host node it produced (`el`) and, for component
//! nodes, the live component instance. Patching moves both from the old
//! vnode to the new one.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::component::{ComponentDef, ComponentInstance};
use super::host::NodeHandle;
use crate::reactive::Value;

/// Sibling identity used by the keyed diff.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(Rc<str>),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{n}"),
            Key::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Int(n.into())
    }
}

impl From<usize> for Key {
    fn from(n: usize) -> Self {
        Key::Int(n as i64)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(Rc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(Rc::from(s))
    }
}

impl From<char> for Key {
    fn from(c: char) -> Self {
        Key::Str(Rc::from(c.to_string()))
    }
}

/// Element properties, in insertion order.
pub type Props = IndexMap<Rc<str>, Value>;

/// What a vnode renders to.
#[derive(Clone)]
pub enum VNodeType {
    Element(Rc<str>),
    Text,
    Comment,
    /// A group of siblings with no wrapper node of its own.
    Fragment,
    Component(Rc<ComponentDef>),
}

impl VNodeType {
    /// Whether a node of type `other` can be patched into one of this type.
    /// Components match by definition identity.
    pub fn same(&self, other: &VNodeType) -> bool {
        match (self, other) {
            (VNodeType::Element(a), VNodeType::Element(b)) => a == b,
            (VNodeType::Text, VNodeType::Text) => true,
            (VNodeType::Comment, VNodeType::Comment) => true,
            (VNodeType::Fragment, VNodeType::Fragment) => true,
            (VNodeType::Component(a), VNodeType::Component(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for VNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VNodeType::Element(tag) => write!(f, "<{tag}>"),
            VNodeType::Text => f.write_str("#text"),
            VNodeType::Comment => f.write_str("#comment"),
            VNodeType::Fragment => f.write_str("#fragment"),
            VNodeType::Component(def) => write!(f, "<{}/>", def.name),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum Children {
    #[default]
    None,
    Text(Rc<str>),
    Nodes(Vec<VNode>),
}

impl Children {
    pub fn is_none(&self) -> bool {
        matches!(self, Children::None)
    }

    pub fn nodes(&self) -> &[VNode] {
        match self {
            Children::Nodes(nodes) => nodes,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct VNode {
    pub kind: VNodeType,
    pub key: Option<Key>,
    pub props: Props,
    pub children: Children,
    /// Host node, once mounted. Unset for fragments and components.
    pub el: Option<NodeHandle>,
    /// Live instance, once a component node is mounted.
    pub component: Option<ComponentInstance>,
}

impl VNode {
    fn new(kind: VNodeType, children: Children) -> Self {
        Self {
            kind,
            key: None,
            props: Props::new(),
            children,
            el: None,
            component: None,
        }
    }

    pub fn element(tag: &str) -> Self {
        Self::new(VNodeType::Element(Rc::from(tag)), Children::None)
    }

    pub fn text(content: &str) -> Self {
        Self::new(VNodeType::Text, Children::Text(Rc::from(content)))
    }

    pub fn comment(content: &str) -> Self {
        Self::new(VNodeType::Comment, Children::Text(Rc::from(content)))
    }

    pub fn fragment(children: Vec<VNode>) -> Self {
        Self::new(VNodeType::Fragment, Children::Nodes(children))
    }

    pub fn component(def: &Rc<ComponentDef>) -> Self {
        Self::new(VNodeType::Component(def.clone()), Children::None)
    }

    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.props.insert(Rc::from(key), value.into());
        self
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    pub fn with_children(mut self, children: Vec<VNode>) -> Self {
        self.children = Children::Nodes(children);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children = Children::Text(Rc::from(text));
        self
    }

    /// Text content of a text or comment node.
    pub fn content(&self) -> &str {
        match &self.children {
            Children::Text(text) => text,
            _ => "",
        }
    }

    /// Same type and same key: the diff may patch one into the other.
    pub fn is_same(&self, other: &VNode) -> bool {
        self.kind.same(&other.kind) && self.key == other.key
    }
}
