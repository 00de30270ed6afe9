//! Renderer
//!
//! Mounts, patches and unmounts vnode trees against a [`NodeOps`] host.
//!
//! # How Patching Works
//!
//! 1. Nodes of different type (or different component definitions) are
//!    never patched into each other: the old node is unmounted and the new
//!    one mounted in its place.
//!
//! 2. Same-type nodes reuse the host node. Elements patch their props (set
//!    new and changed ones, clear removed ones) and then their children.
//!
//! 3. Children move between three shapes: none, text and a node list. Two
//!    node lists go through the keyed diff (see `diff`).
//!
//! Each container remembers the last tree rendered into it, so `render`
//! only needs the new tree.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use serde::Deserialize;

use super::component;
use super::diff::{check_tree_keys, DiffStrategy};
use super::host::{NodeHandle, NodeOps};
use super::vnode::{Children, VNode, VNodeType};
use crate::error::{RenderError, RenderResult};

/// Renderer settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RendererOptions {
    /// Algorithm used for keyed children.
    pub diff: DiffStrategy,
}

pub(crate) struct RendererInner<H> {
    pub(crate) host: RefCell<H>,
    pub(crate) options: RendererOptions,
    roots: RefCell<HashMap<NodeHandle, VNode>>,
}

/// Renders vnode trees into a host.
///
/// Cloning shares the host and the remembered trees.
pub struct Renderer<H: NodeOps + 'static> {
    inner: Rc<RendererInner<H>>,
}

impl<H: NodeOps + 'static> Clone for Renderer<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H: NodeOps + 'static> Renderer<H> {
    pub fn new(host: H) -> Self {
        Self::with_options(host, RendererOptions::default())
    }

    pub fn with_options(host: H, options: RendererOptions) -> Self {
        Self {
            inner: Rc::new(RendererInner {
                host: RefCell::new(host),
                options,
                roots: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Render `vnode` into `container`, patching against whatever was
    /// rendered there before. `None` unmounts the previous tree.
    ///
    /// A tree with duplicate sibling keys is rejected before anything is
    /// touched; the previous tree stays mounted.
    pub fn render(&self, vnode: Option<VNode>, container: NodeHandle) -> RenderResult<()> {
        if let Some(next) = &vnode {
            check_tree_keys(next)?;
        }
        let previous = self.inner.roots.borrow_mut().remove(&container);
        match vnode {
            Some(mut next) => {
                let result = self.inner.patch(previous, &mut next, container, None);
                self.inner.roots.borrow_mut().insert(container, next);
                result
            }
            None => {
                if let Some(previous) = previous {
                    self.inner.unmount(previous);
                }
                Ok(())
            }
        }
    }

    /// The tree last rendered into `container`.
    pub fn root(&self, container: NodeHandle) -> Option<VNode> {
        self.inner.roots.borrow().get(&container).cloned()
    }

    pub fn host(&self) -> Ref<'_, H> {
        self.inner.host.borrow()
    }

    pub fn host_mut(&self) -> RefMut<'_, H> {
        self.inner.host.borrow_mut()
    }

    pub fn options(&self) -> &RendererOptions {
        &self.inner.options
    }
}

impl<H: NodeOps + 'static> RendererInner<H> {
    /// Patch `old` into `new`, mounting `new` if there is no old node.
    pub(crate) fn patch(
        self: &Rc<Self>,
        old: Option<VNode>,
        new: &mut VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) -> RenderResult<()> {
        let old = match old {
            Some(old) if !old.kind.same(&new.kind) => {
                let anchor = self.next_sibling_after(&old).or(anchor);
                self.unmount(old);
                return self.mount(new, container, anchor);
            }
            other => other,
        };
        let Some(old) = old else {
            return self.mount(new, container, anchor);
        };

        match new.kind.clone() {
            VNodeType::Element(_) => self.patch_element(old, new),
            VNodeType::Text | VNodeType::Comment => {
                let el = self.expect_el(&old)?;
                new.el = Some(el);
                if old.content() != new.content() {
                    self.host.borrow_mut().set_text(el, new.content());
                }
                Ok(())
            }
            VNodeType::Fragment => {
                let anchor = self.next_sibling_after(&old).or(anchor);
                let mut old_children = old.children;
                let old_children = take_fragment_children(&mut old_children);
                let mut children = take_fragment_children(&mut new.children);
                let result = self.patch_child_list(old_children, &mut children, container, anchor);
                new.children = Children::Nodes(children);
                result
            }
            VNodeType::Component(_) => {
                component::patch_component(old, new);
                Ok(())
            }
        }
    }

    /// Create host nodes for `vnode` and insert them before `anchor`.
    pub(crate) fn mount(
        self: &Rc<Self>,
        vnode: &mut VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) -> RenderResult<()> {
        match vnode.kind.clone() {
            VNodeType::Element(tag) => {
                let el = self.host.borrow_mut().create_element(&tag);
                vnode.el = Some(el);

                match &mut vnode.children {
                    Children::Text(text) => self.host.borrow_mut().set_element_text(el, text),
                    Children::Nodes(children) => self.mount_children(children, el, None)?,
                    Children::None => {}
                }

                for (key, value) in &vnode.props {
                    self.host.borrow_mut().patch_prop(el, key, None, Some(value));
                }

                self.host.borrow_mut().insert(el, container, anchor);
                Ok(())
            }
            VNodeType::Text => {
                let el = self.host.borrow_mut().create_text(vnode.content());
                vnode.el = Some(el);
                self.host.borrow_mut().insert(el, container, anchor);
                Ok(())
            }
            VNodeType::Comment => {
                let el = self.host.borrow_mut().create_comment(vnode.content());
                vnode.el = Some(el);
                self.host.borrow_mut().insert(el, container, anchor);
                Ok(())
            }
            VNodeType::Fragment => {
                let mut children = take_fragment_children(&mut vnode.children);
                let result = self.mount_children(&mut children, container, anchor);
                vnode.children = Children::Nodes(children);
                result
            }
            VNodeType::Component(_) => component::mount_component(self, vnode, container, anchor),
        }
    }

    pub(crate) fn mount_children(
        self: &Rc<Self>,
        children: &mut [VNode],
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) -> RenderResult<()> {
        super::diff::check_keys(children)?;
        for child in children.iter_mut() {
            self.mount(child, container, anchor)?;
        }
        Ok(())
    }

    fn patch_element(self: &Rc<Self>, old: VNode, new: &mut VNode) -> RenderResult<()> {
        let el = self.expect_el(&old)?;
        new.el = Some(el);

        {
            let mut host = self.host.borrow_mut();
            for (key, value) in &new.props {
                let previous = old.props.get(key);
                if previous != Some(value) {
                    host.patch_prop(el, key, previous, Some(value));
                }
            }
            for (key, value) in &old.props {
                if !new.props.contains_key(key) {
                    host.patch_prop(el, key, Some(value), None);
                }
            }
        }

        self.patch_children(old.children, &mut new.children, el)
    }

    /// Move between children shapes of an element.
    fn patch_children(self: &Rc<Self>, old: Children, new: &mut Children, el: NodeHandle) -> RenderResult<()> {
        match (old, new) {
            (Children::Nodes(old), Children::Nodes(new)) => self.patch_child_list(old, new, el, None),
            (old, Children::Nodes(new)) => {
                if matches!(old, Children::Text(_)) {
                    self.host.borrow_mut().set_element_text(el, "");
                }
                self.mount_children(new, el, None)
            }
            (Children::Text(old), Children::Text(new)) => {
                if old != *new {
                    self.host.borrow_mut().set_element_text(el, new);
                }
                Ok(())
            }
            (old, Children::Text(new)) => {
                if let Children::Nodes(old) = old {
                    for child in old {
                        self.unmount(child);
                    }
                }
                self.host.borrow_mut().set_element_text(el, new);
                Ok(())
            }
            (Children::Nodes(old), Children::None) => {
                for child in old {
                    self.unmount(child);
                }
                Ok(())
            }
            (Children::Text(_), Children::None) => {
                self.host.borrow_mut().set_element_text(el, "");
                Ok(())
            }
            (Children::None, Children::None) => Ok(()),
        }
    }

    /// Remove `vnode`'s host nodes and stop any component inside it.
    pub(crate) fn unmount(self: &Rc<Self>, vnode: VNode) {
        match vnode.kind {
            VNodeType::Fragment => {
                if let Children::Nodes(children) = vnode.children {
                    for child in children {
                        self.unmount(child);
                    }
                }
            }
            VNodeType::Component(_) => {
                if let Some(instance) = vnode.component {
                    if let Some(sub_tree) = instance.teardown() {
                        self.unmount(sub_tree);
                    }
                }
            }
            VNodeType::Element(_) | VNodeType::Text | VNodeType::Comment => {
                if let Children::Nodes(children) = vnode.children {
                    for child in children {
                        release(child);
                    }
                }
                let Some(el) = vnode.el else {
                    return;
                };
                let mut host = self.host.borrow_mut();
                if let Some(parent) = host.parent_of(el) {
                    host.remove_child(parent, el);
                }
            }
        }
    }

    /// Insert all of `vnode`'s host nodes before `anchor`.
    pub(crate) fn move_node(&self, vnode: &VNode, container: NodeHandle, anchor: Option<NodeHandle>) {
        match &vnode.kind {
            VNodeType::Fragment => {
                for child in vnode.children.nodes() {
                    self.move_node(child, container, anchor);
                }
            }
            VNodeType::Component(_) => {
                if let Some(instance) = &vnode.component {
                    instance.with_sub_tree(|sub_tree| self.move_node(sub_tree, container, anchor));
                }
            }
            _ => {
                if let Some(el) = vnode.el {
                    self.host.borrow_mut().insert(el, container, anchor);
                }
            }
        }
    }

    /// The host node that follows everything `vnode` rendered.
    pub(crate) fn next_sibling_after(&self, vnode: &VNode) -> Option<NodeHandle> {
        let last = last_el(vnode)?;
        self.host.borrow().next_sibling(last)
    }

    fn expect_el(&self, vnode: &VNode) -> RenderResult<NodeHandle> {
        vnode
            .el
            .ok_or_else(|| RenderError::MissingHandle(format!("{:?}", vnode.kind)))
    }
}

/// First host node rendered by `vnode`, if it rendered any.
pub(crate) fn first_el(vnode: &VNode) -> Option<NodeHandle> {
    match &vnode.kind {
        VNodeType::Fragment => vnode.children.nodes().iter().find_map(first_el),
        VNodeType::Component(_) => vnode
            .component
            .as_ref()
            .and_then(|instance| instance.with_sub_tree(first_el).flatten()),
        _ => vnode.el,
    }
}

/// Last host node rendered by `vnode`, if it rendered any.
pub(crate) fn last_el(vnode: &VNode) -> Option<NodeHandle> {
    match &vnode.kind {
        VNodeType::Fragment => vnode.children.nodes().iter().rev().find_map(last_el),
        VNodeType::Component(_) => vnode
            .component
            .as_ref()
            .and_then(|instance| instance.with_sub_tree(last_el).flatten()),
        _ => vnode.el,
    }
}

/// Stop the components below a node whose host subtree is removed wholesale.
fn release(vnode: VNode) {
    match vnode.kind {
        VNodeType::Component(_) => {
            if let Some(sub_tree) = vnode.component.and_then(|instance| instance.teardown()) {
                release(sub_tree);
            }
        }
        _ => {
            if let Children::Nodes(children) = vnode.children {
                for child in children {
                    release(child);
                }
            }
        }
    }
}

/// Fragments only hold node lists; anything else renders nothing.
fn take_fragment_children(children: &mut Children) -> Vec<VNode> {
    match std::mem::take(children) {
        Children::Nodes(nodes) => nodes,
        Children::None => Vec::new(),
        Children::Text(_) => {
            tracing::warn!("fragment children must be a node list; ignoring text");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::memory::MemoryHost;

    fn setup() -> (Renderer<MemoryHost>, NodeHandle) {
        let mut host = MemoryHost::new();
        let root = host.create_root();
        (Renderer::new(host), root)
    }

    #[test]
    fn mounts_element_tree() {
        let (renderer, root) = setup();
        let tree = VNode::element("div")
            .with_prop("id", "app")
            .with_children(vec![VNode::element("p").with_text("hi"), VNode::text("!")]);
        renderer.render(Some(tree), root).unwrap();
        assert_eq!(renderer.host().inner_html(root), "<div id=\"app\"><p>hi</p>!</div>");
    }

    #[test]
    fn patches_props() {
        let (renderer, root) = setup();
        let v1 = VNode::element("div").with_prop("a", 1).with_prop("b", 2);
        renderer.render(Some(v1), root).unwrap();
        renderer.host_mut().clear_ops();

        let v2 = VNode::element("div").with_prop("a", 1).with_prop("c", 3);
        renderer.render(Some(v2), root).unwrap();
        assert_eq!(renderer.host().counts().prop_updates, 2);
        assert_eq!(renderer.host().inner_html(root), "<div a=\"1\" c=\"3\"></div>");
    }

    #[test]
    fn children_shape_transitions() {
        let (renderer, root) = setup();
        let text = || VNode::element("div").with_text("t");
        let nodes = || VNode::element("div").with_children(vec![VNode::element("span")]);

        renderer.render(Some(text()), root).unwrap();
        renderer.render(Some(nodes()), root).unwrap();
        assert_eq!(renderer.host().inner_html(root), "<div><span></span></div>");
        renderer.render(Some(text()), root).unwrap();
        assert_eq!(renderer.host().inner_html(root), "<div>t</div>");
        renderer.render(Some(VNode::element("div")), root).unwrap();
        assert_eq!(renderer.host().inner_html(root), "<div></div>");
    }

    #[test]
    fn type_change_replaces_in_place() {
        let (renderer, root) = setup();
        let v1 = VNode::fragment(vec![
            VNode::element("a").with_key(1),
            VNode::element("b").with_key(2),
            VNode::element("c").with_key(3),
        ]);
        renderer.render(Some(v1), root).unwrap();
        let v2 = VNode::fragment(vec![
            VNode::element("a").with_key(1),
            VNode::element("i").with_key(2),
            VNode::element("c").with_key(3),
        ]);
        renderer.render(Some(v2), root).unwrap();
        assert_eq!(renderer.host().inner_html(root), "<a></a><i></i><c></c>");
    }

    #[test]
    fn text_nodes_update_in_place() {
        let (renderer, root) = setup();
        renderer.render(Some(VNode::text("one")), root).unwrap();
        let el = renderer.root(root).and_then(|v| v.el);
        renderer.render(Some(VNode::text("two")), root).unwrap();
        assert_eq!(renderer.root(root).and_then(|v| v.el), el);
        assert_eq!(renderer.host().text_content(root), "two");
    }

    #[test]
    fn render_none_unmounts() {
        let (renderer, root) = setup();
        let tree = VNode::fragment(vec![VNode::text("a"), VNode::comment("c")]);
        renderer.render(Some(tree), root).unwrap();
        renderer.render(None, root).unwrap();
        assert!(renderer.host().children(root).is_empty());
        assert!(renderer.root(root).is_none());
    }
}
