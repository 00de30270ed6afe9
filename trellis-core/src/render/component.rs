//! Components
//!
//! A component vnode renders a sub tree produced by its definition's render
//! function. The render runs inside an effect, so whatever state or props it
//! reads become dependencies; a change queues a re-render through
//! [`queue_job`], and the host sees it on the next microtask drain.
//!
//! Props passed on the vnode are split in two. Names the definition declares
//! (and `on*` event handlers) become props; everything else becomes attrs.
//! Both live in shallow reactive records owned by the instance, so a parent
//! re-render that changes a prop re-renders the child, and one that changes
//! nothing does not.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::diff::check_tree_keys;
use super::host::{NodeHandle, NodeOps};
use super::memory::handler_name;
use super::renderer::{first_el, RendererInner};
use super::vnode::{Props, VNode, VNodeType};
use crate::error::{RenderError, RenderResult};
use crate::reactive::{
    effect_with, queue_job, reactive, shallow_reactive, untracked, Container, Effect, EffectOptions, PropKey,
    Reactive, Record, Target, Value,
};

type RenderFn = dyn Fn(&ComponentContext) -> VNode;

/// A component definition. Shared by every vnode that renders it; two
/// component vnodes patch into each other only if they share the same `Rc`.
pub struct ComponentDef {
    pub name: Rc<str>,
    /// Declared prop names.
    pub props: Vec<Rc<str>>,
    /// Builds the initial state. Must return a container.
    pub data: Option<Rc<dyn Fn() -> Value>>,
    pub render: Rc<RenderFn>,
}

impl ComponentDef {
    pub fn new<F>(name: &str, render: F) -> Self
    where
        F: Fn(&ComponentContext) -> VNode + 'static,
    {
        Self {
            name: Rc::from(name),
            props: Vec::new(),
            data: None,
            render: Rc::new(render),
        }
    }

    pub fn with_props(mut self, names: &[&str]) -> Self {
        self.props = names.iter().map(|name| Rc::from(*name)).collect();
        self
    }

    pub fn with_data<F>(mut self, data: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        self.data = Some(Rc::new(data));
        self
    }

    fn declares(&self, key: &str) -> bool {
        self.props.iter().any(|name| &**name == key)
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("name", &self.name)
            .field("props", &self.props)
            .field("data", &self.data.is_some())
            .finish()
    }
}

struct InstanceInner {
    def: Rc<ComponentDef>,
    state: Option<Reactive>,
    props: Reactive,
    attrs: Reactive,
    sub_tree: RefCell<Option<VNode>>,
    mounted: Cell<bool>,
    effect: RefCell<Option<Effect>>,
    /// Error from the first render, handed back to the mounting caller.
    mount_error: RefCell<Option<RenderError>>,
}

/// A mounted component.
///
/// Cloning shares the instance.
#[derive(Clone)]
pub struct ComponentInstance {
    inner: Rc<InstanceInner>,
}

impl ComponentInstance {
    pub fn name(&self) -> &str {
        &self.inner.def.name
    }

    /// The reactive state built by `data`, if the definition has one.
    pub fn state(&self) -> Option<Reactive> {
        self.inner.state.clone()
    }

    pub fn props(&self) -> Reactive {
        self.inner.props.clone()
    }

    pub fn attrs(&self) -> Reactive {
        self.inner.attrs.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.get()
    }

    /// The render effect, until the instance is torn down.
    pub fn effect(&self) -> Option<Effect> {
        self.inner.effect.borrow().clone()
    }

    /// A render context for this instance, as passed to the render function.
    pub fn context(&self) -> ComponentContext {
        ComponentContext {
            instance: self.clone(),
        }
    }

    /// Run `f` on the current sub tree. `None` while the instance has none,
    /// which includes the middle of a re-render.
    pub fn with_sub_tree<R>(&self, f: impl FnOnce(&VNode) -> R) -> Option<R> {
        self.inner.sub_tree.borrow().as_ref().map(f)
    }

    /// Stop the render effect and hand back the sub tree for unmounting.
    pub(crate) fn teardown(&self) -> Option<VNode> {
        if let Some(effect) = self.inner.effect.borrow_mut().take() {
            effect.stop();
        }
        self.inner.mounted.set(false);
        tracing::trace!(component = %self.inner.def.name, "component unmounted");
        self.inner.sub_tree.borrow_mut().take()
    }

    /// Render and patch the sub tree.
    ///
    /// On the first render the tree is mounted into `container` before
    /// `anchor`. Later renders patch in place, wherever the previous tree
    /// currently sits.
    fn update<H: NodeOps + 'static>(
        &self,
        renderer: &Rc<RendererInner<H>>,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) -> RenderResult<()> {
        let mut next = (self.inner.def.render)(&self.context());
        check_tree_keys(&next)?;
        let previous = self.inner.sub_tree.borrow_mut().take();

        let (container, anchor) = match &previous {
            Some(prev) => {
                let parent = first_el(prev).and_then(|el| renderer.host.borrow().parent_of(el));
                (parent.unwrap_or(container), renderer.next_sibling_after(prev))
            }
            None => (container, anchor),
        };

        let result = renderer.patch(previous, &mut next, container, anchor);
        *self.inner.sub_tree.borrow_mut() = Some(next);
        result
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("name", &self.inner.def.name)
            .field("mounted", &self.inner.mounted.get())
            .finish()
    }
}

/// What a render function sees: state, props and `emit`.
pub struct ComponentContext {
    instance: ComponentInstance,
}

impl ComponentContext {
    pub fn instance(&self) -> &ComponentInstance {
        &self.instance
    }

    /// Read `key` from the state, then from the props.
    ///
    /// Containers passed as props come back as reactive views. Unknown keys
    /// log an error and read as `Null`.
    pub fn get(&self, key: &str) -> Value {
        let inner = &self.instance.inner;
        if let Some(state) = &inner.state {
            if state.has(key) {
                return state.get(key);
            }
        }
        if inner.props.has(key) {
            return match inner.props.get(key) {
                Value::Target(target) => Value::Reactive(reactive(target)),
                other => other,
            };
        }
        tracing::error!(component = %inner.def.name, key, "property was accessed during render but is not defined");
        Value::Null
    }

    /// Write a state key. Props belong to the parent and are not writable.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let inner = &self.instance.inner;
        if let Some(state) = &inner.state {
            if untracked(|| state.has(key)) {
                return state.set(key, value);
            }
        }
        if untracked(|| inner.props.has(key)) {
            tracing::warn!(component = %inner.def.name, key, "attempting to mutate prop; props are readonly");
            return false;
        }
        tracing::error!(component = %inner.def.name, key, "attempting to set unknown property");
        false
    }

    /// Call the parent's `on<Event>` handler with `args`.
    pub fn emit(&self, event: &str, args: &[Value]) -> Value {
        let inner = &self.instance.inner;
        let name = handler_name(event);
        let handler = untracked(|| inner.props.get(name.as_str()));
        match handler.as_func() {
            Some(callback) => callback.call(args),
            None => {
                tracing::error!(component = %inner.def.name, event, "emitted event has no handler");
                Value::Null
            }
        }
    }

    pub fn state(&self) -> Option<Reactive> {
        self.instance.state()
    }

    pub fn props(&self) -> Reactive {
        self.instance.props()
    }

    pub fn attrs(&self) -> Reactive {
        self.instance.attrs()
    }
}

/// Split vnode props into declared props and attrs. Declared props the
/// vnode does not pass are present as `Null`.
fn resolve_props(def: &ComponentDef, raw: &Props) -> (Props, Props) {
    let mut props: Props = def.props.iter().map(|name| (name.clone(), Value::Null)).collect();
    let mut attrs = Props::new();
    for (key, value) in raw {
        if def.declares(key) || is_handler(key) {
            props.insert(key.clone(), value.clone());
        } else {
            attrs.insert(key.clone(), value.clone());
        }
    }
    (props, attrs)
}

fn is_handler(key: &str) -> bool {
    key.strip_prefix("on")
        .and_then(|rest| rest.chars().next())
        .is_some_and(char::is_uppercase)
}

fn record(fields: Props) -> Target {
    Target::new(Container::Record(Record::new(fields)))
}

fn has_props_changed(old: &Props, new: &Props) -> bool {
    old.len() != new.len() || new.iter().any(|(key, value)| old.get(key) != Some(value))
}

/// Bring a props record in line with `next`: delete missing keys, write
/// the rest. Unchanged values do not trigger.
fn sync_record(view: &Reactive, next: Props) {
    for key in view.own_keys() {
        if let PropKey::Name(name) = &key {
            if !next.contains_key(name) {
                view.delete(key);
            }
        }
    }
    for (key, value) in next {
        view.set(key, value);
    }
}

/// Create an instance for `vnode` and mount its first render.
pub(crate) fn mount_component<H: NodeOps + 'static>(
    renderer: &Rc<RendererInner<H>>,
    vnode: &mut VNode,
    container: NodeHandle,
    anchor: Option<NodeHandle>,
) -> RenderResult<()> {
    let VNodeType::Component(def) = vnode.kind.clone() else {
        return Ok(());
    };

    let (props, attrs) = resolve_props(&def, &vnode.props);
    let state = match untracked(|| def.data.as_ref().map(|data| data())) {
        Some(Value::Target(target)) => Some(reactive(target)),
        Some(Value::Reactive(view)) => Some(reactive(&view)),
        None | Some(Value::Null) => None,
        Some(other) => {
            tracing::error!(component = %def.name, value = ?other, "data() should return a container");
            None
        }
    };

    let instance = ComponentInstance {
        inner: Rc::new(InstanceInner {
            def: def.clone(),
            state,
            props: shallow_reactive(record(props)),
            attrs: shallow_reactive(record(attrs)),
            sub_tree: RefCell::new(None),
            mounted: Cell::new(false),
            effect: RefCell::new(None),
            mount_error: RefCell::new(None),
        }),
    };

    let renderer_ref: Weak<RendererInner<H>> = Rc::downgrade(renderer);
    let instance_ref = Rc::downgrade(&instance.inner);
    let body = move || {
        let (Some(renderer), Some(inner)) = (renderer_ref.upgrade(), instance_ref.upgrade()) else {
            return;
        };
        let instance = ComponentInstance { inner };
        let first = !instance.inner.mounted.replace(true);
        if let Err(err) = instance.update(&renderer, container, anchor) {
            if first {
                *instance.inner.mount_error.borrow_mut() = Some(err);
            } else {
                tracing::error!(component = %instance.inner.def.name, error = %err, "component re-render failed");
            }
        }
    };

    let effect = effect_with(body, EffectOptions::default().with_scheduler(queue_job));
    *instance.inner.effect.borrow_mut() = Some(effect);
    tracing::debug!(component = %def.name, "component mounted");

    let error = instance.inner.mount_error.borrow_mut().take();
    vnode.component = Some(instance);
    match error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Move the live instance from `old` to `new` and pass on changed props.
/// The re-render itself is queued by the props record.
pub(crate) fn patch_component(old: VNode, new: &mut VNode) {
    let Some(instance) = old.component else {
        tracing::warn!(kind = ?new.kind, "patching a component that was never mounted");
        return;
    };
    if has_props_changed(&old.props, &new.props) {
        let (props, attrs) = resolve_props(&instance.inner.def, &new.props);
        untracked(|| {
            sync_record(&instance.inner.props, props);
            sync_record(&instance.inner.attrs, attrs);
        });
    }
    new.component = Some(instance);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::flush_microtasks;
    use crate::render::memory::MemoryHost;
    use crate::render::renderer::Renderer;

    fn setup() -> (Renderer<MemoryHost>, NodeHandle) {
        let mut host = MemoryHost::new();
        let root = host.create_root();
        (Renderer::new(host), root)
    }

    fn counter() -> Rc<ComponentDef> {
        Rc::new(
            ComponentDef::new("Counter", |ctx| {
                let count = ctx.get("count").as_number().unwrap_or_default();
                VNode::element("p").with_text(&count.to_string())
            })
            .with_data(|| Value::record([("count", 0)])),
        )
    }

    fn label() -> Rc<ComponentDef> {
        Rc::new(
            ComponentDef::new("Label", |ctx| {
                let text = ctx.get("text");
                VNode::element("span").with_text(text.as_str().unwrap_or(""))
            })
            .with_props(&["text"]),
        )
    }

    fn instance_at(renderer: &Renderer<MemoryHost>, root: NodeHandle) -> ComponentInstance {
        renderer.root(root).and_then(|v| v.component).unwrap()
    }

    #[test]
    fn state_change_rerenders_on_flush() {
        let (renderer, root) = setup();
        renderer.render(Some(VNode::component(&counter())), root).unwrap();
        assert_eq!(renderer.host().inner_html(root), "<p>0</p>");

        let instance = instance_at(&renderer, root);
        let state = instance.state().unwrap();
        state.set("count", 1);
        state.set("count", 2);
        assert_eq!(renderer.host().inner_html(root), "<p>0</p>");

        flush_microtasks().unwrap();
        assert_eq!(renderer.host().inner_html(root), "<p>2</p>");
        assert_eq!(instance.effect().unwrap().run_count(), 2);
    }

    #[test]
    fn props_and_attrs_are_split() {
        let (renderer, root) = setup();
        let node = VNode::component(&label())
            .with_prop("text", "hi")
            .with_prop("title", "tip")
            .with_prop("onPick", Value::func(|_| Value::Null));
        renderer.render(Some(node), root).unwrap();

        let instance = instance_at(&renderer, root);
        assert_eq!(instance.props().get("text"), Value::from("hi"));
        assert!(instance.props().has("onPick"));
        assert!(!instance.props().has("title"));
        assert_eq!(instance.attrs().get("title"), Value::from("tip"));
    }

    #[test]
    fn changed_props_rerender_child() {
        let (renderer, root) = setup();
        let def = label();
        renderer.render(Some(VNode::component(&def).with_prop("text", "a")), root).unwrap();
        let effect = instance_at(&renderer, root).effect().unwrap();

        renderer.render(Some(VNode::component(&def).with_prop("text", "a")), root).unwrap();
        flush_microtasks().unwrap();
        assert_eq!(effect.run_count(), 1);

        renderer.render(Some(VNode::component(&def).with_prop("text", "b")), root).unwrap();
        assert_eq!(renderer.host().inner_html(root), "<span>a</span>");
        flush_microtasks().unwrap();
        assert_eq!(renderer.host().inner_html(root), "<span>b</span>");
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn emit_calls_parent_handler() {
        let (renderer, root) = setup();
        let picked = Rc::new(Cell::new(0.0));
        let sink = picked.clone();
        let node = VNode::component(&label()).with_prop(
            "onPick",
            Value::func(move |args| {
                sink.set(args.first().and_then(Value::as_number).unwrap_or_default());
                Value::from(true)
            }),
        );
        renderer.render(Some(node), root).unwrap();

        let ctx = instance_at(&renderer, root).context();
        assert_eq!(ctx.emit("pick", &[Value::from(7)]), Value::from(true));
        assert_eq!(picked.get(), 7.0);
        assert_eq!(ctx.emit("missing", &[]), Value::Null);
    }

    #[test]
    fn context_writes() {
        let (renderer, root) = setup();
        renderer.render(Some(VNode::component(&counter())), root).unwrap();
        let ctx = instance_at(&renderer, root).context();

        assert!(ctx.set("count", 5));
        assert_eq!(ctx.get("count"), Value::from(5));
        assert!(!ctx.set("nope", 1));
        assert_eq!(ctx.get("nope"), Value::Null);

        renderer.render(Some(VNode::component(&label()).with_prop("text", "x")), root).unwrap();
        let ctx = instance_at(&renderer, root).context();
        assert!(!ctx.set("text", "y"));
        assert_eq!(ctx.get("text"), Value::from("x"));
    }

    #[test]
    fn unmount_stops_render_effect() {
        let (renderer, root) = setup();
        renderer.render(Some(VNode::component(&counter())), root).unwrap();
        let instance = instance_at(&renderer, root);
        let effect = instance.effect().unwrap();

        renderer.render(None, root).unwrap();
        assert!(!effect.is_active());
        assert!(!instance.is_mounted());
        assert!(renderer.host().children(root).is_empty());

        instance.state().unwrap().set("count", 3);
        flush_microtasks().unwrap();
        assert_eq!(effect.run_count(), 1);
        assert!(renderer.host().children(root).is_empty());
    }

    #[test]
    fn rerender_stays_in_place_among_siblings() {
        let (renderer, root) = setup();
        let def = counter();
        let tree = |def: &Rc<ComponentDef>| {
            VNode::fragment(vec![VNode::text("["), VNode::component(def), VNode::text("]")])
        };
        renderer.render(Some(tree(&def)), root).unwrap();

        let instance = renderer.root(root).unwrap().children.nodes()[1].component.clone().unwrap();
        instance.state().unwrap().set("count", 9);
        flush_microtasks().unwrap();
        assert_eq!(renderer.host().inner_html(root), "[<p>9</p>]");
    }

    #[test]
    fn component_type_change_replaces_instance() {
        let (renderer, root) = setup();
        renderer.render(Some(VNode::component(&counter())), root).unwrap();
        let first = instance_at(&renderer, root).effect().unwrap();

        renderer.render(Some(VNode::component(&counter())), root).unwrap();
        assert!(!first.is_active());
        assert_eq!(renderer.host().inner_html(root), "<p>0</p>");
    }

    #[test]
    fn handler_detection() {
        assert!(is_handler("onClick"));
        assert!(!is_handler("once"));
        assert!(!is_handler("on"));
    }
}
