//! Integration Tests for the Renderer
//!
//! These tests drive the renderer through the in-memory host and assert
//! the exact host operations the keyed diff performs.

use std::rc::Rc;

use trellis_core::reactive::{flush_microtasks, Value};
use trellis_core::render::{
    ComponentDef, DiffStrategy, HostOp, MemoryHost, NodeHandle, Renderer, RendererOptions, VNode,
};
use trellis_core::RenderError;

fn keyed(keys: &str) -> VNode {
    VNode::element("ul").with_children(
        keys.chars()
            .map(|c| VNode::element("li").with_key(c).with_text(&c.to_string()))
            .collect(),
    )
}

fn mounted(keys: &str) -> (Renderer<MemoryHost>, NodeHandle) {
    let mut host = MemoryHost::new();
    let root = host.create_root();
    let renderer = Renderer::new(host);
    renderer.render(Some(keyed(keys)), root).unwrap();
    renderer.host_mut().clear_ops();
    (renderer, root)
}

/// Host handles of the list items, in rendered order.
fn items(renderer: &Renderer<MemoryHost>, root: NodeHandle) -> (NodeHandle, Vec<NodeHandle>) {
    let tree = renderer.root(root).unwrap();
    let ul = tree.el.unwrap();
    let lis = tree.children.nodes().iter().map(|li| li.el.unwrap()).collect();
    (ul, lis)
}

/// Swapping two middle items is a single move; the ends are untouched.
#[test]
fn swap_is_one_move() {
    let (renderer, root) = mounted("abcd");
    let (_, before) = items(&renderer, root);

    renderer.render(Some(keyed("acbd")), root).unwrap();
    let (ul, after) = items(&renderer, root);

    assert_eq!(after, vec![before[0], before[2], before[1], before[3]]);
    assert_eq!(
        renderer.host().ops(),
        &[HostOp::Move {
            node: before[2],
            parent: ul,
            anchor: Some(before[1]),
        }]
    );
    assert_eq!(renderer.host().children(ul), after.as_slice());
}

/// Inserting into the middle mounts one node and moves nothing.
#[test]
fn insert_only() {
    let (renderer, root) = mounted("ab");
    let (_, before) = items(&renderer, root);

    renderer.render(Some(keyed("axb")), root).unwrap();
    let (ul, after) = items(&renderer, root);

    let counts = renderer.host().counts();
    assert_eq!((counts.inserted, counts.moved, counts.removed), (1, 0, 0));
    assert!(renderer.host().ops().contains(&HostOp::Insert {
        node: after[1],
        parent: ul,
        anchor: Some(before[1]),
    }));
    assert_eq!(renderer.host().text_content(root), "axb");
}

/// Removing from the middle removes one node and moves nothing.
#[test]
fn remove_only() {
    let (renderer, root) = mounted("axb");
    let (_, before) = items(&renderer, root);

    renderer.render(Some(keyed("ab")), root).unwrap();
    let (ul, _) = items(&renderer, root);

    assert_eq!(
        renderer.host().ops(),
        &[HostOp::Remove {
            parent: ul,
            node: before[1],
        }]
    );
}

/// Host nodes survive any reorder; only their positions change.
#[test]
fn reorders_reuse_host_nodes() {
    let cases = [
        ("abcdefg", "gfedcba"),
        ("abcdefg", "bdfaceg"),
        ("abcdefg", "xaybzc"),
        ("abc", "cab"),
        ("", "abc"),
        ("abc", ""),
    ];
    for strategy in [DiffStrategy::Fast, DiffStrategy::DoubleEnded] {
        for (from, to) in cases {
            let mut host = MemoryHost::new();
            let root = host.create_root();
            let renderer = Renderer::with_options(host, RendererOptions { diff: strategy });
            renderer.render(Some(keyed(from)), root).unwrap();
            let (_, before) = items(&renderer, root);

            renderer.render(Some(keyed(to)), root).unwrap();
            assert_eq!(renderer.host().text_content(root), to, "{strategy:?}: {from} -> {to}");

            let (_, after) = items(&renderer, root);
            for (i, c) in to.chars().enumerate() {
                if let Some(j) = from.find(c) {
                    assert_eq!(after[i], before[j], "{strategy:?}: {c} was recreated");
                }
            }
        }
    }
}

/// The fast diff never moves more nodes than the double-ended one.
#[test]
fn fast_diff_moves_no_more_than_double_ended() {
    let cases = [("abcdefgh", "hgfedcba"), ("abcdefgh", "bcdefgha"), ("abcdefgh", "aghbcdef"), ("abcdef", "fbcdea")];
    for (from, to) in cases {
        let moves = |strategy| {
            let mut host = MemoryHost::new();
            let root = host.create_root();
            let renderer = Renderer::with_options(host, RendererOptions { diff: strategy });
            renderer.render(Some(keyed(from)), root).unwrap();
            renderer.host_mut().clear_ops();
            renderer.render(Some(keyed(to)), root).unwrap();
            let moved = renderer.host().counts().moved;
            moved
        };
        assert!(moves(DiffStrategy::Fast) <= moves(DiffStrategy::DoubleEnded), "{from} -> {to}");
    }
}

#[test]
fn duplicate_keys_are_an_error() {
    let mut host = MemoryHost::new();
    let root = host.create_root();
    let renderer = Renderer::new(host);
    let err = renderer.render(Some(keyed("aba")), root).unwrap_err();
    assert!(matches!(err, RenderError::DuplicateKey(_)));
}

/// A rejected tree leaves the previous one mounted and patchable.
#[test]
fn rejected_render_keeps_previous_tree() {
    let (renderer, root) = mounted("ab");
    let (ul, before) = items(&renderer, root);

    let err = renderer.render(Some(keyed("aa")), root).unwrap_err();
    assert!(matches!(err, RenderError::DuplicateKey(_)));
    assert!(renderer.host().ops().is_empty());
    assert_eq!(renderer.host().inner_html(root), "<ul><li>a</li><li>b</li></ul>");

    renderer.render(Some(keyed("ba")), root).unwrap();
    let (_, after) = items(&renderer, root);
    assert_eq!(after, vec![before[1], before[0]]);
    assert_eq!(renderer.host().children(ul), after.as_slice());
    assert_eq!(renderer.host().text_content(root), "ba");
}

/// A component with list state re-renders through the keyed diff.
#[test]
fn component_list_reorder() {
    let def = Rc::new(
        ComponentDef::new("List", |ctx| {
            let items = ctx.get("items");
            let children = items
                .as_reactive()
                .and_then(|list| list.iter().ok())
                .into_iter()
                .flatten()
                .filter_map(|item| item.as_number())
                .map(|n| VNode::element("li").with_key(n as i64).with_text(&n.to_string()))
                .collect();
            VNode::element("ul").with_children(children)
        })
        .with_data(|| Value::record([("items", Value::list([1, 2, 3, 4]))])),
    );

    let mut host = MemoryHost::new();
    let root = host.create_root();
    let renderer = Renderer::new(host);
    renderer.render(Some(VNode::component(&def)), root).unwrap();
    assert_eq!(renderer.host().text_content(root), "1234");
    renderer.host_mut().clear_ops();

    let instance = renderer.root(root).and_then(|v| v.component).unwrap();
    let items = instance.state().unwrap().get("items");
    let list = items.as_reactive().unwrap();
    list.splice(1, 2, [Value::from(3), Value::from(2)]).unwrap();
    list.push(5).unwrap();
    assert_eq!(renderer.host().text_content(root), "1234");

    flush_microtasks().unwrap();
    assert_eq!(renderer.host().text_content(root), "13245");
    let counts = renderer.host().counts();
    assert_eq!((counts.moved, counts.inserted, counts.removed), (1, 1, 0));
}

/// A parent re-render passes new props down; the child catches up on the
/// same drain.
#[test]
fn nested_components_share_a_drain() {
    let child = Rc::new(
        ComponentDef::new("Badge", |ctx| {
            let n = ctx.get("count").as_number().unwrap_or_default();
            VNode::element("b").with_text(&n.to_string())
        })
        .with_props(&["count"]),
    );
    let parent = {
        let child = child.clone();
        Rc::new(
            ComponentDef::new("Panel", move |ctx| {
                let n = ctx.get("n");
                VNode::element("div").with_children(vec![
                    VNode::text("count: "),
                    VNode::component(&child).with_prop("count", n),
                ])
            })
            .with_data(|| Value::record([("n", 1)])),
        )
    };

    let mut host = MemoryHost::new();
    let root = host.create_root();
    let renderer = Renderer::new(host);
    renderer.render(Some(VNode::component(&parent)), root).unwrap();
    assert_eq!(renderer.host().inner_html(root), "<div>count: <b>1</b></div>");

    let instance = renderer.root(root).and_then(|v| v.component).unwrap();
    instance.state().unwrap().set("n", 2);
    flush_microtasks().unwrap();
    assert_eq!(renderer.host().inner_html(root), "<div>count: <b>2</b></div>");
}
