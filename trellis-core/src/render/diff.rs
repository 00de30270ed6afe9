//! Children Diff
//!
//! Reconciles an old and a new list of sibling vnodes with as few host
//! moves as possible.
//!
//! # Fast Keyed Diff
//!
//! 1. Patch the common prefix and the common suffix (matching keys).
//!
//! 2. If only new nodes remain, mount them before the node that follows the
//!    region. If only old nodes remain, unmount them.
//!
//! 3. Otherwise, map each new key to its index and walk the remaining old
//!    nodes: patch the ones whose key survives and record, for each new
//!    slot, the old index it came from (`source`). Old nodes whose key is
//!    gone are unmounted, as is every old node once all new slots are
//!    matched. If the recorded old indices ever decrease, something moved.
//!
//! 4. Walk the new slots back to front. Unmatched slots are mounted before
//!    the next placed node. If something moved, matched slots on the longest
//!    increasing subsequence of `source` stay put and the rest move.
//!
//! # Double-Ended Diff
//!
//! The older algorithm compares the four ends of both lists (head-head,
//! tail-tail, head-tail, tail-head) and falls back to a key search in the
//! old list. Kept as an option for hosts that depend on its move order.
//!
//! Lists in which any node lacks a key are patched positionally.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde::Deserialize;

use super::host::{NodeHandle, NodeOps};
use super::lis::longest_increasing_subsequence;
use super::renderer::{first_el, RendererInner};
use super::vnode::{Children, Key, VNode};
use crate::error::{RenderError, RenderResult};

/// Algorithm for keyed children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStrategy {
    /// Prefix/suffix trim plus longest increasing subsequence.
    #[default]
    Fast,
    /// Four-cursor comparison.
    DoubleEnded,
}

/// Reject duplicate keys. Returns whether every node has a key.
pub(crate) fn check_keys(children: &[VNode]) -> RenderResult<bool> {
    let mut seen: HashSet<&Key> = HashSet::with_capacity(children.len());
    let mut all_keyed = true;
    for child in children {
        match &child.key {
            Some(key) => {
                if !seen.insert(key) {
                    return Err(RenderError::DuplicateKey(key.clone()));
                }
            }
            None => all_keyed = false,
        }
    }
    Ok(all_keyed)
}

/// Reject duplicate keys anywhere in `vnode`'s element and fragment
/// children. Component subtrees are checked when the component renders.
pub(crate) fn check_tree_keys(vnode: &VNode) -> RenderResult<()> {
    if let Children::Nodes(children) = &vnode.children {
        check_keys(children)?;
        for child in children {
            check_tree_keys(child)?;
        }
    }
    Ok(())
}

fn key_of(node: &Option<VNode>) -> Option<&Key> {
    node.as_ref().and_then(|n| n.key.as_ref())
}

impl<H: NodeOps + 'static> RendererInner<H> {
    /// Reconcile two sibling lists under `container`. New nodes appended at
    /// the end of the list are inserted before `anchor`.
    pub(crate) fn patch_child_list(
        self: &Rc<Self>,
        old: Vec<VNode>,
        new: &mut [VNode],
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) -> RenderResult<()> {
        let new_keyed = check_keys(new)?;
        let old_keyed = old.iter().all(|n| n.key.is_some());

        if !(new_keyed && old_keyed) {
            return self.patch_unkeyed(old, new, container, anchor);
        }
        match self.options.diff {
            DiffStrategy::Fast => self.patch_keyed_fast(old, new, container, anchor),
            DiffStrategy::DoubleEnded => self.patch_keyed_double_ended(old, new, container, anchor),
        }
    }

    /// First host node at or after `from` in `new`, else `fallback`.
    fn anchor_at(new: &[VNode], from: usize, fallback: Option<NodeHandle>) -> Option<NodeHandle> {
        new.iter().skip(from).find_map(first_el).or(fallback)
    }

    fn patch_unkeyed(
        self: &Rc<Self>,
        old: Vec<VNode>,
        new: &mut [VNode],
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) -> RenderResult<()> {
        let common = old.len().min(new.len());
        let mut old = old.into_iter();
        for (i, old_node) in old.by_ref().take(common).enumerate() {
            self.patch(Some(old_node), &mut new[i], container, None)?;
        }
        for extra in old {
            self.unmount(extra);
        }
        for node in new.iter_mut().skip(common) {
            self.mount(node, container, anchor)?;
        }
        Ok(())
    }

    fn patch_keyed_fast(
        self: &Rc<Self>,
        old: Vec<VNode>,
        new: &mut [VNode],
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) -> RenderResult<()> {
        let mut old: Vec<Option<VNode>> = old.into_iter().map(Some).collect();

        // Common prefix.
        let mut start = 0;
        while start < old.len() && start < new.len() && key_of(&old[start]) == new[start].key.as_ref() {
            self.patch(old[start].take(), &mut new[start], container, None)?;
            start += 1;
        }

        // Common suffix. Ends are exclusive.
        let mut old_end = old.len();
        let mut new_end = new.len();
        while old_end > start && new_end > start && key_of(&old[old_end - 1]) == new[new_end - 1].key.as_ref() {
            self.patch(old[old_end - 1].take(), &mut new[new_end - 1], container, None)?;
            old_end -= 1;
            new_end -= 1;
        }

        if start >= old_end {
            let anchor = Self::anchor_at(new, new_end, anchor);
            for node in &mut new[start..new_end] {
                self.mount(node, container, anchor)?;
            }
            return Ok(());
        }
        if start >= new_end {
            for node in old[start..old_end].iter_mut().filter_map(Option::take) {
                self.unmount(node);
            }
            return Ok(());
        }

        let count = new_end - start;
        let mut source: Vec<Option<usize>> = vec![None; count];
        let key_index: HashMap<Key, usize> = (start..new_end)
            .filter_map(|i| new[i].key.clone().map(|k| (k, i)))
            .collect();

        let mut moved = false;
        let mut last_index = 0;
        let mut patched = 0;
        let mut unmounted = 0;
        for i in start..old_end {
            let Some(old_node) = old[i].take() else {
                continue;
            };
            if patched >= count {
                self.unmount(old_node);
                unmounted += 1;
                continue;
            }
            let matched = old_node.key.as_ref().and_then(|k| key_index.get(k)).copied();
            match matched {
                Some(k) => {
                    self.patch(Some(old_node), &mut new[k], container, None)?;
                    patched += 1;
                    source[k - start] = Some(i);
                    if k < last_index {
                        moved = true;
                    } else {
                        last_index = k;
                    }
                }
                None => {
                    self.unmount(old_node);
                    unmounted += 1;
                }
            }
        }

        let stable = if moved {
            longest_increasing_subsequence(&source)
        } else {
            Vec::new()
        };
        let mut remaining = stable.len();
        let (mut mounted, mut moves) = (0, 0);

        for i in (0..count).rev() {
            let pos = start + i;
            let anchor = Self::anchor_at(new, pos + 1, anchor);
            match source[i] {
                None => {
                    self.mount(&mut new[pos], container, anchor)?;
                    mounted += 1;
                }
                Some(_) if moved => {
                    if remaining > 0 && stable[remaining - 1] == i {
                        remaining -= 1;
                    } else {
                        self.move_node(&new[pos], container, anchor);
                        moves += 1;
                    }
                }
                Some(_) => {}
            }
        }

        tracing::debug!(
            region = count,
            patched,
            mounted,
            moves,
            unmounted,
            "keyed diff"
        );
        Ok(())
    }

    fn patch_keyed_double_ended(
        self: &Rc<Self>,
        old: Vec<VNode>,
        new: &mut [VNode],
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) -> RenderResult<()> {
        let mut old: Vec<Option<VNode>> = old.into_iter().map(Some).collect();

        // Exclusive ends.
        let (mut old_start, mut old_end) = (0, old.len());
        let (mut new_start, mut new_end) = (0, new.len());

        while old_start < old_end && new_start < new_end {
            if old[old_start].is_none() {
                old_start += 1;
                continue;
            }
            if old[old_end - 1].is_none() {
                old_end -= 1;
                continue;
            }

            let head_key = key_of(&old[old_start]);
            let tail_key = key_of(&old[old_end - 1]);

            if head_key == new[new_start].key.as_ref() {
                self.patch(old[old_start].take(), &mut new[new_start], container, None)?;
                old_start += 1;
                new_start += 1;
            } else if tail_key == new[new_end - 1].key.as_ref() {
                self.patch(old[old_end - 1].take(), &mut new[new_end - 1], container, None)?;
                old_end -= 1;
                new_end -= 1;
            } else if head_key == new[new_end - 1].key.as_ref() {
                // Old head becomes the new tail: move it after the old tail.
                let after_tail = old[old_end - 1]
                    .as_ref()
                    .and_then(|n| self.next_sibling_after(n));
                self.patch(old[old_start].take(), &mut new[new_end - 1], container, None)?;
                self.move_node(&new[new_end - 1], container, after_tail);
                old_start += 1;
                new_end -= 1;
            } else if tail_key == new[new_start].key.as_ref() {
                // Old tail becomes the new head: move it before the old head.
                let before_head = old[old_start].as_ref().and_then(first_el);
                self.patch(old[old_end - 1].take(), &mut new[new_start], container, None)?;
                self.move_node(&new[new_start], container, before_head);
                old_end -= 1;
                new_start += 1;
            } else {
                let before_head = old[old_start].as_ref().and_then(first_el);
                let wanted = new[new_start].key.as_ref();
                let found = (old_start..old_end).find(|&i| old[i].is_some() && key_of(&old[i]) == wanted);
                match found {
                    Some(i) => {
                        self.patch(old[i].take(), &mut new[new_start], container, None)?;
                        self.move_node(&new[new_start], container, before_head);
                    }
                    None => self.mount(&mut new[new_start], container, before_head)?,
                }
                new_start += 1;
            }
        }

        if new_start < new_end {
            let anchor = Self::anchor_at(new, new_end, anchor);
            for node in &mut new[new_start..new_end] {
                self.mount(node, container, anchor)?;
            }
        } else {
            for node in old[old_start..old_end].iter_mut().filter_map(Option::take) {
                self.unmount(node);
            }
        }
        Ok(())
    }
}
