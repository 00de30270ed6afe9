//! Rendering
//!
//! Turns vnode trees into host nodes and keeps them in sync.
//!
//! # Pipeline
//!
//! 1. Application code builds a [`VNode`] tree, usually inside a component
//!    render function.
//!
//! 2. [`Renderer::render`] patches it against the tree last rendered into the
//!    same container, issuing [`NodeOps`] calls for the differences only.
//!
//! 3. Children lists go through the keyed diff, which moves the fewest nodes
//!    needed to reach the new order.
//!
//! The renderer never touches an output device directly; [`MemoryHost`] is
//! the in-crate host used by tests and benchmarks.

mod component;
mod diff;
mod host;
mod lis;
mod memory;
mod renderer;
mod vnode;

pub use component::{ComponentContext, ComponentDef, ComponentInstance};
pub use diff::DiffStrategy;
pub use host::{NodeHandle, NodeOps};
pub use lis::longest_increasing_subsequence;
pub use memory::{HostOp, MemoryHost, OpCounts};
pub use renderer::{Renderer, RendererOptions};
pub use vnode::{Children, Key, Props, VNode, VNodeType};
