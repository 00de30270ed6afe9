//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive UI framework.
//! It implements:
//!
//! - Reactive views over records, lists, maps and sets
//! - Effects, computed values and watchers with batched scheduling
//! - A virtual node renderer with a keyed children diff
//!
//! # Architecture
//!
//! - `reactive`: dependency tracking, views, effects and the job scheduler
//! - `render`: vnodes, the host interface, the diff and components
//! - `error`: error types shared by both
//!
//! Everything is single-threaded; reactive state lives in thread-locals.
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use trellis_core::reactive::{effect, reactive, Value};
//!
//! let state = reactive(Value::record([("count", 0)]).as_target().unwrap());
//! let seen = Rc::new(Cell::new(0.0));
//!
//! let view = state.clone();
//! let sink = seen.clone();
//! effect(move || sink.set(view.get("count").as_number().unwrap_or_default()));
//!
//! state.set("count", 5);
//! assert_eq!(seen.get(), 5.0);
//! ```

pub mod error;
pub mod reactive;
pub mod render;

pub use error::{ReactiveError, RenderError};
