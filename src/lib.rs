//! An implementation of a transparent reactive state graph.
//!
//! Transparent reactivity models the flow of data through an application by
//! composing three categories of reactive primitives:
//! 1. **Observable values**: atomic units of state, which can be directly
//!    mutated.
//! 2. **Computed values**: derived values, which cannot be mutated directly
//!    but update whenever the state they depend on changes.
//! 3. **Reactions**: side effects that synchronize the reactive state with
//!    the non-reactive world outside it.
//!
//! Atoms and computed values are *observable* nodes in the graph, because a
//! derivation can subscribe to them to respond to changes in their values.
//! Computed values and reactions are *derivation* nodes, because they track
//! what they read.
//!
//! ```rust
//! use observable_graph::{
//!     prelude::*, reaction::autorun, Computed, ObservableValue,
//! };
//!
//! let count = ObservableValue::new(1);
//! let double_count = Computed::new({
//!     let count = count.clone();
//!     move |_| count.get() * 2
//! });
//!
//! // the reaction runs once immediately
//! let _printer = autorun({
//!     let double_count = double_count.clone();
//!     move || println!("double_count = {}", double_count.get())
//! });
//!
//! // updating `count` propagates through the graph and re-runs the reaction
//! count.set(2);
//! assert_eq!(double_count.get(), 4);
//! ```
//!
//! ## Design Principles and Assumptions
//! - **Side effects are expensive.** The library assumes that what reactions
//!   do (rendering, network requests, writing to disk) costs orders of
//!   magnitude more than propagating updates, so the algorithm is built to
//!   never run a reaction more than once per change batch, and never before
//!   all of its inputs have settled.
//! - **Automatic dependency tracking.** Dependencies are not declared; they
//!   are captured at runtime, per run. A derivation with a conditional
//!   branch therefore does not re-run for changes that only affect the
//!   branch it did not take.
//! - **Glitch-free, synchronous propagation.** A write broadcasts a *stale*
//!   wave followed by a *ready* wave through the computed graph; each
//!   derivation revalidates exactly once, after all of its inputs have
//!   settled, so no derivation ever observes two inputs disagreeing about
//!   the same source. Reaction side effects are deferred to the edge of the
//!   outermost [`transaction`](runtime::transaction) and drained in FIFO
//!   order.
//! - **Single-threaded, cooperative.** The runtime state is thread-local;
//!   nodes are cheap shared handles. There are no suspension points inside
//!   the tracking, propagation, or drain paths.

#![warn(missing_docs)]

use std::fmt::Arguments;

pub mod atom;
pub mod computed;
pub mod diagnostics;
pub mod errors;
pub mod graph;
pub mod reaction;
pub mod runtime;
#[cfg(feature = "serde")]
mod serde;
pub mod spy;
pub mod traits;
pub mod value;

pub use atom::Atom;
pub use computed::Computed;
pub use errors::Error;
pub use graph::untracked;
pub use reaction::{autorun, autorun_named, Reaction};
pub use runtime::{action, run_in_action, transaction};
pub use value::ObservableValue;

/// Reexports frequently-used traits.
pub mod prelude {
    pub use crate::traits::*;
}

#[allow(unused)]
#[doc(hidden)]
pub fn log_warning(text: Arguments) {
    #[cfg(feature = "tracing")]
    {
        tracing::warn!("{}", text);
    }
    #[cfg(not(feature = "tracing"))]
    {
        eprintln!("{}", text);
    }
}
