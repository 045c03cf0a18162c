//! Error types surfaced by the reactive runtime.
//!
//! Errors on the read side (cycles, memoized getter failures) are recoverable
//! and returned through `try_` methods; the panicking variants funnel through
//! the same formatting. Divergence of the reaction queue is not recoverable
//! and panics at the drain site.

use std::sync::Arc;
use thiserror::Error;

/// Everything that can go wrong inside the reactive graph.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// A write to an observable happened outside an action while actions are
    /// enforced, or inside the tracked run of a computed value.
    #[error(
        "changing `{name}` is not allowed here; observed state may only be \
         mutated inside an action"
    )]
    StateMutationDisallowed {
        /// Name of the observable that rejected the write.
        name: Arc<str>,
    },

    /// A computed value read itself, directly or through other derivations.
    #[error("cycle detected while computing `{name}`")]
    CycleDetected {
        /// Name of the computed value whose getter re-entered itself.
        name: Arc<str>,
    },

    /// The pending-reaction queue kept refilling itself; some reaction
    /// triggers its own dependencies.
    #[error(
        "reactions did not converge after {iterations} iterations; \
         `{name}` keeps scheduling more work"
    )]
    ReactionDivergence {
        /// Name of the first reaction still pending when the limit was hit.
        name: Arc<str>,
        /// The iteration limit that was exceeded.
        iterations: usize,
    },

    /// Internal bookkeeping became inconsistent. Always a bug in the caller
    /// or in this crate, never a recoverable condition.
    #[error("reactive graph invariant violated: {0}")]
    InvariantViolation(String),

    /// A fallible computed getter returned an error. The error is memoized
    /// and returned on every read until a dependency changes.
    #[error("computed value `{name}` failed")]
    ComputedFailed {
        /// Name of the computed value whose getter failed.
        name: Arc<str>,
        /// The error the getter returned.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
