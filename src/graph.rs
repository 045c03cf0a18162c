//! The core bipartite dependency graph: observables on one side, the
//! derivations observing them on the other, with back-pointers both ways.

mod derivation;
mod node;
mod observable;
mod sets;

pub use derivation::{
    untracked, AnyDerivation, Derivation, Observer, ToAnyDerivation,
    WithObserver,
};
pub(crate) use derivation::{report_observed, track_derived_function};
pub(crate) use node::{
    propagate_changed, propagate_ready_to, propagate_stale_to, DerivationState,
};
pub use observable::{AnyObservable, Observable, ToAnyObservable};
pub use sets::ObserverSet;
