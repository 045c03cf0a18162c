//! Introspection over the live dependency graph, for devtools.
//!
//! The two tree views answer the two directions of the same question:
//! [`dependency_tree`] shows what a derivation currently reads,
//! [`observer_tree`] shows who currently reacts to an observable.
//! Both are snapshots; they hold no edges into the graph.

use crate::graph::{
    AnyDerivation, AnyObservable, Derivation, Observable, ToAnyDerivation,
    ToAnyObservable,
};
use std::sync::Arc;

/// A snapshot of everything a derivation transitively observes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyTree {
    /// The node's debug name.
    pub name: Arc<str>,
    /// What the node observed at snapshot time; empty for leaves.
    pub dependencies: Vec<DependencyTree>,
}

impl DependencyTree {
    /// Whether any node in this tree carries `name`.
    pub fn contains(&self, name: &str) -> bool {
        &*self.name == name
            || self.dependencies.iter().any(|dep| dep.contains(name))
    }
}

/// A snapshot of everything transitively observing an observable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObserverTree {
    /// The node's debug name.
    pub name: Arc<str>,
    /// Who observed the node at snapshot time; empty for terminals.
    pub observers: Vec<ObserverTree>,
}

impl ObserverTree {
    /// Whether any node in this tree carries `name`.
    pub fn contains(&self, name: &str) -> bool {
        &*self.name == name
            || self.observers.iter().any(|obs| obs.contains(name))
    }
}

/// Snapshots the dependencies of a derivation, following computed values
/// down to the atoms they rest on.
pub fn dependency_tree(node: &impl ToAnyDerivation) -> DependencyTree {
    build_dependency_tree(&node.to_any_derivation())
}

fn build_dependency_tree(derivation: &AnyDerivation) -> DependencyTree {
    DependencyTree {
        name: derivation.name(),
        dependencies: derivation
            .observing()
            .iter()
            .map(|source| match source.as_derivation() {
                Some(inner) => build_dependency_tree(&inner),
                None => DependencyTree {
                    name: source.name(),
                    dependencies: Vec::new(),
                },
            })
            .collect(),
    }
}

/// Snapshots the observers of an observable, following computed values up
/// to the reactions that ultimately consume them.
pub fn observer_tree(node: &impl ToAnyObservable) -> ObserverTree {
    build_observer_tree(&node.to_any_observable())
}

fn build_observer_tree(observable: &AnyObservable) -> ObserverTree {
    ObserverTree {
        name: observable.name(),
        observers: observable
            .observers()
            .iter()
            .map(|observer| match observer.as_observable() {
                Some(inner) => build_observer_tree(&inner),
                None => ObserverTree {
                    name: observer.name(),
                    observers: Vec::new(),
                },
            })
            .collect(),
    }
}
