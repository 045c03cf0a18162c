//! Property-based invariant tests for the dependency graph.
//!
//! These verify structural invariants that must hold for any sequence of
//! valid operations:
//!
//! 1. Edge symmetry: a source appears in a derivation's dependency tree
//!    exactly when the derivation appears in the source's observer tree,
//!    after every retracking.
//! 2. Exactly-once: a write through a diamond re-runs the joining reaction
//!    exactly once, and never with the branches disagreeing.
//! 3. Batching: any number of writes inside one transaction produce at most
//!    one reaction run.

use observable_graph::{
    diagnostics::{dependency_tree, observer_tree},
    prelude::*,
    reaction::autorun_named,
    runtime::transaction,
    Computed, ObservableValue,
};
use proptest::prelude::*;
use std::sync::{Arc, RwLock};

// ── Helpers ──────────────────────────────────────────────────────────────

fn masked_reader(
    sources: &[ObservableValue<i32>],
    mask: Arc<RwLock<Vec<bool>>>,
    trigger: &ObservableValue<i32>,
) -> observable_graph::Reaction {
    let sources = sources.to_vec();
    let trigger = trigger.clone();
    autorun_named("masked-reader", move || {
        trigger.get();
        let mask = mask.read().unwrap().clone();
        for (source, read) in sources.iter().zip(mask) {
            if read {
                source.get();
            }
        }
    })
}

proptest! {
    // 1. Edge symmetry under dynamic retracking.
    #[test]
    fn dependency_edges_stay_symmetric(
        first_mask in proptest::collection::vec(any::<bool>(), 1..6),
        second_mask in proptest::collection::vec(any::<bool>(), 1..6),
    ) {
        let len = first_mask.len().min(second_mask.len());
        let sources: Vec<ObservableValue<i32>> = (0..len)
            .map(|i| ObservableValue::named(format!("source-{i}"), 0))
            .collect();
        let trigger = ObservableValue::named("trigger", 0);
        let mask = Arc::new(RwLock::new(first_mask[..len].to_vec()));
        let reader = masked_reader(&sources, Arc::clone(&mask), &trigger);

        for (i, read) in first_mask[..len].iter().enumerate() {
            let name = format!("source-{i}");
            prop_assert_eq!(dependency_tree(&reader).contains(&name), *read);
            prop_assert_eq!(
                observer_tree(&sources[i]).contains("masked-reader"),
                *read
            );
        }

        // swap the mask and force a retrack
        *mask.write().unwrap() = second_mask[..len].to_vec();
        trigger.update(|n| *n += 1);

        for (i, read) in second_mask[..len].iter().enumerate() {
            let name = format!("source-{i}");
            prop_assert_eq!(dependency_tree(&reader).contains(&name), *read);
            prop_assert_eq!(
                observer_tree(&sources[i]).contains("masked-reader"),
                *read
            );
        }

        reader.dispose();
        for source in &sources {
            prop_assert!(!source.atom().is_observed());
        }
    }

    // 2. Diamond writes re-run the join exactly once and tear-free.
    #[test]
    fn diamond_reactions_run_exactly_once_per_effective_write(
        writes in proptest::collection::vec(0i32..5, 1..20),
    ) {
        let x = ObservableValue::named("x", 0);
        let double = Computed::named("double", {
            let x = x.clone();
            move |_| x.get() * 2
        });
        let incremented = Computed::named("incremented", {
            let x = x.clone();
            move |_| x.get() + 1
        });

        let log = Arc::new(RwLock::new(Vec::new()));
        let watcher = autorun_named("watcher", {
            let (double, incremented) = (double.clone(), incremented.clone());
            let log = log.clone();
            move || {
                let (d, i) = (double.get(), incremented.get());
                log.write().unwrap().push((d, i));
            }
        });

        let mut current = 0;
        let mut expected_runs = 1;
        for value in writes {
            if value != current {
                expected_runs += 1;
                current = value;
            }
            x.set(value);
        }

        let log = log.read().unwrap();
        prop_assert_eq!(log.len(), expected_runs);
        // the join never observes the two branches disagreeing about `x`
        for (d, i) in log.iter() {
            prop_assert_eq!(d / 2, i - 1);
        }

        watcher.dispose();
    }

    // 3. A transaction collapses any number of writes into at most one run.
    #[test]
    fn transactions_collapse_writes_into_one_run(
        writes in proptest::collection::vec(0i32..5, 1..20),
    ) {
        let x = ObservableValue::new(0);
        let runs = Arc::new(RwLock::new(0usize));
        let watcher = autorun_named("watcher", {
            let (x, runs) = (x.clone(), runs.clone());
            move || {
                x.get();
                *runs.write().unwrap() += 1;
            }
        });

        let mut effective = false;
        let mut current = 0;
        transaction(|| {
            for &value in &writes {
                if value != current {
                    effective = true;
                    current = value;
                }
                x.set(value);
            }
        });

        let expected = if effective { 2 } else { 1 };
        prop_assert_eq!(*runs.read().unwrap(), expected);

        watcher.dispose();
    }
}
