use observable_graph::{
    prelude::*,
    reaction::autorun,
    run_in_action,
    runtime::set_enforce_actions,
    Error, ObservableValue,
};
use std::sync::{Arc, RwLock};

#[test]
fn create_observable_value() {
    let a = ObservableValue::new(0);
    assert_eq!(a.read(), 0);
    assert_eq!(a.get(), 0);
    assert_eq!(a.get_untracked(), 0);
    assert_eq!(a.with_untracked(|n| n + 1), 1);
    assert_eq!(a.with(|n| n + 1), 1);
    assert_eq!(format!("{}", a.read()), "0");
}

#[test]
fn update_observable_value() {
    let a = ObservableValue::new(0);
    *a.write() += 1;
    assert_eq!(a.get(), 1);
    a.update(|n| *n += 1);
    assert_eq!(a.get(), 2);
    a.update_untracked(|n| *n += 1);
    assert_eq!(a.get(), 3);
    a.set(4);
    assert_eq!(a.get(), 4);
}

#[test]
fn setting_the_value_already_held_does_not_notify() {
    let a = ObservableValue::new(1);
    let runs = Arc::new(RwLock::new(0));
    let _watch = autorun({
        let (a, runs) = (a.clone(), runs.clone());
        move || {
            a.get();
            *runs.write().unwrap() += 1;
        }
    });
    assert_eq!(*runs.read().unwrap(), 1);

    a.set(1);
    assert_eq!(*runs.read().unwrap(), 1);

    a.set(2);
    assert_eq!(*runs.read().unwrap(), 2);
}

#[test]
fn untracked_write_guard_does_not_notify() {
    let a = ObservableValue::new(0);
    let runs = Arc::new(RwLock::new(0));
    let _watch = autorun({
        let (a, runs) = (a.clone(), runs.clone());
        move || {
            a.get();
            *runs.write().unwrap() += 1;
        }
    });
    assert_eq!(*runs.read().unwrap(), 1);

    {
        let mut guard = a.write();
        guard.silence();
        *guard += 1;
    }
    // the value changed, but nobody was told
    assert_eq!(a.get_untracked(), 1);
    assert_eq!(*runs.read().unwrap(), 1);

    *a.write() += 1;
    assert_eq!(*runs.read().unwrap(), 2);
}

#[test]
fn enhancer_wraps_assigned_values() {
    let clamped =
        ObservableValue::new_with_enhancer(5, |value: i32| value.min(10));
    assert_eq!(clamped.get(), 5);

    clamped.set(50);
    assert_eq!(clamped.get(), 10);

    clamped.set(7);
    assert_eq!(clamped.get(), 7);
}

#[test]
fn custom_compare_decides_what_counts_as_a_change() {
    let a = ObservableValue::new_with_compare(1, |lhs: &i32, rhs: &i32| {
        lhs.abs() == rhs.abs()
    });
    let runs = Arc::new(RwLock::new(0));
    let _watch = autorun({
        let (a, runs) = (a.clone(), runs.clone());
        move || {
            a.get();
            *runs.write().unwrap() += 1;
        }
    });
    assert_eq!(*runs.read().unwrap(), 1);

    // -1 compares equal to 1 under the predicate: no run
    a.set(-1);
    assert_eq!(*runs.read().unwrap(), 1);

    a.set(2);
    assert_eq!(*runs.read().unwrap(), 2);
}

#[test]
fn prepare_and_commit_split() {
    let a = ObservableValue::new(1);

    assert_eq!(a.prepare_new_value(1), None);

    let prepared = a.prepare_new_value(2);
    assert_eq!(prepared, Some(2));
    a.set_new_value(prepared.unwrap());
    assert_eq!(a.get(), 2);
}

#[test]
fn strict_mode_rejects_bare_writes() {
    set_enforce_actions(true);

    let a = ObservableValue::new(0);
    let err = a.try_set(1).unwrap_err();
    assert!(matches!(err, Error::StateMutationDisallowed { .. }));
    assert_eq!(a.get_untracked(), 0);

    // the same write inside an action goes through
    run_in_action("set a", || a.set(1));
    assert_eq!(a.get_untracked(), 1);

    set_enforce_actions(false);
    a.set(2);
    assert_eq!(a.get_untracked(), 2);
}
