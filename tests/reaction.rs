use observable_graph::{
    prelude::*,
    reaction::{autorun, autorun_named, Reaction},
    untracked, ObservableValue,
};
use std::sync::{Arc, RwLock};

#[test]
fn autorun_runs_immediately_and_on_every_change() {
    let a = ObservableValue::new(1);
    let b = ObservableValue::new(2);
    let log = Arc::new(RwLock::new(Vec::new()));

    let _sum = autorun({
        let (a, b, log) = (a.clone(), b.clone(), log.clone());
        move || log.write().unwrap().push(a.get() + b.get())
    });
    assert_eq!(*log.read().unwrap(), vec![3]);

    a.set(4);
    assert_eq!(*log.read().unwrap(), vec![3, 7]);

    // same value again: nothing to do
    a.set(4);
    assert_eq!(*log.read().unwrap(), vec![3, 7]);
}

#[test]
fn disposed_reaction_stops_running_and_unsubscribes() {
    let a = ObservableValue::new(0);
    let runs = Arc::new(RwLock::new(0));

    let watch = autorun({
        let (a, runs) = (a.clone(), runs.clone());
        move || {
            a.get();
            *runs.write().unwrap() += 1;
        }
    });
    assert_eq!(*runs.read().unwrap(), 1);
    assert!(a.atom().is_observed());

    a.set(1);
    assert_eq!(*runs.read().unwrap(), 2);

    let handle = watch.clone();
    watch.dispose();
    assert!(handle.is_disposed());
    assert!(!a.atom().is_observed());

    a.set(2);
    assert_eq!(*runs.read().unwrap(), 2);
}

#[test]
fn dispose_is_safe_from_inside_the_reaction_body() {
    let a = ObservableValue::new(0);
    let runs = Arc::new(RwLock::new(0));

    let reaction = Reaction::new("self-stopping", {
        let (a, runs) = (a.clone(), runs.clone());
        move |reaction| {
            reaction.track(|| {
                a.get();
                *runs.write().unwrap() += 1;
                reaction.dispose();
            });
        }
    });
    reaction.schedule();

    assert_eq!(*runs.read().unwrap(), 1);
    assert!(reaction.is_disposed());
    // the deferred cleanup released the subscription
    assert!(!a.atom().is_observed());

    a.set(1);
    assert_eq!(*runs.read().unwrap(), 1);
}

#[test]
fn dependencies_rebind_every_run() {
    let first = ObservableValue::new("Greg".to_string());
    let last = ObservableValue::new("Johnston".to_string());
    let use_last = ObservableValue::new(true);

    let runs = Arc::new(RwLock::new(0));
    let _name = autorun({
        let (first, last, use_last) =
            (first.clone(), last.clone(), use_last.clone());
        let runs = runs.clone();
        move || {
            if use_last.get() {
                format!("{} {}", first.get(), last.get());
            } else {
                first.get();
            }
            *runs.write().unwrap() += 1;
        }
    });
    assert_eq!(*runs.read().unwrap(), 1);

    last.set("Thompson".to_string());
    assert_eq!(*runs.read().unwrap(), 2);

    // the branch no longer reads `last`...
    use_last.set(false);
    assert_eq!(*runs.read().unwrap(), 3);
    assert!(!last.atom().is_observed());

    // ...so changes to it are ignored
    last.set("Jones".to_string());
    last.set("Smith".to_string());
    assert_eq!(*runs.read().unwrap(), 3);

    use_last.set(true);
    assert_eq!(*runs.read().unwrap(), 4);
    assert!(last.atom().is_observed());

    last.set("Stevens".to_string());
    assert_eq!(*runs.read().unwrap(), 5);
}

#[test]
fn untracked_reads_do_not_bind() {
    let a = ObservableValue::new(0);
    let b = ObservableValue::new(0);
    let runs = Arc::new(RwLock::new(0));

    let _watch = autorun({
        let (a, b, runs) = (a.clone(), b.clone(), runs.clone());
        move || {
            a.get();
            untracked(|| b.get());
            *runs.write().unwrap() += 1;
        }
    });
    assert_eq!(*runs.read().unwrap(), 1);
    assert!(!b.atom().is_observed());

    b.set(1);
    assert_eq!(*runs.read().unwrap(), 1);

    a.set(1);
    assert_eq!(*runs.read().unwrap(), 2);
}

#[test]
fn reactions_run_in_scheduling_order() {
    let a = ObservableValue::new(0);
    let order = Arc::new(RwLock::new(Vec::new()));

    let _first = autorun_named("first", {
        let (a, order) = (a.clone(), order.clone());
        move || {
            a.get();
            order.write().unwrap().push("first");
        }
    });
    let _second = autorun_named("second", {
        let (a, order) = (a.clone(), order.clone());
        move || {
            a.get();
            order.write().unwrap().push("second");
        }
    });
    assert_eq!(*order.read().unwrap(), vec!["first", "second"]);

    a.set(1);
    assert_eq!(
        *order.read().unwrap(),
        vec!["first", "second", "first", "second"]
    );
}

#[test]
fn scheduling_without_tracking_still_runs_the_callback() {
    let runs = Arc::new(RwLock::new(0));
    let reaction = Reaction::new("counter", {
        let runs = runs.clone();
        move |_| {
            *runs.write().unwrap() += 1;
        }
    });
    assert!(!reaction.is_scheduled());

    reaction.schedule();
    assert_eq!(*runs.read().unwrap(), 1);

    // scheduling twice before a drain coalesces into one run
    reaction.schedule();
    assert_eq!(*runs.read().unwrap(), 2);
}

#[test]
#[should_panic(expected = "did not converge")]
fn self_triggering_reaction_is_reported_as_divergent() {
    let a = ObservableValue::new(0);
    let _loop = autorun({
        let a = a.clone();
        move || {
            let value = a.get();
            if value > 0 {
                a.set(value + 1);
            }
        }
    });
    // the first run binds quietly; this write starts the feedback loop
    a.set(1);
}
