use observable_graph::{
    prelude::*, reaction::autorun, runtime::set_enforce_actions, Computed,
    Error, ObservableValue,
};
use std::{
    fmt,
    sync::{Arc, OnceLock, RwLock},
};

#[test]
fn computed_calculates_value() {
    let a = ObservableValue::new(1);
    let b = ObservableValue::new(2);
    let c = ObservableValue::new(3);

    let d = Computed::new({
        let (a, b, c) = (a.clone(), b.clone(), c.clone());
        move |_| a.get() + b.get() + c.get()
    });
    assert_eq!(d.get(), 6);
}

#[test]
fn computed_readable_through_guard() {
    let a = ObservableValue::new(1);
    let b = ObservableValue::new(2);

    let d = Computed::new({
        let (a, b) = (a.clone(), b.clone());
        move |_| a.get() + b.get()
    });
    assert_eq!(*d.read(), 3);
}

#[test]
fn observed_computed_caches_until_inputs_change() {
    let calculations = Arc::new(RwLock::new(0));

    let a = ObservableValue::new(1);
    let b = ObservableValue::new(2);

    let d = Computed::new({
        let (a, b) = (a.clone(), b.clone());
        let calculations = Arc::clone(&calculations);
        move |_| {
            *calculations.write().unwrap() += 1;
            a.get() + b.get()
        }
    });
    // keep the computed hot
    let _watch = autorun({
        let d = d.clone();
        move || {
            d.get();
        }
    });
    assert_eq!(*calculations.read().unwrap(), 1);

    assert_eq!(d.get(), 3);
    assert_eq!(d.get(), 3);
    assert_eq!(d.get(), 3);
    assert_eq!(*calculations.read().unwrap(), 1);

    a.set(0);
    assert_eq!(d.get(), 2);
    assert_eq!(*calculations.read().unwrap(), 2);
}

#[test]
fn unobserved_computed_recomputes_on_every_read() {
    let calculations = Arc::new(RwLock::new(0));

    let a = ObservableValue::new(1);
    let d = Computed::new({
        let a = a.clone();
        let calculations = Arc::clone(&calculations);
        move |_| {
            *calculations.write().unwrap() += 1;
            a.get() * 10
        }
    });

    // cold: every read runs the getter
    assert_eq!(d.get(), 10);
    assert_eq!(d.get(), 10);
    assert_eq!(*calculations.read().unwrap(), 2);

    // hot: the cache takes over
    let watch = autorun({
        let d = d.clone();
        move || {
            d.get();
        }
    });
    assert_eq!(*calculations.read().unwrap(), 3);
    assert_eq!(d.get(), 10);
    assert_eq!(d.get(), 10);
    assert_eq!(*calculations.read().unwrap(), 3);

    // cold again once the observer goes away
    watch.dispose();
    assert_eq!(d.get(), 10);
    assert_eq!(*calculations.read().unwrap(), 4);
}

#[test]
fn nested_computeds() {
    let a = ObservableValue::new(0);
    let b = ObservableValue::new(0);
    let c = Computed::new({
        let (a, b) = (a.clone(), b.clone());
        move |_| a.get() + b.get()
    });
    let d = Computed::new({
        let c = c.clone();
        move |_| c.get() * 2
    });
    let e = Computed::new({
        let d = d.clone();
        move |_| d.get() + 1
    });
    assert_eq!(e.get(), 1);
    assert_eq!(d.get(), 0);
    assert_eq!(c.get(), 0);
    a.set(5);
    assert_eq!(c.get(), 5);
    assert_eq!(d.get(), 10);
    assert_eq!(e.get(), 11);
    b.set(1);
    assert_eq!(e.get(), 13);
    assert_eq!(d.get(), 12);
    assert_eq!(c.get(), 6);
}

#[test]
fn diamond_recomputes_exactly_once_per_write() {
    let x = ObservableValue::new(1);
    let double = Computed::new({
        let x = x.clone();
        move |_| x.get() * 2
    });
    let incremented = Computed::new({
        let x = x.clone();
        move |_| x.get() + 1
    });

    let combined_count = Arc::new(RwLock::new(0));
    let combined = Computed::new({
        let (double, incremented) = (double.clone(), incremented.clone());
        let combined_count = Arc::clone(&combined_count);
        move |_| {
            *combined_count.write().unwrap() += 1;
            double.get() + incremented.get()
        }
    });

    let log = Arc::new(RwLock::new(Vec::new()));
    let _watch = autorun({
        let (combined, log) = (combined.clone(), log.clone());
        move || log.write().unwrap().push(combined.get())
    });
    assert_eq!(*log.read().unwrap(), vec![4]);
    assert_eq!(*combined_count.read().unwrap(), 1);

    x.set(2);
    // both branches updated, but the join recomputed only once and never
    // saw the branches disagree about `x`
    assert_eq!(*log.read().unwrap(), vec![4, 7]);
    assert_eq!(*combined_count.read().unwrap(), 2);
}

#[test]
fn computed_reading_itself_is_a_cycle() {
    let slot: Arc<OnceLock<Computed<i32>>> = Arc::new(OnceLock::new());
    let c = Computed::new_fallible({
        let slot = Arc::clone(&slot);
        move |_| -> Result<i32, Error> {
            let this = slot.get().expect("slot filled before first read");
            this.try_get_value().map(|value| value + 1)
        }
    });
    slot.set(c.clone()).expect("slot set once");

    let err = c.try_get_value().unwrap_err();
    let Error::ComputedFailed { source, .. } = &err else {
        panic!("expected a memoized getter failure, got {err}");
    };
    assert!(source.to_string().contains("cycle detected"));
}

#[derive(Debug)]
struct Oops;

impl fmt::Display for Oops {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oops")
    }
}

impl std::error::Error for Oops {}

#[test]
fn getter_errors_are_memoized_until_inputs_change() {
    let calculations = Arc::new(RwLock::new(0));
    let flag = ObservableValue::new(0);
    let c = Computed::new_fallible({
        let flag = flag.clone();
        let calculations = Arc::clone(&calculations);
        move |_| {
            *calculations.write().unwrap() += 1;
            match flag.get() {
                0 => Err(Oops),
                n => Ok(n * 10),
            }
        }
    });
    // keep the computed hot so the cache is in charge
    let _watch = autorun({
        let c = c.clone();
        move || {
            let _ = c.try_get_value();
        }
    });
    assert_eq!(*calculations.read().unwrap(), 1);

    // the cached error is returned without re-running the getter
    assert!(matches!(
        c.try_get_value(),
        Err(Error::ComputedFailed { .. })
    ));
    assert!(matches!(
        c.try_get_value(),
        Err(Error::ComputedFailed { .. })
    ));
    assert_eq!(*calculations.read().unwrap(), 1);

    // a dependency change clears the memoized error
    flag.set(2);
    assert_eq!(c.try_get_value().unwrap(), 20);
    assert_eq!(*calculations.read().unwrap(), 2);
}

#[test]
fn setter_routes_writes_back_to_state() {
    let celsius = ObservableValue::new(0);
    let fahrenheit = Computed::new_with_setter(
        {
            let celsius = celsius.clone();
            move |_| celsius.get() * 9 / 5 + 32
        },
        {
            let celsius = celsius.clone();
            move |f| celsius.set((f - 32) * 5 / 9)
        },
    );
    assert_eq!(fahrenheit.get(), 32);

    fahrenheit.set(212);
    assert_eq!(celsius.get(), 100);
    assert_eq!(fahrenheit.get(), 212);
}

#[test]
fn setter_counts_as_an_action_under_strict_mode() {
    set_enforce_actions(true);

    let celsius = ObservableValue::new(100);
    let fahrenheit = Computed::new_with_setter(
        {
            let celsius = celsius.clone();
            move |_| celsius.get() * 9 / 5 + 32
        },
        {
            let celsius = celsius.clone();
            move |f| celsius.set((f - 32) * 5 / 9)
        },
    );

    fahrenheit.set(32);
    assert_eq!(celsius.get_untracked(), 0);

    set_enforce_actions(false);
}

#[test]
fn getter_receives_previously_cached_value() {
    let a = ObservableValue::new(1);
    let running_max = Computed::new({
        let a = a.clone();
        move |prev: Option<&i32>| a.get().max(prev.copied().unwrap_or(0))
    });
    let _watch = autorun({
        let running_max = running_max.clone();
        move || {
            running_max.get();
        }
    });
    assert_eq!(running_max.get(), 1);

    a.set(5);
    assert_eq!(running_max.get(), 5);

    a.set(3);
    assert_eq!(running_max.get(), 5);
}
