//! The spy channel: a stream of structured events about everything the
//! runtime does, for devtools and debugging.
//!
//! Listeners are registered per thread with [`spy`] and receive a
//! [`SpyEvent`] for every action, value update, reaction run, reaction
//! scheduling, and runtime error. Events that bracket a region (actions,
//! reaction runs) are followed by a matching [`SpyEvent::ReportEnd`] once
//! the region closes, so listeners can reconstruct nesting.

use std::{cell::RefCell, rc::Rc, sync::Arc};

/// One observation from the spy channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpyEvent {
    /// An action started. Bracketed: followed by [`SpyEvent::ReportEnd`].
    Action {
        /// The action's name.
        name: Arc<str>,
    },
    /// An observable value was assigned a new value.
    Update {
        /// The observable's name.
        name: Arc<str>,
    },
    /// A reaction started running. Bracketed: followed by
    /// [`SpyEvent::ReportEnd`].
    Reaction {
        /// The reaction's name.
        name: Arc<str>,
    },
    /// A reaction was appended to the pending queue.
    ScheduledReaction {
        /// The reaction's name.
        name: Arc<str>,
    },
    /// The runtime hit an error it is about to surface.
    Error {
        /// Rendered error message.
        message: String,
    },
    /// Closes the most recent still-open bracketed event.
    ReportEnd,
}

type Listener = Rc<dyn Fn(&SpyEvent)>;

thread_local! {
    static LISTENERS: RefCell<Vec<(u64, Listener)>> = const { RefCell::new(Vec::new()) };
    static NEXT_LISTENER_ID: RefCell<u64> = const { RefCell::new(0) };
}

/// Keeps a spy listener registered; dropping it unsubscribes.
#[derive(Debug)]
#[must_use = "dropping the subscription immediately unsubscribes the listener"]
pub struct SpySubscription {
    id: u64,
}

impl Drop for SpySubscription {
    fn drop(&mut self) {
        LISTENERS
            .with_borrow_mut(|listeners| {
                listeners.retain(|(id, _)| *id != self.id)
            });
    }
}

/// Registers a listener for every spy event on this thread.
pub fn spy(listener: impl Fn(&SpyEvent) + 'static) -> SpySubscription {
    let id = NEXT_LISTENER_ID.with_borrow_mut(|next| {
        *next += 1;
        *next
    });
    LISTENERS
        .with_borrow_mut(|listeners| listeners.push((id, Rc::new(listener))));
    SpySubscription { id }
}

/// Cheap check so call sites can skip building events nobody will see.
pub(crate) fn is_enabled() -> bool {
    LISTENERS.with_borrow(|listeners| !listeners.is_empty())
}

/// Delivers an event to every registered listener.
pub(crate) fn report(event: SpyEvent) {
    // snapshot first: a listener may itself subscribe or unsubscribe
    let listeners: Vec<Listener> = LISTENERS.with_borrow(|listeners| {
        listeners.iter().map(|(_, l)| Rc::clone(l)).collect()
    });
    for listener in listeners {
        listener(&event);
    }
}

/// Delivers the opening event of a bracketed region.
pub(crate) fn report_start(event: SpyEvent) {
    report(event);
}

/// Closes the most recent bracketed region.
pub(crate) fn report_end() {
    report(SpyEvent::ReportEnd);
}
