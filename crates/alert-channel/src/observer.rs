//! Observer registry.
//!
//! Observers are notified synchronously, in subscription order. A failing
//! observer (returned error or panic) is logged and skipped; delivery to the
//! remaining observers continues.
//!
//! The registry lock is re-entrant and held for the whole fan-out of one
//! event. Two consequences:
//! - once [`ObserverRegistry::unsubscribe`] returns, the removed observer
//!   receives nothing dispatched afterwards, even from another thread;
//! - an observer may subscribe or unsubscribe (itself or others) from inside
//!   its own callback without deadlocking.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::ReentrantMutex;
use tracing::{error, trace, warn};

use crate::event::ChannelEvent;

/// Error type observers may return.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by an observer callback.
pub type ObserverResult = std::result::Result<(), ObserverError>;

/// A subscriber to channel events.
pub trait Observer: Send + Sync {
    /// Handle one dispatched event.
    fn on_event(&self, event: &ChannelEvent) -> ObserverResult;
}

impl<F> Observer for F
where
    F: Fn(&ChannelEvent) -> ObserverResult + Send + Sync,
{
    fn on_event(&self, event: &ChannelEvent) -> ObserverResult {
        self(event)
    }
}

/// Opaque handle identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Outcome of fanning one event out to the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

struct Registration {
    id: ObserverId,
    observer: Arc<dyn Observer>,
}

/// Ordered set of observers.
pub struct ObserverRegistry {
    entries: ReentrantMutex<RefCell<Vec<Registration>>>,
    next_id: AtomicU64,
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            entries: ReentrantMutex::new(RefCell::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append an observer to the dispatch list.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let guard = self.entries.lock();
        guard.borrow_mut().push(Registration { id, observer });
        trace!(%id, "Observer subscribed");
        id
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let guard = self.entries.lock();
        let mut entries = guard.borrow_mut();
        match entries.iter().position(|r| r.id == id) {
            Some(pos) => {
                entries.remove(pos);
                trace!(%id, "Observer unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Remove every observer, returning how many were registered.
    pub fn clear(&self) -> usize {
        let guard = self.entries.lock();
        let mut entries = guard.borrow_mut();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ObserverId) -> bool {
        self.entries.lock().borrow().iter().any(|r| r.id == id)
    }

    /// Deliver `event` to every registered observer.
    pub fn notify(&self, event: &ChannelEvent) -> DeliveryReport {
        let guard = self.entries.lock();
        let snapshot: Vec<(ObserverId, Arc<dyn Observer>)> = guard
            .borrow()
            .iter()
            .map(|r| (r.id, Arc::clone(&r.observer)))
            .collect();

        let mut report = DeliveryReport::default();
        for (id, observer) in snapshot {
            // Removed by an earlier observer during this fan-out.
            if !guard.borrow().iter().any(|r| r.id == id) {
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| observer.on_event(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(%id, kind = %event.kind(), error = %e, "Observer failed to handle event");
                }
                Err(payload) => {
                    report.failed += 1;
                    error!(
                        %id,
                        kind = %event.kind(),
                        panic = panic_message(payload.as_ref()),
                        "Observer panicked while handling event"
                    );
                }
            }
        }
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::AlertNotice;
    use parking_lot::Mutex;

    fn alert(id: &str) -> ChannelEvent {
        ChannelEvent::Alert(AlertNotice::new(id, "Acme", "Malware detected", 8.5))
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Arc<dyn Observer> {
        let log = Arc::clone(log);
        Arc::new(move |event: &ChannelEvent| -> ObserverResult {
            let id = event.as_alert().map(|a| a.alert_id.clone()).unwrap_or_default();
            log.lock().push(format!("{name}:{id}"));
            Ok(())
        })
    }

    #[test]
    fn test_notify_in_subscription_order() {
        let registry = ObserverRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.subscribe(recorder(&log, "first"));
        registry.subscribe(recorder(&log, "second"));
        registry.subscribe(recorder(&log, "third"));

        let report = registry.notify(&alert("A1"));
        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(*log.lock(), vec!["first:A1", "second:A1", "third:A1"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let registry = ObserverRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = registry.subscribe(recorder(&log, "first"));
        registry.subscribe(recorder(&log, "second"));

        registry.notify(&alert("A1"));
        assert!(registry.unsubscribe(first));
        assert!(!registry.unsubscribe(first));
        registry.notify(&alert("A2"));

        assert_eq!(*log.lock(), vec!["first:A1", "second:A1", "second:A2"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failing_observer_does_not_block_others() {
        let registry = ObserverRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.subscribe(Arc::new(|_: &ChannelEvent| -> ObserverResult {
            Err("boom".into())
        }));
        registry.subscribe(recorder(&log, "healthy"));

        let report = registry.notify(&alert("A1"));
        assert_eq!(report, DeliveryReport { delivered: 1, failed: 1 });
        assert_eq!(*log.lock(), vec!["healthy:A1"]);
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let registry = ObserverRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.subscribe(Arc::new(|_: &ChannelEvent| -> ObserverResult {
            panic!("observer bug");
        }));
        registry.subscribe(recorder(&log, "healthy"));

        let report = registry.notify(&alert("A1"));
        assert_eq!(report.failed, 1);
        assert_eq!(*log.lock(), vec!["healthy:A1"]);

        // Still usable after a panic.
        registry.notify(&alert("A2"));
        assert_eq!(*log.lock(), vec!["healthy:A1", "healthy:A2"]);
    }

    #[test]
    fn test_unsubscribe_from_inside_callback() {
        let registry = Arc::new(ObserverRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let second_id = Arc::new(Mutex::new(None::<ObserverId>));

        {
            let inner = Arc::clone(&registry);
            let second_id = Arc::clone(&second_id);
            registry.subscribe(Arc::new(move |_: &ChannelEvent| -> ObserverResult {
                if let Some(id) = second_id.lock().take() {
                    inner.unsubscribe(id);
                }
                Ok(())
            }));
        }
        *second_id.lock() = Some(registry.subscribe(recorder(&log, "second")));
        registry.subscribe(recorder(&log, "third"));

        let report = registry.notify(&alert("A1"));
        assert_eq!(report.delivered, 2);
        assert_eq!(*log.lock(), vec!["third:A1"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_subscribe_from_inside_callback_applies_to_next_event() {
        let registry = Arc::new(ObserverRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let added = Arc::new(Mutex::new(false));

        {
            let inner = Arc::clone(&registry);
            let log = Arc::clone(&log);
            registry.subscribe(Arc::new(move |_: &ChannelEvent| -> ObserverResult {
                let mut added = added.lock();
                if !*added {
                    *added = true;
                    inner.subscribe(recorder(&log, "late"));
                }
                Ok(())
            }));
        }

        registry.notify(&alert("A1"));
        assert!(log.lock().is_empty());
        registry.notify(&alert("A2"));
        assert_eq!(*log.lock(), vec!["late:A2"]);
    }

    #[test]
    fn test_clear() {
        let registry = ObserverRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.subscribe(recorder(&log, "a"));
        registry.subscribe(recorder(&log, "b"));
        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
        assert_eq!(registry.notify(&alert("A1")), DeliveryReport::default());
    }
}
