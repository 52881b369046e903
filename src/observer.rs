//! Generic thread-safe observer list.
//!
//! `notify` snapshots the registered observers under the internal lock,
//! releases the lock, then invokes each observer in registration order.
//! An observer may therefore call back into the emitter (or register /
//! unregister observers) from inside its handler without deadlocking;
//! registrations made during a notify cycle take effect from the next
//! cycle. A panicking observer is caught and logged, and the remaining
//! observers are still notified.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::Mutex;

pub struct ObserverManager<T: ?Sized> {
    observers: Mutex<Vec<Arc<T>>>,
}

impl<T: ?Sized> ObserverManager<T> {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Add an observer. Duplicate registrations of the same `Arc` are
    /// ignored.
    pub fn register(&self, observer: Arc<T>) {
        let mut observers = self.observers.lock();
        if !observers.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            observers.push(observer);
        }
    }

    /// Remove an observer by identity.
    pub fn unregister(&self, observer: &Arc<T>) {
        self.observers.lock().retain(|o| !Arc::ptr_eq(o, observer));
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.lock().is_empty()
    }

    /// Copy-then-notify: the lock is released before any observer runs.
    pub fn notify<F>(&self, f: F)
    where
        F: Fn(&T),
    {
        let snapshot: Vec<Arc<T>> = self.observers.lock().clone();
        for observer in &snapshot {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| f(observer.as_ref())));
            if let Err(payload) = result {
                let message = payload
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| payload.downcast_ref::<String>().map(|s| s.as_str()))
                    .unwrap_or("<no message>");
                log::error!("[ObserverManager] observer panicked during notify: {message}");
            }
        }
    }
}

impl<T: ?Sized> Default for ObserverManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Counter: Send + Sync {
        fn bump(&self);
    }

    struct Hits(AtomicUsize);

    impl Counter for Hits {
        fn bump(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicker;

    impl Counter for Panicker {
        fn bump(&self) {
            panic!("observer failure");
        }
    }

    #[test]
    fn test_notify_reaches_all_observers() {
        let manager: ObserverManager<dyn Counter> = ObserverManager::new();
        let a = Arc::new(Hits(AtomicUsize::new(0)));
        let b = Arc::new(Hits(AtomicUsize::new(0)));
        manager.register(a.clone());
        manager.register(b.clone());

        manager.notify(|o| o.bump());

        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_register_ignored() {
        let manager: ObserverManager<dyn Counter> = ObserverManager::new();
        let a = Arc::new(Hits(AtomicUsize::new(0)));
        manager.register(a.clone());
        manager.register(a.clone());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let manager: ObserverManager<dyn Counter> = ObserverManager::new();
        let a = Arc::new(Hits(AtomicUsize::new(0)));
        let obs: Arc<dyn Counter> = a.clone();
        manager.register(obs.clone());
        manager.unregister(&obs);

        manager.notify(|o| o.bump());
        assert_eq!(a.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_observer_does_not_stop_fanout() {
        let manager: ObserverManager<dyn Counter> = ObserverManager::new();
        let survivor = Arc::new(Hits(AtomicUsize::new(0)));
        manager.register(Arc::new(Panicker));
        manager.register(survivor.clone());

        manager.notify(|o| o.bump());
        assert_eq!(survivor.0.load(Ordering::SeqCst), 1);
    }

    struct Reentrant {
        manager: Arc<ObserverManager<dyn Counter>>,
        late: Arc<Hits>,
        registered: AtomicUsize,
    }

    impl Counter for Reentrant {
        fn bump(&self) {
            if self.registered.fetch_add(1, Ordering::SeqCst) == 0 {
                self.manager.register(self.late.clone());
            }
        }
    }

    #[test]
    fn test_registration_during_notify_takes_effect_next_cycle() {
        let manager: Arc<ObserverManager<dyn Counter>> = Arc::new(ObserverManager::new());
        let late = Arc::new(Hits(AtomicUsize::new(0)));
        let reentrant = Arc::new(Reentrant {
            manager: manager.clone(),
            late: late.clone(),
            registered: AtomicUsize::new(0),
        });
        manager.register(reentrant);

        // First cycle registers `late` but must not deliver to it.
        manager.notify(|o| o.bump());
        assert_eq!(late.0.load(Ordering::SeqCst), 0);

        // Second cycle reaches it.
        manager.notify(|o| o.bump());
        assert_eq!(late.0.load(Ordering::SeqCst), 1);
    }
}
