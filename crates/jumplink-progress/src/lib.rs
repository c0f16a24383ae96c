//! Fan-out of typed progress events from the transfer layer to registered
//! observers: a console renderer, a metrics sink, or (in tests) a simple
//! recorder. The bus owns a fixed event vocabulary rather than a
//! duck-typed "progress subject".

use std::sync::{Arc, Mutex};

use rand::Rng;

/// Generate an 8-character opaque task identifier, unique within the
/// process lifetime for practical purposes.
pub fn generate_task_id() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..8)
        .map(|_| {
            let idx = rng.random_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}

/// Events a [`ProgressBus`] can carry. One file's worth of events is
/// always `TaskStarted < ProgressAdvanced* < (TaskFinished | TaskError)`.
#[derive(Debug, Clone)]
pub enum Event {
    TaskStarted {
        task_id: String,
        description: String,
        total: u64,
    },
    ProgressAdvanced {
        task_id: String,
        advance: u64,
    },
    TaskFinished {
        task_id: String,
        success: bool,
        description: Option<String>,
    },
    TaskError {
        task_id: String,
        message: String,
    },
    NetworkQualityChanged {
        old_latency_s: f64,
        new_latency_s: f64,
    },
}

/// Capability set an observer implements. `start`/`stop` are optional
/// lifecycle hooks driven by the enclosing scope, never by the bus itself.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &Event);

    fn start(&self) {}
    fn stop(&self) {}
}

/// Fans out [`Event`]s to every registered [`Observer`] in registration
/// order. An observer that panics on `on_event` is caught and logged so
/// delivery continues to the remaining observers.
#[derive(Clone, Default)]
pub struct ProgressBus {
    observers: Arc<Mutex<Vec<Arc<dyn Observer>>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer, returning a handle that can be used with
    /// [`ProgressBus::deregister`].
    pub fn register(&self, observer: Arc<dyn Observer>) -> ObserverHandle {
        let mut guard = self.observers.lock().expect("progress bus poisoned");
        guard.push(observer.clone());
        ObserverHandle(observer)
    }

    pub fn deregister(&self, handle: &ObserverHandle) {
        let mut guard = self.observers.lock().expect("progress bus poisoned");
        guard.retain(|o| !Arc::ptr_eq(o, &handle.0));
    }

    /// Dispatch `event` to every observer, in registration order, outside
    /// the registration-list's critical section so an observer callback
    /// can never deadlock the bus.
    pub fn publish(&self, event: Event) {
        let snapshot: Vec<Arc<dyn Observer>> = {
            let guard = self.observers.lock().expect("progress bus poisoned");
            guard.clone()
        };
        for observer in snapshot {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                observer.on_event(&event);
            }));
            if let Err(_panic) = result {
                tracing::warn!("progress observer panicked while handling event; skipping it");
            }
        }
    }
}

/// Opaque handle returned by [`ProgressBus::register`], used only to
/// deregister the same observer later.
pub struct ObserverHandle(Arc<dyn Observer>);

/// Observer that forwards every event to `tracing`: lifecycle transitions
/// at `info`, per-chunk `ProgressAdvanced` at `debug`.
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &Event) {
        match event {
            Event::TaskStarted {
                task_id,
                description,
                total,
            } => {
                tracing::info!(task_id, description, total, "task started");
            }
            Event::ProgressAdvanced { task_id, advance } => {
                tracing::debug!(task_id, advance, "progress advanced");
            }
            Event::TaskFinished {
                task_id,
                success,
                description,
            } => {
                tracing::info!(task_id, success, ?description, "task finished");
            }
            Event::TaskError { task_id, message } => {
                tracing::error!(task_id, message, "task error");
            }
            Event::NetworkQualityChanged {
                old_latency_s,
                new_latency_s,
            } => {
                tracing::info!(old_latency_s, new_latency_s, "network quality changed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver(AtomicUsize);

    impl Observer for CountingObserver {
        fn on_event(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingObserver;

    impl Observer for PanickingObserver {
        fn on_event(&self, _event: &Event) {
            panic!("boom");
        }
    }

    #[test]
    fn delivers_to_observers_in_registration_order() {
        let bus = ProgressBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        struct Recorder(Arc<Mutex<Vec<&'static str>>>, &'static str);
        impl Observer for Recorder {
            fn on_event(&self, _event: &Event) {
                self.0.lock().unwrap().push(self.1);
            }
        }

        bus.register(Arc::new(Recorder(log.clone(), "first")));
        bus.register(Arc::new(Recorder(log.clone(), "second")));
        bus.publish(Event::TaskStarted {
            task_id: "abc".into(),
            description: "x".into(),
            total: 0,
        });

        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn a_panicking_observer_does_not_break_delivery_to_peers() {
        let bus = ProgressBus::new();
        let counter = Arc::new(CountingObserver(AtomicUsize::new(0)));
        bus.register(Arc::new(PanickingObserver));
        bus.register(counter.clone());

        bus.publish(Event::TaskError {
            task_id: "abc".into(),
            message: "boom".into(),
        });

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deregistered_observers_stop_receiving_events() {
        let bus = ProgressBus::new();
        let counter = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let handle = bus.register(counter.clone());
        bus.deregister(&handle);

        bus.publish(Event::TaskError {
            task_id: "abc".into(),
            message: "boom".into(),
        });

        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn task_ids_are_eight_characters() {
        let id = generate_task_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
