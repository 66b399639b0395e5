//! Controller notifications.
//!
//! Provides `ControllerEvent` for user-facing notices and `EventBus` for
//! subscriptions. Callbacks run on the task
//! that completed the operation, after the controller's state is updated.

use crate::version::VersionDescriptor;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Outcome notices emitted by a `DocumentController`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControllerEvent {
    /// Latest version loaded. `latest` is `None` for a document with no versions yet.
    Loaded {
        #[serde(rename = "documentId")]
        document_id: String,
        latest: Option<VersionDescriptor>,
    },
    /// Loading the latest version failed; state was left as it was.
    LoadFailed {
        #[serde(rename = "documentId")]
        document_id: String,
        message: String,
    },
    /// The service accepted a new version. Reconciling it follows, reported
    /// as `Saved` or `SaveFailed`.
    VersionCreated {
        #[serde(rename = "documentId")]
        document_id: String,
    },
    /// A new version was created and reconciled.
    Saved {
        #[serde(rename = "documentId")]
        document_id: String,
        latest: Option<VersionDescriptor>,
    },
    /// Creating or reconciling a new version failed; the edit buffer is preserved.
    SaveFailed {
        #[serde(rename = "documentId")]
        document_id: String,
        message: String,
    },
    /// View (read-only) mode toggled.
    ViewModeChanged {
        #[serde(rename = "documentId")]
        document_id: String,
        #[serde(rename = "viewMode")]
        view_mode: bool,
    },
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Hold this value to keep receiving events, drop it to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

type Callback = Arc<dyn Fn(ControllerEvent) + Send + Sync>;

/// Event bus for publishing controller events to subscribers.
///
/// Wrap in `Arc` to enable subscriptions.
#[derive(Default)]
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(ControllerEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write: a Subscription may drop during unwinding while this
        // thread still holds the read lock
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(cb_id, _)| *cb_id != id);
        }
    }

    /// Emit an event to all subscribers.
    ///
    /// Callbacks are cloned out first so a callback may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, event: ControllerEvent) {
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for cb in callbacks {
            cb(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn saved() -> ControllerEvent {
        ControllerEvent::Saved {
            document_id: "doc1".into(),
            latest: None,
        }
    }

    #[test]
    fn test_subscribe_and_emit() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let _sub = bus.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event);
        });

        bus.emit(saved());

        assert_eq!(*seen.lock().unwrap(), vec![saved()]);
    }

    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        {
            let _sub = bus.subscribe(move |_event| {
                count_clone.fetch_add(1, Ordering::Relaxed);
            });
            bus.emit(saved());
        }

        bus.emit(saved());
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_callback_may_drop_its_own_subscription() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let sub = bus.subscribe({
            let count = Arc::clone(&count);
            let slot = Arc::clone(&slot);
            move |_event| {
                count.fetch_add(1, Ordering::Relaxed);
                slot.lock().unwrap().take();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        bus.emit(saved());
        bus.emit(saved());

        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert!(slot.lock().unwrap().is_none());
    }

    #[test]
    fn test_unsubscribe_while_read_locked_does_not_block() {
        let bus = Arc::new(EventBus::new());
        let sub = bus.subscribe(|_event| {});

        let held = bus.callbacks.read().unwrap();
        drop(sub);
        assert_eq!(held.len(), 1);
        drop(held);

        // Skipped removal leaves a stale entry, never a deadlock
        bus.emit(saved());
    }

    #[test]
    fn test_event_serialization() {
        let event = ControllerEvent::ViewModeChanged {
            document_id: "doc1".into(),
            view_mode: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "viewModeChanged", "documentId": "doc1", "viewMode": true})
        );
    }
}
