//! Listener registry for session state changes.
//!
//! Notification iterates a snapshot of the registered listeners, never the
//! live list, so a listener may subscribe or unsubscribe while being notified.
//! A panicking listener is logged and skipped; it stays registered.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::error;

use super::state::SessionState;

/// A state change callback.
pub type Listener = Arc<dyn Fn(&SessionState) + Send + Sync>;

#[derive(Default)]
struct Registry {
    entries: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl Registry {
    fn entries(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Set of state listeners.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Registry>,
}

/// Handle returned by [`ListenerRegistry::add_listener`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    registry: Weak<Registry>,
    id: u64,
}

impl Subscription {
    /// Remove the listener. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.entries().retain(|(id, _)| *id != self.id);
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Listeners captured at one instant, ready to be notified.
#[derive(Clone, Default)]
pub struct ListenerSnapshot {
    listeners: Vec<Listener>,
}

impl ListenerSnapshot {
    /// Invoke every listener with `state`, isolating panics.
    pub fn deliver(&self, state: &SessionState) {
        for listener in &self.listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(state)));
            if let Err(payload) = outcome {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(version = state.version(), "Session listener panicked: {}", message);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Registering the same closure twice calls it twice.
    pub fn add_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.entries().push((id, Arc::new(listener)));
        Subscription {
            registry: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Copy the current listener list.
    pub fn snapshot(&self) -> ListenerSnapshot {
        ListenerSnapshot {
            listeners: self
                .inner
                .entries()
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect(),
        }
    }

    /// Notify a snapshot of the current listeners.
    pub fn notify(&self, state: &SessionState) {
        self.snapshot().deliver(state);
    }

    pub fn clear(&self) {
        self.inner.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
