//! Listener registration
//!
//! Listeners are stored as trait objects behind a handle so they can be
//! removed later. Registration order is notification order.

use parking_lot::RwLock;
use std::sync::Arc;

/// Handle for a registered listener.
///
/// Uniquely identifies a listener subscription. Can be used to unsubscribe
/// from events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub String);

impl ListenerHandle {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Ordered set of listeners of one kind
pub struct ListenerRegistry<L: ?Sized> {
    listeners: RwLock<Vec<(ListenerHandle, Arc<L>)>>,
}

impl<L: ?Sized> ListenerRegistry<L> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener and return its handle
    pub fn register(&self, listener: Arc<L>) -> ListenerHandle {
        let handle = ListenerHandle::generate();
        self.listeners.write().push((handle.clone(), listener));
        tracing::trace!("Registered listener {}", handle.0);
        handle
    }

    /// Remove a listener. Returns false if the handle was unknown.
    pub fn unregister(&self, handle: &ListenerHandle) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(h, _)| h != handle);
        let removed = listeners.len() != before;
        if removed {
            tracing::trace!("Removed listener {}", handle.0);
        }
        removed
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Invoke `f` on every listener.
    ///
    /// The lock is released before the callbacks run, so a listener may
    /// register or remove listeners from inside a notification.
    pub fn notify(&self, mut f: impl FnMut(&L)) {
        let snapshot: Vec<Arc<L>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in &snapshot {
            f(listener);
        }
    }
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Counter: Send + Sync {
        fn hit(&self);
    }

    struct Hits(AtomicUsize);

    impl Counter for Hits {
        fn hit(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn register_notify_unregister() {
        let registry: ListenerRegistry<dyn Counter> = ListenerRegistry::new();
        let hits = Arc::new(Hits(AtomicUsize::new(0)));
        let handle = registry.register(hits.clone());
        assert_eq!(registry.len(), 1);

        registry.notify(|l| l.hit());
        assert_eq!(hits.0.load(Ordering::SeqCst), 1);

        assert!(registry.unregister(&handle));
        assert!(!registry.unregister(&handle));
        registry.notify(|l| l.hit());
        assert_eq!(hits.0.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }
}
