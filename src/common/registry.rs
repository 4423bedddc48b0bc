//! Token-keyed handler registry
//!
//! Used by the push transport (message and status handlers) and by the
//! session notification bus. Handlers are invoked outside the lock, so a
//! handler may subscribe or unsubscribe without deadlocking.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::types::SubscriptionToken;

/// Boxed handler stored in a registry
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A set of handlers for one event type
pub struct Registry<E: ?Sized> {
    next_id: Arc<AtomicU64>,
    handlers: RwLock<BTreeMap<u64, Handler<E>>>,
}

impl<E: ?Sized> Registry<E> {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            handlers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry whose tokens never collide with `other`'s, so one
    /// `unsubscribe` entry point can serve both
    pub fn sharing_ids_with<F: ?Sized>(other: &Registry<F>) -> Self {
        Self {
            next_id: other.next_id.clone(),
            handlers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a handler and return the token that removes it
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.write().insert(id, Arc::new(handler));
        SubscriptionToken(id)
    }

    /// Remove a handler. Returns false if the token was unknown (already removed).
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.handlers.write().remove(&token.0).is_some()
    }

    /// Invoke every handler in registration order
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = self.handlers.read().values().cloned().collect();
        for handler in snapshot {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    pub fn clear(&self) {
        self.handlers.write().clear();
    }
}

impl<E: ?Sized> Default for Registry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ?Sized> std::fmt::Debug for Registry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("handlers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_reaches_all_handlers() {
        let registry: Registry<u32> = Registry::new();
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let total = total.clone();
            registry.subscribe(move |value: &u32| {
                total.fetch_add(*value as usize, Ordering::SeqCst);
            });
        }

        registry.emit(&2);
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_unsubscribe_is_deterministic() {
        let registry: Registry<u32> = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let token = registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(registry.unsubscribe(token));
        assert!(!registry.unsubscribe(token));
        registry.emit(&1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_shared_ids_do_not_collide() {
        let first: Registry<u32> = Registry::new();
        let second: Registry<String> = Registry::sharing_ids_with(&first);

        let a = first.subscribe(|_| {});
        let b = second.subscribe(|_| {});
        assert_ne!(a, b);
        assert!(!second.unsubscribe(a));
        assert!(first.unsubscribe(a));
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let registry: Arc<Registry<u32>> = Arc::new(Registry::new());
        let token_slot = Arc::new(parking_lot::Mutex::new(None));

        let inner_registry = registry.clone();
        let inner_slot = token_slot.clone();
        let token = registry.subscribe(move |_| {
            if let Some(token) = inner_slot.lock().take() {
                inner_registry.unsubscribe(token);
            }
        });
        *token_slot.lock() = Some(token);

        registry.emit(&0);
        assert!(registry.is_empty());
    }
}
