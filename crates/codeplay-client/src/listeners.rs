//! Callback registries with scoped subscriptions.
//!
//! Handlers run on the client's reader task, in registration order, once
//! per event. The lock is never held while a handler runs, so a handler
//! may subscribe or unsubscribe without deadlocking.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct HandlerSet<T: ?Sized> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

/// A set of handlers for one kind of event.
pub struct Listeners<T: ?Sized> {
    inner: Arc<Mutex<HandlerSet<T>>>,
}

impl<T: ?Sized + 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HandlerSet {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    /// Adds a handler. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let handler: Handler<T> = Arc::new(handler);
        let id = {
            let mut set = lock(&self.inner);
            let id = set.next_id;
            set.next_id += 1;
            set.handlers.push((id, handler));
            id
        };

        let weak: Weak<Mutex<HandlerSet<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            release: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).handlers.retain(|(hid, _)| *hid != id);
                }
            })),
        }
    }

    /// Invokes every registered handler with `value`.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Handler<T>> = lock(&self.inner)
            .handlers
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in snapshot {
            handler(value);
        }
    }

    /// Drops every handler. Outstanding subscriptions become no-ops.
    pub fn clear(&self) {
        lock(&self.inner).handlers.clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized + 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = lock(&self.inner).handlers.len();
        f.debug_struct("Listeners").field("handlers", &count).finish()
    }
}

// A handler that panicked must not wedge every later emit.
fn lock<T: ?Sized>(inner: &Mutex<HandlerSet<T>>) -> MutexGuard<'_, HandlerSet<T>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// De-registration capability returned by every `on_*` method.
///
/// Dropping it removes the handler; keep it alive for as long as the
/// owning view wants events.
#[must_use = "dropping a Subscription immediately unregisters its handler"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Removes the handler now.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |s: &str| sink.lock().unwrap().push(s.to_string()))
    }

    #[test]
    fn test_emit_reaches_all_in_order() {
        let listeners: Listeners<str> = Listeners::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&order);
        let _a = listeners.subscribe(move |_| first.lock().unwrap().push(1));
        let second = Arc::clone(&order);
        let _b = listeners.subscribe(move |_| second.lock().unwrap().push(2));

        listeners.emit("x");
        listeners.emit("y");

        assert_eq!(*order.lock().unwrap(), vec![1, 2, 1, 2]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let listeners: Listeners<str> = Listeners::new();
        let (seen, handler) = recorder();

        let sub = listeners.subscribe(handler);
        listeners.emit("one");
        drop(sub);
        listeners.emit("two");

        assert_eq!(*seen.lock().unwrap(), vec!["one"]);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_unsubscribe_only_removes_its_own_handler() {
        let listeners: Listeners<str> = Listeners::new();
        let (kept_seen, kept) = recorder();
        let (gone_seen, gone) = recorder();

        let _kept = listeners.subscribe(kept);
        let gone_sub = listeners.subscribe(gone);
        gone_sub.unsubscribe();

        listeners.emit("hello");
        assert_eq!(*kept_seen.lock().unwrap(), vec!["hello"]);
        assert!(gone_seen.lock().unwrap().is_empty());
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_subscription_outliving_listeners() {
        let listeners: Listeners<str> = Listeners::new();
        let sub = listeners.subscribe(|_| {});
        drop(listeners);
        drop(sub);
    }

    #[test]
    fn test_clear_makes_subscriptions_inert() {
        let listeners: Listeners<str> = Listeners::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let sub = listeners.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        listeners.clear();
        listeners.emit("ignored");
        drop(sub);

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_may_subscribe_during_emit() {
        let listeners: Arc<Listeners<str>> = Arc::new(Listeners::new());
        let nested = Arc::new(Mutex::new(Vec::new()));

        let inner_listeners = Arc::clone(&listeners);
        let inner_nested = Arc::clone(&nested);
        let _outer = listeners.subscribe(move |_| {
            let sub = inner_listeners.subscribe(|_| {});
            inner_nested.lock().unwrap().push(sub);
        });

        listeners.emit("go");
        assert_eq!(listeners.len(), 2);
    }
}
