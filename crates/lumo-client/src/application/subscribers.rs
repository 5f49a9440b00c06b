//! Multi-subscriber event registry.
//!
//! Handlers are called synchronously, in registration order, on whichever
//! task calls [`Subscribers::notify`].  The handler list is snapshotted before
//! the calls, so a handler may subscribe or unsubscribe (itself or others)
//! without deadlocking; such changes take effect from the next notification.

use std::sync::{Arc, Mutex, PoisonError, Weak};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// An ordered list of handlers for events of type `T`.
pub struct Subscribers<T> {
    inner: Mutex<Registry<T>>,
}

struct Registry<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

impl<T: 'static> Subscribers<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Registry {
                next_id: 0,
                handlers: Vec::new(),
            }),
        })
    }

    /// Adds `handler` to the end of the list.
    ///
    /// The returned [`Subscription`] removes it again.  Dropping the
    /// subscription without calling `unsubscribe` keeps the handler.
    pub fn subscribe<F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut reg = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let id = reg.next_id;
            reg.next_id += 1;
            reg.handlers.push((id, Arc::new(handler)));
            id
        };
        let weak: Weak<Self> = Arc::downgrade(self);
        Subscription {
            cancel: Box::new(move || {
                if let Some(subs) = weak.upgrade() {
                    subs.remove(id);
                }
            }),
        }
    }

    /// Calls every handler with `event`.
    pub fn notify(&self, event: &T) {
        let snapshot: Vec<Handler<T>> = {
            let reg = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            reg.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in snapshot {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        let mut reg = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        reg.handlers.retain(|(hid, _)| *hid != id);
    }
}

/// Capability to remove one handler.
#[must_use = "keep the subscription to be able to unsubscribe later"]
pub struct Subscription {
    cancel: Box<dyn FnOnce() + Send + Sync>,
}

impl Subscription {
    /// Removes the handler.  Events already being delivered may still reach it.
    pub fn unsubscribe(self) {
        (self.cancel)();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Subscription")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handlers_run_in_registration_order() {
        // Arrange
        let subs = Subscribers::<u32>::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&log), Arc::clone(&log));
        let _s1 = subs.subscribe(move |v| a.lock().unwrap().push(("first", *v)));
        let _s2 = subs.subscribe(move |v| b.lock().unwrap().push(("second", *v)));

        // Act
        subs.notify(&7);

        // Assert
        assert_eq!(*log.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_handler() {
        let subs = Subscribers::<()>::new();
        let hits = Arc::new(Mutex::new(0));
        let h = Arc::clone(&hits);
        let keep = subs.subscribe(move |_| *h.lock().unwrap() += 1);
        let gone = subs.subscribe(|_| panic!("unsubscribed handler must not run"));

        gone.unsubscribe();
        subs.notify(&());

        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(subs.len(), 1);
        drop(keep);
    }

    #[test]
    fn test_dropping_subscription_keeps_handler() {
        let subs = Subscribers::<()>::new();
        drop(subs.subscribe(|_| {}));
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn test_handler_can_unsubscribe_others_during_notify() {
        // Arrange: the first handler removes the second one.
        let subs = Subscribers::<()>::new();
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let v = Arc::clone(&victim);
        let _killer = subs.subscribe(move |_| {
            if let Some(s) = v.lock().unwrap().take() {
                s.unsubscribe();
            }
        });
        *victim.lock().unwrap() = Some(subs.subscribe(|_| {}));

        // Act: must not deadlock.
        subs.notify(&());

        // Assert
        assert_eq!(subs.len(), 1);
    }
}
