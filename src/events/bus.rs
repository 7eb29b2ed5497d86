//! Named-event publish/subscribe.
//!
//! Emission snapshots the listener list under the lock and invokes the
//! snapshot with no lock held. One-shot listeners leave the list as part of
//! the snapshot, so they can never fire twice even if a listener emits the
//! same event re-entrantly. A listener removed while an emission is in
//! progress still runs for that emission; one added during it first runs on
//! the next.

use parking_lot::Mutex;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle returned by [`EventBus::on`] and [`EventBus::once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Persistent<A> = Arc<dyn Fn(&A) + Send + Sync>;
type OneShot<A> = Box<dyn FnOnce(&A) + Send>;

enum Listener<A> {
    On(Persistent<A>),
    Once(OneShot<A>),
}

struct Entry<A> {
    id: ListenerId,
    listener: Listener<A>,
}

pub struct EventBus<K, A> {
    listeners: Mutex<HashMap<K, Vec<Entry<A>>>>,
    next_id: AtomicU64,
}

impl<K, A> EventBus<K, A>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener for every future emission of `event`.
    pub fn on<F>(&self, event: K, listener: F) -> ListenerId
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.register(event, Listener::On(Arc::new(listener)))
    }

    /// Register a listener for the next emission of `event` only.
    pub fn once<F>(&self, event: K, listener: F) -> ListenerId
    where
        F: FnOnce(&A) + Send + 'static,
    {
        self.register(event, Listener::Once(Box::new(listener)))
    }

    fn register(&self, event: K, listener: Listener<A>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(event)
            .or_default()
            .push(Entry { id, listener });
        id
    }

    /// Remove a listener. Returns `false` if it already fired (one-shot) or
    /// was never registered under `event`.
    pub fn off<Q>(&self, event: &Q, id: ListenerId) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut map = self.listeners.lock();
        let Some(entries) = map.get_mut(event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            map.remove(event);
        }
        removed
    }

    pub fn remove_all<Q>(&self, event: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.listeners.lock().remove(event);
    }

    pub fn listener_count<Q>(&self, event: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.listeners.lock().get(event).map_or(0, Vec::len)
    }

    /// Invoke every listener registered for `event`, in registration order.
    /// Returns how many ran.
    pub fn emit<Q>(&self, event: &Q, args: &A) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let ready = {
            let mut map = self.listeners.lock();
            let Some(entries) = map.get_mut(event) else {
                return 0;
            };

            let mut ready = Vec::with_capacity(entries.len());
            let mut kept = Vec::with_capacity(entries.len());
            for entry in entries.drain(..) {
                match entry.listener {
                    Listener::On(f) => {
                        ready.push(Listener::On(f.clone()));
                        kept.push(Entry {
                            id: entry.id,
                            listener: Listener::On(f),
                        });
                    }
                    Listener::Once(f) => ready.push(Listener::Once(f)),
                }
            }

            *entries = kept;
            if entries.is_empty() {
                map.remove(event);
            }
            ready
        };

        let count = ready.len();
        for listener in ready {
            match listener {
                Listener::On(f) => f(args),
                Listener::Once(f) => f(args),
            }
        }
        count
    }
}

impl<K: Eq + Hash, A> Default for EventBus<K, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, A> fmt::Debug for EventBus<K, A>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.listeners.lock();
        let mut out = f.debug_map();
        for (event, entries) in map.iter() {
            out.entry(event, &entries.len());
        }
        out.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_without_listeners_is_noop() {
        let bus: EventBus<&'static str, u32> = EventBus::new();
        assert_eq!(bus.emit("free", &1), 0);
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let bus: EventBus<&'static str, u32> = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            bus.on("tick", move |n: &u32| seen.lock().push((tag, *n)));
        }

        assert_eq!(bus.emit("tick", &7), 3);
        assert_eq!(*seen.lock(), vec![("a", 7), ("b", 7), ("c", 7)]);
    }

    #[test]
    fn test_once_fires_at_most_once() {
        let bus: EventBus<&'static str, ()> = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        bus.once("free", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.listener_count("free"), 1);
        bus.emit("free", &());
        bus.emit("free", &());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("free"), 0);
    }

    #[test]
    fn test_reentrant_emit_does_not_double_fire_once() {
        let bus: Arc<EventBus<&'static str, ()>> = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let inner = bus.clone();
        let h = hits.clone();
        bus.once("free", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            inner.emit("free", &());
        });

        bus.emit("free", &());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_once_registered_during_emit_waits_for_next_emit() {
        let bus: Arc<EventBus<&'static str, ()>> = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let inner = bus.clone();
        let h = hits.clone();
        bus.once("free", move |_| {
            let h = h.clone();
            inner.once("free", move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            });
        });

        bus.emit("free", &());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        bus.emit("free", &());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_during_emit_neither_skips_nor_repeats() {
        let bus: Arc<EventBus<&'static str, ()>> = Arc::new(EventBus::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let second_id = Arc::new(Mutex::new(None));

        let b = bus.clone();
        let o = order.clone();
        let s = second_id.clone();
        bus.on("tick", move |_| {
            o.lock().push(1);
            if let Some(id) = s.lock().take() {
                b.off("tick", id);
            }
        });

        let o = order.clone();
        let id = bus.on("tick", move |_| o.lock().push(2));
        *second_id.lock() = Some(id);

        let o = order.clone();
        bus.on("tick", move |_| o.lock().push(3));

        bus.emit("tick", &());
        bus.emit("tick", &());
        assert_eq!(*order.lock(), vec![1, 2, 3, 1, 3]);
    }

    #[test]
    fn test_off_and_remove_all() {
        let bus: EventBus<&'static str, ()> = EventBus::new();
        let id = bus.on("a", |_| {});
        bus.once("a", |_| {});
        bus.on("b", |_| {});

        assert!(bus.off("a", id));
        assert!(!bus.off("a", id));
        assert_eq!(bus.listener_count("a"), 1);

        bus.remove_all("a");
        assert_eq!(bus.listener_count("a"), 0);
        assert_eq!(bus.listener_count("b"), 1);
    }

    #[test]
    fn test_events_are_isolated_by_name() {
        let bus: EventBus<&'static str, ()> = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        bus.on("error", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.emit("free", &()), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
