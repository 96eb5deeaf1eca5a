//! Key-routed dispatch: one callback list per event key.

use std::collections::HashMap;
use std::sync::Arc;

use riptide_core::callback_list::CallbackHandle;
use riptide_core::threading::{SharedMutex, Threading};

use crate::policy::{ArgsOf, ArgumentPassing, DefaultQueuePolicy, ListOf, LocalQueuePolicy, QueuePolicy};

type ListenerMap<Q> = HashMap<<Q as QueuePolicy>::Key, Arc<ListOf<Q>>>;

/// Maps event keys to shared callback lists and routes dispatches to them.
///
/// The map lock is only ever held to look a list up or create it; user
/// callbacks run against a cloned `Arc` of the per-key list, which is
/// internally safe, so no lock of this type is held across foreign code.
pub struct EventDispatcherBase<Q: QueuePolicy> {
    listener_map: <Q::Threading as Threading>::Mutex<ListenerMap<Q>>,
}

/// Multi-threaded dispatcher with type-erased callbacks.
pub type EventDispatcher<K, A> = EventDispatcherBase<DefaultQueuePolicy<K, A>>;

/// Single-threaded dispatcher. `!Sync`.
pub type LocalEventDispatcher<K, A> = EventDispatcherBase<LocalQueuePolicy<K, A>>;

impl<Q: QueuePolicy> EventDispatcherBase<Q> {
    pub fn new() -> Self {
        EventDispatcherBase {
            listener_map: <Q::Threading as Threading>::Mutex::new(HashMap::new()),
        }
    }

    /// Register `callback` at the tail of `key`'s list.
    pub fn append_listener(&self, key: Q::Key, callback: Q::Callback) -> CallbackHandle<Q::Callback> {
        self.list_for(key).append(callback)
    }

    /// Register `callback` at the head of `key`'s list.
    pub fn prepend_listener(
        &self,
        key: Q::Key,
        callback: Q::Callback,
    ) -> CallbackHandle<Q::Callback> {
        self.list_for(key).prepend(callback)
    }

    /// Register `callback` immediately before `before` in `key`'s list;
    /// appends if `before` is no longer registered.
    pub fn insert_listener(
        &self,
        key: Q::Key,
        callback: Q::Callback,
        before: &CallbackHandle<Q::Callback>,
    ) -> CallbackHandle<Q::Callback> {
        self.list_for(key).insert(callback, before)
    }

    /// Unregister the listener `handle` refers to. Returns true iff a live
    /// registration under `key` was removed.
    pub fn remove_listener(&self, key: &Q::Key, handle: &CallbackHandle<Q::Callback>) -> bool {
        match self.callback_list(key) {
            Some(list) => list.remove(handle),
            None => false,
        }
    }

    /// The shared callback list registered under `key`, if any listener was
    /// ever added for it.
    pub fn callback_list(&self, key: &Q::Key) -> Option<Arc<ListOf<Q>>> {
        let map = self.listener_map.lock();
        map.get(key).cloned()
    }

    /// Advisory: true iff `key` currently has live listeners.
    pub fn has_listeners(&self, key: &Q::Key) -> bool {
        self.callback_list(key)
            .is_some_and(|list| !list.is_empty())
    }

    /// Invoke `key`'s listeners with `args`, forwarding per the policy's
    /// argument-passing mode. A key nobody listens to dispatches to nothing.
    pub fn dispatch(&self, key: &Q::Key, args: &ArgsOf<Q>) {
        if let Some(list) = self.callback_list(key) {
            Q::Passing::invoke_list(&list, args);
        }
    }

    fn list_for(&self, key: Q::Key) -> Arc<ListOf<Q>> {
        let mut map = self.listener_map.lock();
        Arc::clone(map.entry(key).or_default())
    }
}

impl<Q: QueuePolicy> Default for EventDispatcherBase<Q> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riptide_core::FnCallback;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_routes_by_key() {
        let dispatcher: EventDispatcher<i32, i32> = EventDispatcher::new();
        let hits = Arc::new(Mutex::new(Vec::new()));

        for key in [1, 2] {
            let hits = Arc::clone(&hits);
            dispatcher.append_listener(
                key,
                FnCallback::new(move |value: &i32| hits.lock().unwrap().push((key, *value))),
            );
        }

        dispatcher.dispatch(&1, &10);
        dispatcher.dispatch(&2, &20);
        dispatcher.dispatch(&3, &30);

        assert_eq!(*hits.lock().unwrap(), vec![(1, 10), (2, 20)]);
    }

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let dispatcher: EventDispatcher<&'static str, ()> = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            let log = Arc::clone(&log);
            dispatcher.append_listener(
                "event",
                FnCallback::new(move |_| log.lock().unwrap().push(name)),
            );
        }

        dispatcher.dispatch(&"event", &());
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_remove_listener() {
        let dispatcher: EventDispatcher<i32, ()> = EventDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let handle = {
            let calls = Arc::clone(&calls);
            dispatcher.append_listener(
                7,
                FnCallback::new(move |_| {
                    calls.fetch_add(1, Ordering::Relaxed);
                }),
            )
        };

        assert!(dispatcher.has_listeners(&7));
        assert!(dispatcher.remove_listener(&7, &handle));
        assert!(!dispatcher.remove_listener(&7, &handle));
        assert!(!dispatcher.remove_listener(&8, &handle));
        assert!(!dispatcher.has_listeners(&7));

        dispatcher.dispatch(&7, &());
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_callback_list_is_shared() {
        let dispatcher: EventDispatcher<i32, ()> = EventDispatcher::new();
        dispatcher.append_listener(1, FnCallback::new(|_| {}));

        // The list handed out is the live list, not a copy.
        let list = dispatcher.callback_list(&1).unwrap();
        list.append(FnCallback::new(|_| {}));
        assert_eq!(dispatcher.callback_list(&1).unwrap().len(), 2);

        assert!(dispatcher.callback_list(&2).is_none());
    }
}
