//! Producer/consumer FIFO of typed events routed to per-key callback lists.
//!
//! Producers [`enqueue`] events; consumers [`process`] them, dispatching
//! each through the owned [`EventDispatcherBase`]. A monitor (mutex +
//! condition variable) coordinates blocking consumers, and a scoped
//! [`DisableNotify`] token batches wake-ups.
//!
//! [`enqueue`]: EventQueueBase::enqueue
//! [`process`]: EventQueueBase::process

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use riptide_core::callback_list::CallbackHandle;
use riptide_core::threading::{SharedMutex, Threading, WaitableMutex};

use crate::dispatcher::EventDispatcherBase;
use crate::node_list::{NodeList, QueueNode};
use crate::policy::{ArgsOf, DefaultQueuePolicy, GetEventKey, ListOf, LocalQueuePolicy, QueuePolicy};
use crate::queued_event::QueuedEvent;

struct QueueState<K, A> {
    busy: NodeList<K, A>,
    idle: NodeList<K, A>,
}

/// Event queue generic over a [`QueuePolicy`]. Most code wants the
/// [`EventQueue`] or [`LocalEventQueue`] alias.
///
/// Lock discipline: the queue monitor is held only for O(1) list surgery
/// (node acquisition, tail linking, the busy/processing swap). It is never
/// held while a user callback runs.
pub struct EventQueueBase<Q: QueuePolicy> {
    dispatcher: EventDispatcherBase<Q>,
    state: <Q::Threading as Threading>::Monitor<QueueState<Q::Key, ArgsOf<Q>>>,
    busy_len: AtomicUsize,
    suppress_notify: AtomicUsize,
}

/// Multi-threaded event queue with type-erased callbacks.
pub type EventQueue<K, A> = EventQueueBase<DefaultQueuePolicy<K, A>>;

/// Single-threaded event queue. `!Sync`; waiting is a no-op.
pub type LocalEventQueue<K, A> = EventQueueBase<LocalQueuePolicy<K, A>>;

impl<Q: QueuePolicy> EventQueueBase<Q> {
    pub fn new() -> Self {
        EventQueueBase {
            dispatcher: EventDispatcherBase::new(),
            state: <Q::Threading as Threading>::Monitor::new(QueueState {
                busy: NodeList::new(),
                idle: NodeList::new(),
            }),
            busy_len: AtomicUsize::new(0),
            suppress_notify: AtomicUsize::new(0),
        }
    }

    // -------------------------------------------------------------------------
    // Listener surface, delegated to the owned dispatcher
    // -------------------------------------------------------------------------

    pub fn append_listener(&self, key: Q::Key, callback: Q::Callback) -> CallbackHandle<Q::Callback> {
        self.dispatcher.append_listener(key, callback)
    }

    pub fn prepend_listener(
        &self,
        key: Q::Key,
        callback: Q::Callback,
    ) -> CallbackHandle<Q::Callback> {
        self.dispatcher.prepend_listener(key, callback)
    }

    pub fn insert_listener(
        &self,
        key: Q::Key,
        callback: Q::Callback,
        before: &CallbackHandle<Q::Callback>,
    ) -> CallbackHandle<Q::Callback> {
        self.dispatcher.insert_listener(key, callback, before)
    }

    pub fn remove_listener(&self, key: &Q::Key, handle: &CallbackHandle<Q::Callback>) -> bool {
        self.dispatcher.remove_listener(key, handle)
    }

    pub fn has_listeners(&self, key: &Q::Key) -> bool {
        self.dispatcher.has_listeners(key)
    }

    pub fn callback_list(&self, key: &Q::Key) -> Option<Arc<ListOf<Q>>> {
        self.dispatcher.callback_list(key)
    }

    pub fn dispatcher(&self) -> &EventDispatcherBase<Q> {
        &self.dispatcher
    }

    // -------------------------------------------------------------------------
    // Queue surface
    // -------------------------------------------------------------------------

    /// Queue `(key, args)`. O(1): a node is recycled from the idle list (or
    /// allocated if none is parked there), linked to the busy tail, and one
    /// waiter is notified unless notification is suppressed.
    pub fn enqueue(&self, key: Q::Key, args: ArgsOf<Q>) {
        self.enqueue_event(QueuedEvent::new(key, args));
    }

    /// Like [`enqueue`](EventQueueBase::enqueue), deriving the key from the
    /// arguments through the policy.
    pub fn enqueue_from(&self, args: ArgsOf<Q>)
    where
        Q: GetEventKey,
    {
        let key = Q::event_key(&args);
        self.enqueue_event(QueuedEvent::new(key, args));
    }

    fn enqueue_event(&self, event: QueuedEvent<Q::Key, ArgsOf<Q>>) {
        {
            let mut state = self.state.lock();
            let mut node = state
                .idle
                .pop_front()
                .unwrap_or_else(|| Box::new(QueueNode::empty()));
            node.event = Some(event);
            state.busy.push_back(node);
            self.busy_len.store(state.busy.len(), Ordering::Relaxed);
        }

        if self.suppress_notify.load(Ordering::Acquire) == 0 {
            self.state.notify_one();
        }
    }

    /// Dispatch everything that was queued when the call started and return
    /// how many events were dispatched.
    ///
    /// The busy list is swapped out under the monitor in O(1); dispatch then
    /// runs without the queue lock. Events enqueued while processing land in
    /// the new busy list and wait for the next call. Concurrent `process`
    /// calls each dispatch only what they swapped out, so every event is
    /// dispatched exactly once. If a callback panics, the panic propagates
    /// after the in-flight nodes (including the not-yet-dispatched ones,
    /// whose events are dropped) have been recycled.
    pub fn process(&self) -> usize {
        if self.is_empty() {
            return 0;
        }

        let processing = {
            let mut state = self.state.lock();
            let list = state.busy.take_all();
            self.busy_len.store(0, Ordering::Relaxed);
            list
        };

        let mut pending = ProcessingGuard {
            queue: self,
            remaining: processing,
            recycled: NodeList::new(),
        };

        let mut dispatched = 0;
        while let Some(mut node) = pending.remaining.pop_front() {
            let event = node.event.take();
            pending.recycled.push_back(node);
            if let Some(event) = event {
                self.dispatch(&event);
                dispatched += 1;
            }
        }

        dispatched
    }

    /// Dispatch just the head event. Returns false on an empty queue.
    pub fn process_one(&self) -> bool {
        let node = {
            let mut state = self.state.lock();
            let node = state.busy.pop_front();
            self.busy_len.store(state.busy.len(), Ordering::Relaxed);
            node
        };
        let Some(mut node) = node else {
            return false;
        };

        let mut pending = ProcessingGuard {
            queue: self,
            remaining: NodeList::new(),
            recycled: NodeList::new(),
        };
        let event = node.event.take();
        pending.recycled.push_back(node);

        if let Some(event) = event {
            self.dispatch(&event);
        }
        true
    }

    /// Invoke the listeners for `event.key()` with the stored arguments,
    /// without touching the queue.
    pub fn dispatch(&self, event: &QueuedEvent<Q::Key, ArgsOf<Q>>) {
        self.dispatcher.dispatch(event.key(), event.args());
    }

    /// Advisory: true iff no events are queued. The answer may be stale
    /// under concurrency but is never torn.
    pub fn is_empty(&self) -> bool {
        self.busy_len.load(Ordering::Relaxed) == 0
    }

    /// Copy the head event out without consuming it. `None` on an empty
    /// queue.
    pub fn peek_event(&self) -> Option<QueuedEvent<Q::Key, ArgsOf<Q>>>
    where
        ArgsOf<Q>: Clone,
    {
        let state = self.state.lock();
        state.busy.front().and_then(|node| node.event.clone())
    }

    /// Move the head event out, recycling its node. `None` on an empty
    /// queue. Works with move-only argument types.
    pub fn take_event(&self) -> Option<QueuedEvent<Q::Key, ArgsOf<Q>>> {
        let mut state = self.state.lock();
        let mut node = state.busy.pop_front()?;
        self.busy_len.store(state.busy.len(), Ordering::Relaxed);
        let event = node.event.take();
        state.idle.push_back(node);
        event
    }

    /// Drop every queued event without dispatching, recycling the nodes.
    pub fn clear(&self) {
        let mut processing = {
            let mut state = self.state.lock();
            let list = state.busy.take_all();
            self.busy_len.store(0, Ordering::Relaxed);
            list
        };

        // Drop the events outside the monitor; argument drops are user code.
        let mut recycled = NodeList::new();
        while let Some(mut node) = processing.pop_front() {
            node.event = None;
            recycled.push_back(node);
        }

        let mut state = self.state.lock();
        state.idle.splice(recycled);
    }

    /// Block until at least one event is queued. Spurious wakeups re-check
    /// under the monitor. The queue may already be empty again by the time
    /// the caller acts (another consumer can drain it first).
    pub fn wait(&self) {
        let guard = self.state.lock();
        let _guard = self.state.wait_while(guard, |state| state.busy.is_empty());
    }

    /// Bounded [`wait`](EventQueueBase::wait): true iff the queue is
    /// non-empty when the wait ends, false on timeout.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let guard = self.state.lock();
        let (guard, _timed_out) =
            self.state
                .wait_timeout_while(guard, timeout, |state| state.busy.is_empty());
        !guard.busy.is_empty()
    }

    /// Scoped suppression of enqueue notifications; see [`DisableNotify`].
    pub fn disable_notify(&self) -> DisableNotify<'_, Q> {
        DisableNotify::new(self)
    }
}

impl<Q: QueuePolicy> Default for EventQueueBase<Q> {
    fn default() -> Self {
        Self::new()
    }
}

// Returns swapped-out nodes to the idle list when processing ends, whether
// it ran to completion or unwound out of a panicking callback. Events still
// pending on the unwind path are dropped here, before the nodes go back.
struct ProcessingGuard<'a, Q: QueuePolicy> {
    queue: &'a EventQueueBase<Q>,
    remaining: NodeList<Q::Key, ArgsOf<Q>>,
    recycled: NodeList<Q::Key, ArgsOf<Q>>,
}

impl<Q: QueuePolicy> Drop for ProcessingGuard<'_, Q> {
    fn drop(&mut self) {
        while let Some(mut node) = self.remaining.pop_front() {
            node.event = None;
            self.recycled.push_back(node);
        }
        let mut state = self.queue.state.lock();
        state.idle.splice(mem::take(&mut self.recycled));
    }
}

/// Scoped suppression of the queue's enqueue notifications.
///
/// While at least one token is live, `enqueue` skips waking consumers, so a
/// producer can batch a burst of events. Dropping the last token must itself
/// notify all waiters: events enqueued under suppression would otherwise
/// sleep until the next unsuppressed enqueue.
pub struct DisableNotify<'a, Q: QueuePolicy> {
    queue: &'a EventQueueBase<Q>,
}

impl<'a, Q: QueuePolicy> DisableNotify<'a, Q> {
    pub fn new(queue: &'a EventQueueBase<Q>) -> Self {
        queue.suppress_notify.fetch_add(1, Ordering::AcqRel);
        DisableNotify { queue }
    }
}

impl<Q: QueuePolicy> Drop for DisableNotify<'_, Q> {
    fn drop(&mut self) {
        if self.queue.suppress_notify.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.queue.state.notify_all();
        }
    }
}
