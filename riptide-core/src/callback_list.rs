//! Concurrent, invocation-safe callback list.
//!
//! A [`CallbackListBase`] is a doubly-linked list of callbacks addressed by
//! stable [`CallbackHandle`]s. Registration, removal, and invocation may all
//! race from different threads; the list guarantees that
//!
//! - a callback that is being invoked is never dropped mid-call,
//! - a callback removed before a traversal reaches it is skipped,
//! - a callback appended after a traversal started is not observed by it.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::callback::{AlwaysContinue, Callback, ContinuationPredicate, FnCallback, LocalFnCallback};
use crate::threading::{AdmissionCounter, MultiThreaded, SharedMutex, SingleThreaded, Threading};

/// Stamp value marking a node as removed. Never handed out to a live node.
const REMOVED_STAMP: u64 = 0;

// =============================================================================
// ADMISSION & OWNERSHIP INVARIANTS
// =============================================================================
//
// Every node carries an admission stamp assigned from the list's current
// counter when it is created. A traversal snapshots the counter once, then
// admits a node iff
//
//          stamp != 0  &&  stamp <= snapshot
//
// so nodes appended after the snapshot (stamp > snapshot) are invisible to
// that traversal, and removed nodes (stamp == 0) are skipped wherever the
// traversal happens to encounter them.
//
// Ownership is shared: `next` links are strong (Arc), `prev` links are weak,
// so neighbor pairs never form a strong cycle. Removal rewires the
// neighbors' links but deliberately leaves the removed node's OWN links
// intact:
//
//   before:   A ───► B ───► C          remove(B):   A ──────────► C
//                                                        B ───► C
//
// A traversal parked on B (it holds a strong Arc to B) still advances
// through B.next into the live suffix. B itself is freed when the last
// traverser or removed predecessor drops its reference.
//
// Link cells are `UnsafeCell`s whose access contract is: the owning list's
// mutex is held, or the list is being dropped (exclusive access). The mutex
// is never held across a user callback.
//
struct Node<C> {
    callback: C,
    stamp: AtomicU64,
    prev: UnsafeCell<Weak<Node<C>>>,
    next: UnsafeCell<Option<Arc<Node<C>>>>,
}

// Safety: the link cells are only touched under the owning list's mutex (or
// during the exclusive drop walk), so `Node` is as thread-safe as its
// callback value.
unsafe impl<C: Send> Send for Node<C> {}
unsafe impl<C: Send + Sync> Sync for Node<C> {}

impl<C> Node<C> {
    fn new(callback: C, stamp: u64) -> Self {
        Node {
            callback,
            stamp: AtomicU64::new(stamp),
            prev: UnsafeCell::new(Weak::new()),
            next: UnsafeCell::new(None),
        }
    }

    /// Load the admission stamp (Acquire; pairs with the Release in
    /// [`set_stamp`](Node::set_stamp), which runs under the list mutex).
    fn stamp(&self) -> u64 {
        self.stamp.load(Ordering::Acquire)
    }

    fn set_stamp(&self, stamp: u64) {
        self.stamp.store(stamp, Ordering::Release);
    }

    /// # Safety
    /// The owning list's mutex must be held, or the list is being dropped.
    unsafe fn next(&self) -> Option<Arc<Node<C>>> {
        unsafe { (*self.next.get()).clone() }
    }

    /// # Safety
    /// The owning list's mutex must be held, or the list is being dropped.
    unsafe fn set_next(&self, next: Option<Arc<Node<C>>>) {
        unsafe {
            *self.next.get() = next;
        }
    }

    /// # Safety
    /// The owning list's mutex must be held, or the list is being dropped.
    unsafe fn take_next(&self) -> Option<Arc<Node<C>>> {
        unsafe { (*self.next.get()).take() }
    }

    /// # Safety
    /// The owning list's mutex must be held, or the list is being dropped.
    unsafe fn prev(&self) -> Weak<Node<C>> {
        unsafe { (*self.prev.get()).clone() }
    }

    /// # Safety
    /// The owning list's mutex must be held, or the list is being dropped.
    unsafe fn set_prev(&self, prev: Weak<Node<C>>) {
        unsafe {
            *self.prev.get() = prev;
        }
    }
}

/// Non-owning reference to a registered callback.
///
/// Handles never extend a callback's lifetime. They compare equal iff they
/// refer to the same registration; a default-constructed handle refers to
/// nothing and is never alive.
pub struct CallbackHandle<C> {
    node: Weak<Node<C>>,
}

impl<C> CallbackHandle<C> {
    fn from_node(node: &Arc<Node<C>>) -> Self {
        CallbackHandle {
            node: Arc::downgrade(node),
        }
    }

    /// True while the referenced callback is still registered.
    ///
    /// Advisory under concurrency: the callback may be removed right after
    /// this returns true. Operations that need an exact answer
    /// ([`CallbackListBase::remove`], [`CallbackListBase::insert`]) re-check
    /// under the list mutex.
    pub fn is_alive(&self) -> bool {
        self.node
            .upgrade()
            .is_some_and(|node| node.stamp() != REMOVED_STAMP)
    }
}

impl<C> Default for CallbackHandle<C> {
    fn default() -> Self {
        CallbackHandle { node: Weak::new() }
    }
}

impl<C> Clone for CallbackHandle<C> {
    fn clone(&self) -> Self {
        CallbackHandle {
            node: self.node.clone(),
        }
    }
}

impl<C> PartialEq for CallbackHandle<C> {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.node, &other.node)
    }
}

impl<C> Eq for CallbackHandle<C> {}

impl<C> std::fmt::Debug for CallbackHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

struct ListState<C> {
    head: Option<Arc<Node<C>>>,
    tail: Option<Arc<Node<C>>>,
}

impl<C> Drop for ListState<C> {
    fn drop(&mut self) {
        // Sever the next links iteratively so a long chain cannot recurse
        // through nested Arc drops.
        let mut node = self.head.take();
        self.tail = None;
        while let Some(current) = node {
            // Safety: the state is being dropped; access is exclusive.
            node = unsafe { current.take_next() };
        }
    }
}

/// Callback list generic over storage, threading policy, and continuation
/// predicate. Most code wants the [`CallbackList`] or [`LocalCallbackList`]
/// alias.
pub struct CallbackListBase<C, T = MultiThreaded, P = AlwaysContinue>
where
    C: Callback,
    T: Threading,
    P: ContinuationPredicate<C::Args>,
{
    state: T::Mutex<ListState<C>>,
    counter: T::Counter,
    len: AtomicUsize,
    _predicate: PhantomData<P>,
}

/// Multi-threaded callback list with type-erased callbacks.
pub type CallbackList<A> = CallbackListBase<FnCallback<A>, MultiThreaded, AlwaysContinue>;

/// Single-threaded callback list with type-erased callbacks. `!Sync`.
pub type LocalCallbackList<A> = CallbackListBase<LocalFnCallback<A>, SingleThreaded, AlwaysContinue>;

impl<C, T, P> CallbackListBase<C, T, P>
where
    C: Callback,
    T: Threading,
    P: ContinuationPredicate<C::Args>,
{
    pub fn new() -> Self {
        CallbackListBase {
            state: T::Mutex::new(ListState {
                head: None,
                tail: None,
            }),
            counter: T::Counter::default(),
            len: AtomicUsize::new(0),
            _predicate: PhantomData,
        }
    }

    /// Register `callback` at the tail. O(1).
    ///
    /// Visible only to traversals that snapshot the admission counter after
    /// this call assigns the new stamp.
    pub fn append(&self, callback: C) -> CallbackHandle<C> {
        let node = Arc::new(Node::new(callback, self.next_stamp()));
        let handle = CallbackHandle::from_node(&node);

        let mut state = self.state.lock();
        self.link_tail(&mut state, node);
        self.len.fetch_add(1, Ordering::Relaxed);

        handle
    }

    /// Register `callback` at the head. O(1).
    pub fn prepend(&self, callback: C) -> CallbackHandle<C> {
        let node = Arc::new(Node::new(callback, self.next_stamp()));
        let handle = CallbackHandle::from_node(&node);

        let mut state = self.state.lock();
        // Safety: the list mutex is held.
        unsafe {
            match state.head.take() {
                Some(old_head) => {
                    old_head.set_prev(Arc::downgrade(&node));
                    node.set_next(Some(old_head));
                    state.head = Some(node);
                }
                None => {
                    state.head = Some(node.clone());
                    state.tail = Some(node);
                }
            }
        }
        self.len.fetch_add(1, Ordering::Relaxed);

        handle
    }

    /// Register `callback` immediately before the callback `before` refers
    /// to; if `before` is no longer registered, append instead.
    ///
    /// The liveness check happens under the list mutex, so `before` expiring
    /// concurrently degrades to append rather than linking against an
    /// unlinked node.
    pub fn insert(&self, callback: C, before: &CallbackHandle<C>) -> CallbackHandle<C> {
        let node = Arc::new(Node::new(callback, self.next_stamp()));
        let handle = CallbackHandle::from_node(&node);

        let mut state = self.state.lock();
        let target = before
            .node
            .upgrade()
            .filter(|target| target.stamp() != REMOVED_STAMP);
        match target {
            // Safety: the list mutex is held.
            Some(target) => unsafe {
                node.set_prev(target.prev());
                node.set_next(Some(target.clone()));
                match target.prev().upgrade() {
                    Some(prev) => prev.set_next(Some(node.clone())),
                    None => state.head = Some(node.clone()),
                }
                target.set_prev(Arc::downgrade(&node));
            },
            None => self.link_tail(&mut state, node),
        }
        self.len.fetch_add(1, Ordering::Relaxed);

        handle
    }

    /// Unlink the callback `handle` refers to. Returns true iff a live
    /// registration was found; a second call with the same handle returns
    /// false.
    ///
    /// The removed node keeps its own links so traversals parked on it can
    /// still advance into the live suffix.
    pub fn remove(&self, handle: &CallbackHandle<C>) -> bool {
        let mut state = self.state.lock();

        let Some(node) = handle.node.upgrade() else {
            return false;
        };
        // A removed node can outlive its unlinking (a removed predecessor's
        // next still holds it strongly); the stamp is the source of truth.
        if node.stamp() == REMOVED_STAMP {
            return false;
        }

        // Safety: the list mutex is held.
        unsafe {
            let prev = node.prev();
            let next = node.next();
            match next.as_ref() {
                Some(next_node) => next_node.set_prev(prev.clone()),
                None => state.tail = prev.upgrade(),
            }
            match prev.upgrade() {
                Some(prev_node) => prev_node.set_next(next),
                None => state.head = next,
            }
        }

        node.set_stamp(REMOVED_STAMP);
        self.len.fetch_sub(1, Ordering::Relaxed);
        true
    }

    /// Visit every admitted callback in registration order.
    pub fn for_each(&self, mut visitor: impl FnMut(&C)) {
        self.do_for_each_if(|node| {
            visitor(&node.callback);
            true
        });
    }

    /// Like [`for_each`](CallbackListBase::for_each), also handing the
    /// visitor each callback's handle.
    pub fn for_each_with_handle(&self, mut visitor: impl FnMut(CallbackHandle<C>, &C)) {
        self.do_for_each_if(|node| {
            visitor(CallbackHandle::from_node(node), &node.callback);
            true
        });
    }

    /// Visit every admitted callback until the visitor returns false.
    /// Returns false iff the traversal was stopped by the visitor.
    pub fn for_each_if(&self, mut visitor: impl FnMut(&C) -> bool) -> bool {
        self.do_for_each_if(|node| visitor(&node.callback))
    }

    /// Like [`for_each_if`](CallbackListBase::for_each_if), also handing the
    /// visitor each callback's handle.
    pub fn for_each_if_with_handle(
        &self,
        mut visitor: impl FnMut(CallbackHandle<C>, &C) -> bool,
    ) -> bool {
        self.do_for_each_if(|node| visitor(CallbackHandle::from_node(node), &node.callback))
    }

    /// Invoke every admitted callback in registration order, consulting the
    /// continuation predicate after each one.
    pub fn invoke(&self, args: &C::Args) {
        self.for_each_if(|callback| {
            callback.invoke(args);
            P::can_continue(args)
        });
    }

    /// Advisory emptiness test; the answer may be stale under concurrent
    /// mutation but is never torn.
    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::Relaxed) == 0
    }

    /// Advisory count of live registrations.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    fn link_tail(&self, state: &mut ListState<C>, node: Arc<Node<C>>) {
        // Safety: the caller holds the list mutex (`state` borrows the
        // guarded data).
        unsafe {
            match state.tail.take() {
                Some(old_tail) => {
                    node.set_prev(Arc::downgrade(&old_tail));
                    old_tail.set_next(Some(node.clone()));
                    state.tail = Some(node);
                }
                None => {
                    state.head = Some(node.clone());
                    state.tail = Some(node);
                }
            }
        }
    }

    // The central traversal. Snapshot the head (a strong copy, so the node
    // cannot be freed mid-call), snapshot the admission counter, then admit
    // node by node, re-locking only to advance. The mutex is never held
    // while `visit` runs.
    //
    fn do_for_each_if(&self, mut visit: impl FnMut(&Arc<Node<C>>) -> bool) -> bool {
        let mut node = self.state.lock().head.clone();
        let snapshot = self.counter.load();

        while let Some(current) = node {
            let stamp = current.stamp();
            if stamp != REMOVED_STAMP && stamp <= snapshot && !visit(&current) {
                return false;
            }

            let state = self.state.lock();
            // Safety: the list mutex is held.
            node = unsafe { current.next() };
            drop(state);
        }

        true
    }

    // Assign the next admission stamp. On wrap-around the reserved value 0
    // would come out; restamp every chained node to 1 under the mutex and
    // clamp the counter to 1 explicitly, so two threads wrapping at once
    // both land on a consistent value.
    //
    fn next_stamp(&self) -> u64 {
        let stamp = self.counter.increment();
        if stamp != REMOVED_STAMP {
            return stamp;
        }

        let state = self.state.lock();
        let mut node = state.head.clone();
        while let Some(current) = node {
            current.set_stamp(1);
            // Safety: the list mutex is held.
            node = unsafe { current.next() };
        }
        self.counter.store(1);
        drop(state);

        1
    }
}

impl<C, T, P> Default for CallbackListBase<C, T, P>
where
    C: Callback,
    T: Threading,
    P: ContinuationPredicate<C::Args>,
{
    fn default() -> Self {
        Self::new()
    }
}
