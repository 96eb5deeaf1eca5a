//! Queue policies: the compile-time configuration bundle for dispatchers
//! and event queues.
//!
//! A [`QueuePolicy`] fixes the routing key type, the callback storage (and
//! with it the argument type), the threading policy, how stored arguments
//! reach callbacks at dispatch, and the continuation hook consulted between
//! callbacks. [`GetEventKey`] additionally derives the key from the
//! arguments, enabling [`EventQueueBase::enqueue_from`].
//!
//! [`EventQueueBase::enqueue_from`]: crate::event_queue::EventQueueBase::enqueue_from

use std::hash::Hash;
use std::marker::PhantomData;

use riptide_core::callback::{Callback, ContinuationPredicate, FnCallback, LocalFnCallback};
use riptide_core::callback_list::CallbackListBase;
use riptide_core::threading::{MultiThreaded, SingleThreaded, Threading};

/// The argument type of a policy's callback storage.
pub type ArgsOf<Q> = <<Q as QueuePolicy>::Callback as Callback>::Args;

/// The callback list a policy's dispatcher maintains per key.
pub type ListOf<Q> = CallbackListBase<
    <Q as QueuePolicy>::Callback,
    <Q as QueuePolicy>::Threading,
    PolicyPredicate<Q>,
>;

/// Compile-time configuration of a dispatcher/queue.
pub trait QueuePolicy: Sized + 'static {
    type Key: Clone + Eq + Hash;
    type Callback: Callback;
    type Threading: Threading;
    type Passing: ArgumentPassing<ArgsOf<Self>>;

    /// Consulted after each callback of a dispatch sweep; returning false
    /// stops the sweep early. Defaults to never stopping.
    fn can_continue_invoking(_args: &ArgsOf<Self>) -> bool {
        true
    }
}

/// Key derivation from enqueue arguments.
pub trait GetEventKey: QueuePolicy {
    fn event_key(args: &ArgsOf<Self>) -> Self::Key;
}

/// Adapter feeding a policy's continuation hook into the callback list's
/// predicate slot.
pub struct PolicyPredicate<Q> {
    _policy: PhantomData<Q>,
}

impl<Q: QueuePolicy> ContinuationPredicate<ArgsOf<Q>> for PolicyPredicate<Q> {
    fn can_continue(args: &ArgsOf<Q>) -> bool {
        Q::can_continue_invoking(args)
    }
}

/// How the stored arguments reach the callbacks of a dispatch.
pub trait ArgumentPassing<A>: 'static {
    fn invoke_list<C, T, P>(list: &CallbackListBase<C, T, P>, args: &A)
    where
        C: Callback<Args = A>,
        T: Threading,
        P: ContinuationPredicate<A>;
}

/// Forward the stored arguments in place. Works with move-only argument
/// types; every callback of the sweep observes the same stored value.
#[derive(Clone, Copy, Debug, Default)]
pub struct ByRef;

impl<A> ArgumentPassing<A> for ByRef {
    fn invoke_list<C, T, P>(list: &CallbackListBase<C, T, P>, args: &A)
    where
        C: Callback<Args = A>,
        T: Threading,
        P: ContinuationPredicate<A>,
    {
        list.invoke(args);
    }
}

/// Clone the stored arguments once per dispatch and forward the detached
/// copy, so callbacks cannot observe later mutation of the stored event.
#[derive(Clone, Copy, Debug, Default)]
pub struct ByValue;

impl<A: Clone> ArgumentPassing<A> for ByValue {
    fn invoke_list<C, T, P>(list: &CallbackListBase<C, T, P>, args: &A)
    where
        C: Callback<Args = A>,
        T: Threading,
        P: ContinuationPredicate<A>,
    {
        let detached = args.clone();
        list.invoke(&detached);
    }
}

/// Multi-threaded defaults: type-erased callbacks, by-reference argument
/// passing, and (when the arguments convert into the key) key derivation
/// from the argument value itself.
pub struct DefaultQueuePolicy<K, A> {
    _types: PhantomData<(K, A)>,
}

impl<K, A> QueuePolicy for DefaultQueuePolicy<K, A>
where
    K: Clone + Eq + Hash + 'static,
    A: 'static,
{
    type Key = K;
    type Callback = FnCallback<A>;
    type Threading = MultiThreaded;
    type Passing = ByRef;
}

impl<K, A> GetEventKey for DefaultQueuePolicy<K, A>
where
    K: Clone + Eq + Hash + 'static,
    A: Clone + Into<K> + 'static,
{
    fn event_key(args: &A) -> K {
        args.clone().into()
    }
}

/// Single-threaded defaults; callbacks need not be `Send + Sync` and the
/// resulting queue is `!Sync`.
pub struct LocalQueuePolicy<K, A> {
    _types: PhantomData<(K, A)>,
}

impl<K, A> QueuePolicy for LocalQueuePolicy<K, A>
where
    K: Clone + Eq + Hash + 'static,
    A: 'static,
{
    type Key = K;
    type Callback = LocalFnCallback<A>;
    type Threading = SingleThreaded;
    type Passing = ByRef;
}

impl<K, A> GetEventKey for LocalQueuePolicy<K, A>
where
    K: Clone + Eq + Hash + 'static,
    A: Clone + Into<K> + 'static,
{
    fn event_key(args: &A) -> K {
        args.clone().into()
    }
}
