//! Lock and monitor abstractions selected by the [`Threading`] policy.
//!
//! [`Threading`]: super::Threading

use std::cell::{RefCell, RefMut};
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// A mutual-exclusion cell around `T`.
///
/// The multi-threaded implementation is a real mutex; the single-threaded
/// one is a borrow-checked cell. Either way the guard grants exclusive
/// access for its lifetime.
pub trait SharedMutex<T> {
    type Guard<'a>: Deref<Target = T> + DerefMut
    where
        Self: 'a,
        T: 'a;

    fn new(value: T) -> Self;

    fn lock(&self) -> Self::Guard<'_>;

    /// Direct access when the caller already has exclusive ownership,
    /// e.g. during drop. Never blocks.
    fn get_mut(&mut self) -> &mut T;
}

/// A [`SharedMutex`] paired with a condition variable.
pub trait WaitableMutex<T>: SharedMutex<T> {
    /// Block while `condition` returns true, releasing the lock for the
    /// duration of the wait. Spurious wakeups re-check the condition.
    fn wait_while<'a>(
        &'a self,
        guard: Self::Guard<'a>,
        condition: impl FnMut(&mut T) -> bool,
    ) -> Self::Guard<'a>;

    /// Bounded variant of [`wait_while`](WaitableMutex::wait_while).
    /// The boolean is true when the wait gave up with the condition still
    /// holding.
    fn wait_timeout_while<'a>(
        &'a self,
        guard: Self::Guard<'a>,
        timeout: Duration,
        condition: impl FnMut(&mut T) -> bool,
    ) -> (Self::Guard<'a>, bool);

    fn notify_one(&self);

    fn notify_all(&self);
}

// =============================================================================
// Multi-threaded implementations
// =============================================================================

/// `std::sync::Mutex` behind the policy interface.
///
/// Lock poisoning is treated as a bug: containers in this crate never hold
/// a lock across user callbacks, so a poisoned lock means the container
/// itself panicked mid-mutation.
pub struct SyncMutex<T> {
    inner: Mutex<T>,
}

impl<T> SharedMutex<T> for SyncMutex<T> {
    type Guard<'a>
        = MutexGuard<'a, T>
    where
        Self: 'a,
        T: 'a;

    fn new(value: T) -> Self {
        SyncMutex {
            inner: Mutex::new(value),
        }
    }

    fn lock(&self) -> Self::Guard<'_> {
        self.inner.lock().unwrap()
    }

    fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut().unwrap()
    }
}

/// `std::sync::Mutex` + `Condvar` monitor.
pub struct SyncMonitor<T> {
    inner: Mutex<T>,
    condvar: Condvar,
}

impl<T> SharedMutex<T> for SyncMonitor<T> {
    type Guard<'a>
        = MutexGuard<'a, T>
    where
        Self: 'a,
        T: 'a;

    fn new(value: T) -> Self {
        SyncMonitor {
            inner: Mutex::new(value),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> Self::Guard<'_> {
        self.inner.lock().unwrap()
    }

    fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut().unwrap()
    }
}

impl<T> WaitableMutex<T> for SyncMonitor<T> {
    fn wait_while<'a>(
        &'a self,
        guard: Self::Guard<'a>,
        condition: impl FnMut(&mut T) -> bool,
    ) -> Self::Guard<'a> {
        self.condvar.wait_while(guard, condition).unwrap()
    }

    fn wait_timeout_while<'a>(
        &'a self,
        guard: Self::Guard<'a>,
        timeout: Duration,
        condition: impl FnMut(&mut T) -> bool,
    ) -> (Self::Guard<'a>, bool) {
        let (guard, result) = self
            .condvar
            .wait_timeout_while(guard, timeout, condition)
            .unwrap();
        (guard, result.timed_out())
    }

    fn notify_one(&self) {
        self.condvar.notify_one();
    }

    fn notify_all(&self) {
        self.condvar.notify_all();
    }
}

// =============================================================================
// Single-threaded implementations
// =============================================================================

/// `RefCell` behind the policy interface. `!Sync`, so containers built on
/// it cannot cross threads.
pub struct UnsyncMutex<T> {
    inner: RefCell<T>,
}

impl<T> SharedMutex<T> for UnsyncMutex<T> {
    type Guard<'a>
        = RefMut<'a, T>
    where
        Self: 'a,
        T: 'a;

    fn new(value: T) -> Self {
        UnsyncMutex {
            inner: RefCell::new(value),
        }
    }

    fn lock(&self) -> Self::Guard<'_> {
        self.inner.borrow_mut()
    }

    fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

/// Single-threaded monitor. Waiting returns immediately: with one thread,
/// blocking on a condition only that thread could change would never wake.
pub struct UnsyncMonitor<T> {
    inner: RefCell<T>,
}

impl<T> SharedMutex<T> for UnsyncMonitor<T> {
    type Guard<'a>
        = RefMut<'a, T>
    where
        Self: 'a,
        T: 'a;

    fn new(value: T) -> Self {
        UnsyncMonitor {
            inner: RefCell::new(value),
        }
    }

    fn lock(&self) -> Self::Guard<'_> {
        self.inner.borrow_mut()
    }

    fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

impl<T> WaitableMutex<T> for UnsyncMonitor<T> {
    fn wait_while<'a>(
        &'a self,
        guard: Self::Guard<'a>,
        _condition: impl FnMut(&mut T) -> bool,
    ) -> Self::Guard<'a> {
        guard
    }

    fn wait_timeout_while<'a>(
        &'a self,
        mut guard: Self::Guard<'a>,
        _timeout: Duration,
        mut condition: impl FnMut(&mut T) -> bool,
    ) -> (Self::Guard<'a>, bool) {
        let still_waiting = condition(&mut guard);
        (guard, still_waiting)
    }

    fn notify_one(&self) {}

    fn notify_all(&self) {}
}
