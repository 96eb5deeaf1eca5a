//! Admission counter cells selected by the [`Threading`] policy.
//!
//! [`Threading`]: super::Threading

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

/// The cell holding a callback list's current admission counter.
///
/// Counters start at 0 and increment with wrap-around; the value 0 itself
/// is reserved by the list (it marks removed nodes), which handles the
/// wrap by restamping nodes and storing an explicit value here.
pub trait AdmissionCounter: Default {
    /// Increment with wrap-around and return the new value.
    fn increment(&self) -> u64;

    /// Read the current value. Acquire ordering in the atomic
    /// implementation, pairing with the release in [`store`].
    ///
    /// [`store`]: AdmissionCounter::store
    fn load(&self) -> u64;

    fn store(&self, value: u64);
}

/// Atomic counter for multi-threaded lists.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AdmissionCounter for AtomicCounter {
    fn increment(&self) -> u64 {
        self.value.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    fn load(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    fn store(&self, value: u64) {
        self.value.store(value, Ordering::Release);
    }
}

/// Plain cell for single-threaded lists.
#[derive(Debug, Default)]
pub struct PlainCounter {
    value: Cell<u64>,
}

impl AdmissionCounter for PlainCounter {
    fn increment(&self) -> u64 {
        let value = self.value.get().wrapping_add(1);
        self.value.set(value);
        value
    }

    fn load(&self) -> u64 {
        self.value.get()
    }

    fn store(&self, value: u64) {
        self.value.set(value);
    }
}
