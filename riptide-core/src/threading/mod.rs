//! Threading policies for riptide containers.
//!
//! # Organization
//!
//! - [`mutex`] - Lock and monitor (lock + condition variable) abstractions
//! - [`counter`] - Admission counter cells
//!
//! # Design
//!
//! Containers are generic over a policy type `T: Threading` that selects the
//! synchronization primitives at compile time:
//!
//! ```text
//! CallbackListBase<C, T: Threading>
//!     │
//!     ├── CallbackListBase<C, MultiThreaded>    (std mutex/condvar/atomics)
//!     └── CallbackListBase<C, SingleThreaded>   (RefCell/Cell, no sync)
//! ```
//!
//! The single-threaded primitives are `!Sync`, so a container built with
//! `SingleThreaded` cannot be shared across threads by construction.

pub mod counter;
pub mod mutex;

pub use counter::{AdmissionCounter, AtomicCounter, PlainCounter};
pub use mutex::{SharedMutex, SyncMonitor, SyncMutex, UnsyncMonitor, UnsyncMutex, WaitableMutex};

/// Compile-time selection of the synchronization primitives a container uses.
///
/// Implementations are zero-sized markers; all state lives in the associated
/// types. The trait mirrors what a container needs:
///
/// - `Mutex<T>` guards plain shared state (list links, listener maps).
/// - `Monitor<T>` pairs a mutex with a condition variable for producer/
///   consumer waiting.
/// - `Counter` is the cell holding a list's current admission counter.
///
pub trait Threading: Send + Sync + 'static {
    type Mutex<T>: SharedMutex<T>;
    type Monitor<T>: WaitableMutex<T>;
    type Counter: AdmissionCounter;
}

/// Multi-threaded policy: `std::sync` mutexes and condition variables,
/// atomic admission counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct MultiThreaded;

impl Threading for MultiThreaded {
    type Mutex<T> = SyncMutex<T>;
    type Monitor<T> = SyncMonitor<T>;
    type Counter = AtomicCounter;
}

/// Single-threaded policy: borrow-checked cells with no synchronization
/// overhead. Same contracts as [`MultiThreaded`], but waiting is a no-op
/// (there is no second thread to be woken by) and the resulting containers
/// are `!Sync`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleThreaded;

impl Threading for SingleThreaded {
    type Mutex<T> = UnsyncMutex<T>;
    type Monitor<T> = UnsyncMonitor<T>;
    type Counter = PlainCounter;
}
