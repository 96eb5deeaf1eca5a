//! Concurrent callback-list primitives for the riptide event library.
//!
//! # Organization
//!
//! - [`callback_list`] - The mutation-safe, invocation-safe callback list
//! - [`callback`] - Callback storage and continuation policies
//! - [`threading`] - Compile-time threading policies
//! - [`common_tests`] - Generic test functions reused by the policy-parametrized
//!   integration tests
//!
//! # Usage
//!
//! Lists are generic over a threading policy `T: Threading`:
//!
//! ```ignore
//! use riptide_core::{CallbackList, FnCallback};
//!
//! let list: CallbackList<i32> = CallbackList::new();
//! list.append(FnCallback::new(|value| println!("got {value}")));
//! list.invoke(&42);
//! ```

pub mod callback;
pub mod callback_list;
pub mod common_tests;
pub mod threading;

// Re-exports for convenience
pub use callback::{AlwaysContinue, Callback, ContinuationPredicate, FnCallback, LocalFnCallback};
pub use callback_list::{CallbackHandle, CallbackList, CallbackListBase, LocalCallbackList};
pub use threading::{MultiThreaded, SingleThreaded, Threading};
