//! Persistence boundary.
//!
//! [`Store`] is the single source of truth for every entity and the only
//! component allowed to mutate persisted state. [`MemoryStore`] is the
//! in-process implementation used by the services and their tests.

pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod faults;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::{finish, ListOptions, Page, Store};
