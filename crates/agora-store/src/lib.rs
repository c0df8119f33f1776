//! Storage boundary for Agora.
//!
//! The broadcaster never talks to storage; only the request handlers in
//! the `agora` crate do. They go through the [`RoomStore`] trait so the
//! backing database can be swapped without touching handler code.
//! [`MemoryStore`] is the in-process implementation used by the demo
//! server and the tests.

mod error;
mod memory;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::RoomStore;
