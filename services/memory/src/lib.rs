//! In-process document store that doubles as a change feed source.
//!
//! Every write produces the change event a real change stream would, in
//! the same order the writes were applied. Faults (invalidation, stream
//! errors, failed opens and closes) can be injected for testing.

pub mod feed;
pub mod store;

pub use feed::MemoryChangeStream;
pub use store::MemoryStore;
