//! Live query engine: keeps many clients' query results and watched
//! documents current from a document store's change feed.

pub mod catalog;
pub mod daemon;
pub mod dispatch;
pub mod feed;
pub mod filter;
pub mod metrics;
pub mod registry;
pub mod rules;
pub mod service;
pub mod session;
pub mod store;
pub mod transport;

pub use service::{RealtimeBuilder, RealtimeService};
