//! End-to-end tests for the live query engine, driven through the
//! in-memory document store and the channel transport.

mod harness;

mod live_query;
mod session;
