//! Types shared by every Rivulet crate: the error enum, configuration,
//! change/push event envelopes, session identity and metric labels.

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod session;
