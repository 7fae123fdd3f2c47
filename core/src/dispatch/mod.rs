//! Dispatcher: incremental maintenance of every subscription's result set.

pub mod dispatcher;
pub mod listener;
pub mod transition;

pub use dispatcher::Dispatcher;
pub use listener::{ChangeListener, FnListener};
pub use transition::transition;
