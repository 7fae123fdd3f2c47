//! Session lifecycle: handshake validation, targeting and teardown.

pub mod guard;
pub mod handshake;
pub mod manager;

pub use guard::{ConnectionGuard, GuardSet};
pub use handshake::{HandshakeRequest, Target};
pub use manager::SessionManager;
