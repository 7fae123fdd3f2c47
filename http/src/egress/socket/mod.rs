//! Channel-backed client sockets: one unbounded outbound queue per session.

pub mod stream;
pub mod transport;

pub use stream::{Frame, SessionStream};
pub use transport::ChannelTransport;
