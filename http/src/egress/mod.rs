pub mod socket;

pub use socket::{ChannelTransport, Frame, SessionStream};
