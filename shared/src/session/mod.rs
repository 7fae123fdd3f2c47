pub mod types;

pub use types::{SessionId, UserContext};
