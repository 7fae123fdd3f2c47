pub mod types;

pub use types::{BoxError, ErrorKind, RivuletError};

/// Shorthand Result type used throughout Rivulet.
pub type Result<T> = std::result::Result<T, RivuletError>;
