pub mod envelope;
pub mod push;
pub mod types;

pub use envelope::{AdminKind, ChangeEvent, RawChange};
pub use push::{PushEvent, Snapshot};
pub use types::{CollectionName, Document, DocumentId, FeedPosition, OpType, ID_FIELD};
