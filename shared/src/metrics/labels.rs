// Prometheus metric label constants.
//
// Centralizing label names prevents typo-induced cardinality explosions
// and makes grep-able dashboards easier to build.

/// Label for the change operation type (insert, update, replace, delete).
pub const LABEL_OP: &str = "op";

/// Label for the collection name.
pub const LABEL_COLLECTION: &str = "collection";

/// Label for the push event kind (data, add, update, remove, exception).
pub const LABEL_PUSH: &str = "push";

/// Label for the administrative event kind (drop, rename, ...).
pub const LABEL_ADMIN: &str = "admin";

/// Label for the reason a feed connection was reopened.
pub const LABEL_REASON: &str = "reason";

/// Label for the error kind.
pub const LABEL_ERROR: &str = "error";
