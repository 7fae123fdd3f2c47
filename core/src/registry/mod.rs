//! Subscription registry: per-session live views indexed by collection.

pub mod sessions;
pub mod subscription;

pub use sessions::{SeedSink, SubscriptionRegistry};
pub use subscription::{lock, SharedSubscription, Subscription, SubscriptionState, Watch};
