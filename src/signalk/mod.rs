pub mod connection;
pub mod delta;
pub mod subscription;

pub use connection::Connection;
pub use delta::{Delta, PathValue, Update};
pub use subscription::{Subscription, SubscriptionFilter};
