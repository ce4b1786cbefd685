pub mod client;
pub mod error;
pub mod graphql;
pub mod realtime;

pub use client::ApiClient;
pub use error::ApiError;
pub use graphql::Operation;
pub use realtime::{RealtimeClient, RealtimeEvent, RealtimeSubscription};
