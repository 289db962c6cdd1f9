mod client;
mod error;
mod mock;
mod redis_client;

pub use client::StoreClient;
pub use error::StoreError;
pub use mock::{MockCall, MockStoreClient};
pub use redis_client::RedisStoreClient;
