use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::time::timeout;
use tracing::info;

use crate::client::StoreClient;
use crate::error::StoreError;

const DEFAULT_STORE_TIMEOUT_MS: u64 = 1000;

fn store_timeout() -> Duration {
    let ms = std::env::var("STORE_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_STORE_TIMEOUT_MS);
    Duration::from_millis(ms)
}

/// Splits `host:port/db_index` into a connection URL, matching the address
/// format the broker and worker accept on the command line. A missing
/// `/db_index` selects database 0.
fn parse_store_addr(addr: &str) -> String {
    match addr.split_once('/') {
        Some((host_port, db_index)) => format!("redis://{host_port}/{db_index}"),
        None => format!("redis://{addr}/0"),
    }
}

pub struct RedisStoreClient {
    connection: ConnectionManager,
}

impl RedisStoreClient {
    pub async fn new(addr: &str) -> Result<Self, StoreError> {
        let url = parse_store_addr(addr);
        let client = redis::Client::open(url)?;
        let connection = client.get_connection_manager().await?;
        let store = RedisStoreClient { connection };
        store.ping().await?;
        info!(addr, "connected to store");
        Ok(store)
    }
}

#[async_trait]
impl StoreClient for RedisStoreClient {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let fut = redis::cmd("PING").query_async::<_, String>(&mut conn);
        timeout(store_timeout(), fut).await??;
        Ok(())
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let fut = conn.hset_multiple::<_, _, _, ()>(key, fields);
        timeout(store_timeout(), fut).await??;
        Ok(())
    }

    async fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
        let mut conn = self.connection.clone();
        let fut = conn.hmget(key, fields);
        Ok(timeout(store_timeout(), fut).await??)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        let fut = conn.hget(key, field);
        Ok(timeout(store_timeout(), fut).await??)
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let fut = conn.del::<_, ()>(key);
        timeout(store_timeout(), fut).await??;
        Ok(())
    }

    async fn expire(&self, key: &str, seconds: i64) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let fut = conn.expire::<_, ()>(key, seconds);
        timeout(store_timeout(), fut).await??;
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let fut = conn.sadd::<_, _, ()>(key, member);
        timeout(store_timeout(), fut).await??;
        Ok(())
    }

    async fn spop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        let fut = conn.spop(key);
        Ok(timeout(store_timeout(), fut).await??)
    }

    async fn scard(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection.clone();
        let fut = conn.scard(key);
        Ok(timeout(store_timeout(), fut).await??)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.connection.clone();
        let fut = conn.incr(key, 1);
        Ok(timeout(store_timeout(), fut).await??)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        let fut = conn.get(key);
        Ok(timeout(store_timeout(), fut).await??)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_without_db_index_defaults_to_zero() {
        assert_eq!(parse_store_addr("127.0.0.1:6379"), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn addr_with_db_index_is_preserved() {
        assert_eq!(parse_store_addr("127.0.0.1:6379/3"), "redis://127.0.0.1:6379/3");
    }
}
