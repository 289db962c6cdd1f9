use async_trait::async_trait;

use crate::error::StoreError;

/// The shared key-value store contract the broker and worker both depend on.
///
/// Every operation maps onto a single Redis primitive; callers are
/// responsible for the multi-step sequences (claim-then-read, the
/// fail-requeue loop) built on top of it.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    /// `HMSET key field1 value1 field2 value2 ...`
    async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError>;

    /// `HMGET key field1 field2 ...`, preserving the requested order. A
    /// missing hash yields all-`None`, matching how a Redis `HMGET` against
    /// an absent key behaves rather than erroring.
    async fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>, StoreError>;

    /// `HGET key field`
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// `DEL key`
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// `EXPIRE key seconds`
    async fn expire(&self, key: &str, seconds: i64) -> Result<(), StoreError>;

    /// `SADD key member`
    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// `SPOP key`. `Ok(None)` means the set was empty.
    async fn spop(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// `SCARD key`
    async fn scard(&self, key: &str) -> Result<u64, StoreError>;

    /// `INCR key`, returning the value after the increment.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// `GET key`
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}
