use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::StoreClient;
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct MockCall {
    pub op: String,
    pub key: String,
}

/// An in-memory stand-in for [`StoreClient`], grounded on per-key canned
/// returns rather than a real backing map: a test arranges exactly the
/// responses it needs and nothing else resolves.
#[derive(Clone, Default)]
pub struct MockStoreClient {
    hmget_ret: HashMap<String, Result<Vec<Option<String>>, StoreError>>,
    hget_ret: HashMap<String, Result<Option<String>, StoreError>>,
    spop_ret: HashMap<String, Result<Option<String>, StoreError>>,
    scard_ret: HashMap<String, Result<u64, StoreError>>,
    incr_ret: HashMap<String, Result<i64, StoreError>>,
    get_ret: HashMap<String, Result<Option<String>, StoreError>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockStoreClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<MockCall>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock_calls().clone()
    }

    pub fn with_hmget(mut self, key: &str, ret: Result<Vec<Option<String>>, StoreError>) -> Self {
        self.hmget_ret.insert(key.to_string(), ret);
        self
    }

    pub fn with_hget(mut self, key: &str, ret: Result<Option<String>, StoreError>) -> Self {
        self.hget_ret.insert(key.to_string(), ret);
        self
    }

    pub fn with_spop(mut self, key: &str, ret: Result<Option<String>, StoreError>) -> Self {
        self.spop_ret.insert(key.to_string(), ret);
        self
    }

    pub fn with_scard(mut self, key: &str, ret: Result<u64, StoreError>) -> Self {
        self.scard_ret.insert(key.to_string(), ret);
        self
    }

    pub fn with_incr(mut self, key: &str, ret: Result<i64, StoreError>) -> Self {
        self.incr_ret.insert(key.to_string(), ret);
        self
    }

    pub fn with_get(mut self, key: &str, ret: Result<Option<String>, StoreError>) -> Self {
        self.get_ret.insert(key.to_string(), ret);
        self
    }
}

#[async_trait]
impl StoreClient for MockStoreClient {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn hset_multiple(&self, key: &str, _fields: &[(&str, String)]) -> Result<(), StoreError> {
        self.lock_calls().push(MockCall {
            op: "hset_multiple".to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    async fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
        self.lock_calls().push(MockCall {
            op: "hmget".to_string(),
            key: key.to_string(),
        });
        match self.hmget_ret.get(key) {
            Some(ret) => ret.clone(),
            None => Ok(vec![None; fields.len()]),
        }
    }

    async fn hget(&self, key: &str, _field: &str) -> Result<Option<String>, StoreError> {
        self.lock_calls().push(MockCall {
            op: "hget".to_string(),
            key: key.to_string(),
        });
        self.hget_ret.get(key).cloned().unwrap_or(Ok(None))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.lock_calls().push(MockCall {
            op: "del".to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    async fn expire(&self, key: &str, _seconds: i64) -> Result<(), StoreError> {
        self.lock_calls().push(MockCall {
            op: "expire".to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    async fn sadd(&self, key: &str, _member: &str) -> Result<(), StoreError> {
        self.lock_calls().push(MockCall {
            op: "sadd".to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    async fn spop(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.lock_calls().push(MockCall {
            op: "spop".to_string(),
            key: key.to_string(),
        });
        self.spop_ret.get(key).cloned().unwrap_or(Ok(None))
    }

    async fn scard(&self, key: &str) -> Result<u64, StoreError> {
        self.lock_calls().push(MockCall {
            op: "scard".to_string(),
            key: key.to_string(),
        });
        self.scard_ret.get(key).cloned().unwrap_or(Ok(0))
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.lock_calls().push(MockCall {
            op: "incr".to_string(),
            key: key.to_string(),
        });
        self.incr_ret.get(key).cloned().unwrap_or(Ok(1))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.lock_calls().push(MockCall {
            op: "get".to_string(),
            key: key.to_string(),
        });
        self.get_ret.get(key).cloned().unwrap_or(Ok(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_spop_returns_empty_not_error() {
        let mock = MockStoreClient::new();
        assert_eq!(mock.spop("request_uuid_set").await.unwrap(), None);
    }

    #[tokio::test]
    async fn configured_hmget_round_trips() {
        let mock = MockStoreClient::new().with_hmget(
            "task:abc",
            Ok(vec![Some("abc".to_string()), None]),
        );
        let values = mock.hmget("task:abc", &["uuid", "bin_name"]).await.unwrap();
        assert_eq!(values, vec![Some("abc".to_string()), None]);
    }

    #[tokio::test]
    async fn calls_are_recorded_in_order() {
        let mock = MockStoreClient::new();
        mock.sadd("request_uuid_set", "abc").await.unwrap();
        mock.del("task:abc").await.unwrap();
        let calls = mock.calls();
        assert_eq!(calls[0].op, "sadd");
        assert_eq!(calls[1].op, "del");
    }
}
