use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use task_queue_core::{TaskRequest, REQUEST_FIELDS};
use task_queue_store::StoreClient;
use tracing::{error, info, warn};

use crate::executor::Executor;

const REQUEST_SET: &str = "request_uuid_set";
const FAIL_SET: &str = "fail_result_uuid_set";

fn request_key(uuid: &str) -> String {
    format!("t_{uuid}")
}

fn result_key(uuid: &str) -> String {
    format!("r_{uuid}")
}

fn success_counter_key(date: &str) -> String {
    format!("success_task_{date}")
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// The single-threaded claim-execute-persist loop. The worker never
/// parallelizes attempts and never retries locally — one attempt per
/// claim, full stop.
pub struct Worker {
    store: Arc<dyn StoreClient>,
    executor: Executor,
    result_keep_time: i64,
    period: Duration,
}

impl Worker {
    pub fn new(
        store: Arc<dyn StoreClient>,
        bin_root: PathBuf,
        default_run_time: u64,
        result_keep_time: u64,
        period: u64,
    ) -> Self {
        Worker {
            store,
            executor: Executor::new(bin_root, default_run_time),
            result_keep_time: result_keep_time as i64,
            period: Duration::from_secs(period),
        }
    }

    pub async fn run(&self, shutdown: Arc<tokio::sync::Notify>) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("worker loop stopped");
                    return;
                }
                _ = self.tick() => {}
            }
        }
    }

    async fn tick(&self) {
        let uuid = match self.store.spop(REQUEST_SET).await {
            Ok(Some(uuid)) => uuid,
            Ok(None) => {
                tokio::time::sleep(Duration::from_secs(1)).await;
                return;
            }
            Err(e) => {
                error!(error = %e, "spop on request set failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
                return;
            }
        };

        self.claim_and_execute(&uuid).await;

        if !self.period.is_zero() {
            tokio::time::sleep(self.period).await;
        }
    }

    async fn claim_and_execute(&self, uuid: &str) {
        let key = request_key(uuid);
        let values = match self.store.hmget(&key, &REQUEST_FIELDS).await {
            Ok(values) => values,
            Err(e) => {
                error!(uuid, error = %e, "hmget on claimed request failed");
                return;
            }
        };

        let request = match TaskRequest::from_hash_values(&values) {
            Ok(Some(request)) => request,
            Ok(None) => {
                warn!(uuid, "key not exist");
                return;
            }
            Err(e) => {
                error!(uuid, error = %e, "malformed request fields");
                return;
            }
        };

        if let Err(e) = self.store.del(&key).await {
            warn!(uuid, error = %e, "best-effort delete of request hash failed");
        }

        let (is_success, result) = self.executor.execute(&request).await;

        self.increment_daily_success_counter().await;
        self.write_result(&request, is_success, result).await;
    }

    async fn write_result(&self, request: &TaskRequest, is_success: bool, result: String) {
        let key = result_key(&request.uuid);
        let task_result = if is_success {
            task_queue_core::TaskResult::success(request.clone(), result)
        } else {
            task_queue_core::TaskResult::failure(request.clone(), result)
        };

        if let Err(e) = self.store.hset_multiple(&key, &task_result.to_hash_fields()).await {
            error!(uuid = %request.uuid, error = %e, "failed to write result hash");
            return;
        }

        if !is_success {
            if let Err(e) = self.store.sadd(FAIL_SET, &request.uuid).await {
                error!(uuid = %request.uuid, error = %e, "failed to add uuid to fail set");
            }
        }

        if let Err(e) = self.store.expire(&key, self.result_keep_time).await {
            error!(uuid = %request.uuid, error = %e, "failed to set result TTL");
        }
    }

    /// Fires whenever `Execute()` completes without a dispatch error, even
    /// if the attempt itself failed. This mirrors the source's quirk of
    /// swallowing task failure into `is_success=0` with no transport
    /// error; it is preserved deliberately, not a bug. See `DESIGN.md`.
    async fn increment_daily_success_counter(&self) {
        let key = success_counter_key(&today());
        match self.store.incr(&key).await {
            Ok(count) => {
                if count == 1 {
                    if let Err(e) = self.store.expire(&key, 30 * 24 * 3600).await {
                        error!(key, error = %e, "failed to set success counter TTL");
                    }
                }
            }
            Err(e) => error!(key, error = %e, "failed to increment success counter"),
        }
    }
}
