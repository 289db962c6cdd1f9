use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use task_queue_core::{parse_time_interval, Reply, TaskError, TaskRequest};
use task_queue_store::StoreClient;
use tracing::{error, info, warn};

use crate::metrics::BrokerMetrics;
use crate::timer::TimingWheel;

const REQUEST_SET: &str = "request_uuid_set";
const FAIL_SET: &str = "fail_result_uuid_set";
const COUNTER_TTL_SECS: i64 = 30 * 24 * 3600;

fn request_key(uuid: &str) -> String {
    format!("t_{uuid}")
}

fn result_key(uuid: &str) -> String {
    format!("r_{uuid}")
}

pub fn fail_counter_key(date: &str) -> String {
    format!("fail_task_{date}")
}

pub fn success_counter_key(date: &str) -> String {
    format!("success_task_{date}")
}

pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// The submission, publish, query and failure-requeue logic that runs atop
/// the shared store. Cheap to clone: every field is an `Arc`.
#[derive(Clone)]
pub struct Broker {
    store: Arc<dyn StoreClient>,
    timer: Arc<TimingWheel>,
    metrics: Arc<BrokerMetrics>,
}

impl Broker {
    pub fn new(store: Arc<dyn StoreClient>, timer: Arc<TimingWheel>, metrics: Arc<BrokerMetrics>) -> Self {
        Broker { store, timer, metrics }
    }

    /// Accept a submission. Immediate tasks are published synchronously;
    /// future-dated ones are staged on the Timing Wheel and the call
    /// returns before they fire. Acceptance is not durability — see
    /// `DESIGN.md`.
    pub async fn submit(&self, mut request: TaskRequest) -> Result<(), TaskError> {
        self.metrics.inc_submission(&request.task_type.to_string());

        let now = chrono::Utc::now().timestamp();
        if request.start_time == 0 {
            request.start_time = now;
        }

        if request.start_time <= now {
            return self.publish(request).await;
        }

        let delay = Duration::from_secs((request.start_time - now) as u64);
        let broker = self.clone();
        self.timer.schedule(delay, async move {
            if let Err(e) = broker.publish(request).await {
                error!(error = %e, "delayed publish failed");
            }
        });
        Ok(())
    }

    /// Write the request hash then add the UUID to the pending set. The
    /// two writes are not atomic; see `DESIGN.md` for the accepted window.
    pub async fn publish(&self, request: TaskRequest) -> Result<(), TaskError> {
        let started = std::time::Instant::now();
        let key = request_key(&request.uuid);
        self.store
            .hset_multiple(&key, &request.to_hash_fields())
            .await
            .map_err(|e| TaskError::Store(e.to_string()))?;
        self.store
            .sadd(REQUEST_SET, &request.uuid)
            .await
            .map_err(|e| TaskError::Store(e.to_string()))?;
        self.metrics.observe_publish_duration(started.elapsed().as_secs_f64());
        info!(uuid = %request.uuid, "published task");
        Ok(())
    }

    /// Read the result hash for `uuid`. Returns `ResultNotExist` if absent.
    pub async fn query_result(&self, uuid: &str) -> Result<Reply, TaskError> {
        let key = result_key(uuid);
        let values = self
            .store
            .hmget(&key, &["is_success", "result"])
            .await
            .map_err(|e| TaskError::Store(e.to_string()))?;

        let is_success = match &values[0] {
            Some(v) => v == "1",
            None => {
                self.metrics.inc_query("not_exist");
                return Err(TaskError::ResultNotExist);
            }
        };
        let result = values[1].clone().unwrap_or_default();

        self.metrics.inc_query("found");
        Ok(Reply::from_result(is_success, result))
    }

    pub async fn undo_task_count(&self) -> Result<u64, TaskError> {
        self.store
            .scard(REQUEST_SET)
            .await
            .map_err(|e| TaskError::Store(e.to_string()))
    }

    pub async fn fail_task_count(&self, date: &str) -> Result<i64, TaskError> {
        self.counter(&fail_counter_key(date)).await
    }

    pub async fn success_task_count(&self, date: &str) -> Result<i64, TaskError> {
        self.counter(&success_counter_key(date)).await
    }

    async fn counter(&self, key: &str) -> Result<i64, TaskError> {
        match self.store.get(key).await {
            Ok(Some(v)) => v.parse().map_err(|_| TaskError::InvalidArgument),
            Ok(None) => Ok(0),
            Err(e) => Err(TaskError::Store(e.to_string())),
        }
    }

    /// Long-running loop: pop a failed UUID, consult its retry schedule and
    /// either reschedule it or count it as a terminal failure.
    pub async fn run_fail_requeue_loop(&self, shutdown: Arc<tokio::sync::Notify>) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("fail-requeue loop stopped");
                    return;
                }
                _ = self.fail_requeue_tick() => {}
            }
        }
    }

    async fn fail_requeue_tick(&self) {
        let uuid = match self.store.spop(FAIL_SET).await {
            Ok(Some(uuid)) => uuid,
            Ok(None) => {
                tokio::time::sleep(Duration::from_secs(1)).await;
                return;
            }
            Err(e) => {
                error!(error = %e, "spop on fail set failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
                return;
            }
        };

        if let Err(e) = self.handle_failed_result(&uuid).await {
            warn!(uuid = %uuid, error = %e, "reschedule failed, counting as terminal");
            self.increment_daily_fail_counter().await;
        }
    }

    async fn handle_failed_result(&self, uuid: &str) -> Result<(), TaskError> {
        let key = result_key(uuid);

        let interval = self
            .store
            .hget(&key, "time_interval")
            .await
            .map_err(|e| TaskError::Store(e.to_string()))?;

        if let Some(interval) = &interval {
            if interval.is_empty() {
                self.increment_daily_fail_counter().await;
                return Ok(());
            }
        }

        let values = self
            .store
            .hmget(&key, &task_queue_core::REQUEST_FIELDS)
            .await
            .map_err(|e| TaskError::Store(e.to_string()))?;

        let request = match TaskRequest::from_hash_values(&values)? {
            Some(request) => request,
            None => {
                warn!(uuid, "result expired before requeue; dropping silently");
                return Ok(());
            }
        };

        if let Err(e) = self.store.del(&key).await {
            warn!(uuid, error = %e, "best-effort delete of result hash failed");
        }

        self.reschedule(request)
    }

    /// Pre-increments `index` before checking it against the retry
    /// schedule, so `schedule[1]` (not `schedule[0]`) governs the wait
    /// before the first retry. This mirrors the source's off-by-one and is
    /// preserved intentionally — see `DESIGN.md`.
    fn reschedule(&self, mut request: TaskRequest) -> Result<(), TaskError> {
        request.index += 1;
        let schedule = parse_time_interval(&request.time_interval)?;

        if (request.index as usize) < schedule.len() {
            let delay = schedule[request.index as usize];
            let broker = self.clone();
            self.timer.schedule(Duration::from_secs(delay), async move {
                if let Err(e) = broker.publish(request).await {
                    error!(error = %e, "rescheduled publish failed");
                }
            });
            self.metrics.inc_reschedule("retried");
            Ok(())
        } else {
            self.metrics.inc_reschedule("exhausted");
            Err(TaskError::TryMaxTimes)
        }
    }

    async fn increment_daily_fail_counter(&self) {
        increment_counter(&self.store, &fail_counter_key(&today())).await;
    }
}

/// Shared by the broker's fail counter and the worker's success counter:
/// INCR, and set a 30-day TTL only on the first increment of the day.
pub async fn increment_counter(store: &Arc<dyn StoreClient>, key: &str) {
    match store.incr(key).await {
        Ok(count) => {
            if count == 1 {
                if let Err(e) = store.expire(key, COUNTER_TTL_SECS).await {
                    error!(key, error = %e, "failed to set counter TTL");
                }
            }
        }
        Err(e) => error!(key, error = %e, "failed to increment counter"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use task_queue_core::TaskType;
    use task_queue_store::MockStoreClient;

    fn sample_request(uuid: &str) -> TaskRequest {
        TaskRequest {
            uuid: uuid.to_string(),
            bin_name: "echo.sh".to_string(),
            args: "hello".to_string(),
            start_time: 0,
            time_interval: String::new(),
            index: 0,
            max_run_time: 5,
            task_type: TaskType::Script,
        }
    }

    #[tokio::test]
    async fn immediate_submission_publishes_synchronously() {
        let mock = MockStoreClient::new();
        let broker = Broker::new(Arc::new(mock.clone()), TimingWheel::new(), Arc::new(BrokerMetrics::default()));

        broker.submit(sample_request("abc")).await.unwrap();

        let calls = mock.calls();
        assert!(calls.iter().any(|c| c.op == "hset_multiple" && c.key == "t_abc"));
        assert!(calls.iter().any(|c| c.op == "sadd" && c.key == REQUEST_SET));
    }

    #[tokio::test]
    async fn delayed_submission_defers_publish() {
        let mock = MockStoreClient::new();
        let timer = TimingWheel::new();
        let broker = Broker::new(Arc::new(mock.clone()), timer.clone(), Arc::new(BrokerMetrics::default()));

        let now = chrono::Utc::now().timestamp();
        let mut request = sample_request("abc");
        request.start_time = now + 60;

        broker.submit(request).await.unwrap();

        assert_eq!(timer.len(), 1);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn query_missing_result_is_result_not_exist() {
        let store: Arc<dyn StoreClient> = Arc::new(MockStoreClient::new());
        let broker = Broker::new(store, TimingWheel::new(), Arc::new(BrokerMetrics::default()));

        let err = broker.query_result("missing").await.unwrap_err();
        assert!(matches!(err, TaskError::ResultNotExist));
    }

    #[tokio::test]
    async fn query_existing_result_reports_success_flag() {
        let mock = MockStoreClient::new().with_hmget(
            "r_abc",
            Ok(vec![Some("1".to_string()), Some("hello world".to_string())]),
        );
        let store: Arc<dyn StoreClient> = Arc::new(mock);
        let broker = Broker::new(store, TimingWheel::new(), Arc::new(BrokerMetrics::default()));

        let reply = broker.query_result("abc").await.unwrap();
        assert!(reply.is_result_exist);
        assert!(reply.is_success);
        assert_eq!(reply.result, "hello world");
    }

    #[tokio::test]
    async fn reschedule_uses_index_after_preincrement() {
        let store: Arc<dyn StoreClient> = Arc::new(MockStoreClient::new());
        let timer = TimingWheel::new();
        let broker = Broker::new(store, timer.clone(), Arc::new(BrokerMetrics::default()));

        let mut request = sample_request("abc");
        request.time_interval = "0 2 5".to_string();
        request.index = 0;

        broker.reschedule(request).unwrap();
        assert_eq!(timer.len(), 1);
    }

    #[tokio::test]
    async fn reschedule_past_schedule_end_is_try_max_times() {
        let store: Arc<dyn StoreClient> = Arc::new(MockStoreClient::new());
        let broker = Broker::new(store, TimingWheel::new(), Arc::new(BrokerMetrics::default()));

        let mut request = sample_request("abc");
        request.time_interval = "0 2 5".to_string();
        request.index = 2;

        let err = broker.reschedule(request).unwrap_err();
        assert!(matches!(err, TaskError::TryMaxTimes));
    }

    #[tokio::test]
    async fn empty_interval_counts_as_immediate_terminal_failure() {
        let mock = MockStoreClient::new().with_hget("r_abc", Ok(Some(String::new())));
        let broker = Broker::new(Arc::new(mock.clone()), TimingWheel::new(), Arc::new(BrokerMetrics::default()));

        broker.handle_failed_result("abc").await.unwrap();

        let calls = mock.calls();
        assert!(calls.iter().any(|c| c.op == "incr"));
    }
}
