use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// `host:port` or `host:port/db_index`, as accepted by `task-queue-store`.
    pub store_addr: String,
    /// Script binaries are resolved relative to this root.
    pub bin_root: PathBuf,
    /// Default execution deadline in seconds, used when a request's
    /// `max_run_time` is `0`.
    pub task_run_time: u64,
    /// TTL, in seconds, applied to `r_<uuid>` after it's written.
    pub result_keep_time: u64,
    /// Sleep between claim attempts when the worker is otherwise busy, in
    /// seconds. `0` disables the pause.
    pub period: u64,
    pub log_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            store_addr: "127.0.0.1:6379".to_string(),
            bin_root: PathBuf::from("./bin"),
            task_run_time: 60,
            result_keep_time: 3600,
            period: 0,
            log_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}
