use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use task_queue_core::{TaskRequest, TaskType};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Runs one attempt for a claimed request. Holds no per-task state; the
/// `reqwest::Client` is built once and reused across every HTTP dispatch
/// for connection pooling.
pub struct Executor {
    bin_root: PathBuf,
    default_run_time: u64,
    http: reqwest::Client,
}

fn trim_trailing_newline(mut s: String) -> String {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
    s
}

/// Script deadline: the request's own `max_run_time` wins when set, else
/// the worker's configured default.
fn script_run_time(request: &TaskRequest, default_run_time: u64) -> u64 {
    if request.max_run_time != 0 {
        request.max_run_time
    } else {
        default_run_time
    }
}

/// RPC deadline: the opposite precedence from scripts — the worker's
/// configured `task_run_time` wins when set, falling back to the
/// request's `max_run_time`. Matches the original `callRpc`.
fn rpc_run_time(request: &TaskRequest, default_run_time: u64) -> u64 {
    if default_run_time != 0 {
        default_run_time
    } else {
        request.max_run_time
    }
}

impl Executor {
    pub fn new(bin_root: PathBuf, default_run_time: u64) -> Self {
        Executor {
            bin_root,
            default_run_time,
            http: reqwest::Client::new(),
        }
    }

    /// Dispatch on `task_type` and return `(is_success, result)`. Never
    /// errors: every failure mode becomes `(false, message)` so the caller
    /// always has something to persist.
    pub async fn execute(&self, request: &TaskRequest) -> (bool, String) {
        match request.task_type {
            TaskType::Script => self.execute_script(request).await,
            TaskType::RpcGet | TaskType::RpcPost | TaskType::RpcPut | TaskType::RpcDelete => {
                self.execute_rpc(request).await
            }
        }
    }

    async fn execute_script(&self, request: &TaskRequest) -> (bool, String) {
        let bin_path = clean_join(&self.bin_root, &request.bin_name);
        if !bin_path.exists() {
            return (false, format!("file does not exist: {}", bin_path.display()));
        }

        let mut command = Command::new(&bin_path);
        if !request.args.is_empty() {
            command.args(request.args.split(' '));
        }
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let deadline = Duration::from_secs(script_run_time(request, self.default_run_time));

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return (false, format!("failed to spawn {}: {e}", bin_path.display())),
        };

        match timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stderr = trim_trailing_newline(String::from_utf8_lossy(&output.stderr).into_owned());
                if !stderr.is_empty() {
                    (false, stderr)
                } else {
                    let stdout = trim_trailing_newline(String::from_utf8_lossy(&output.stdout).into_owned());
                    (true, stdout)
                }
            }
            Ok(Err(e)) => (false, format!("execution error: {e}")),
            Err(_) => {
                warn!(uuid = %request.uuid, "script exceeded its deadline, killing");
                (false, "execution timed out".to_string())
            }
        }
    }

    async fn execute_rpc(&self, request: &TaskRequest) -> (bool, String) {
        let method = request
            .task_type
            .http_method()
            .expect("RPC task types always map to an HTTP method");

        let deadline = Duration::from_secs(rpc_run_time(request, self.default_run_time));

        let mut builder = self
            .http
            .request(method.parse().expect("known HTTP methods always parse"), &request.bin_name)
            .timeout(deadline)
            .header("Content-Type", "application/json");

        if !request.args.is_empty() {
            builder = builder.body(request.args.clone());
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if status.as_u16() == 200 {
                    (true, body)
                } else {
                    (false, body)
                }
            }
            Err(e) => {
                debug!(uuid = %request.uuid, error = %e, "http dispatch failed");
                (false, e.to_string())
            }
        }
    }
}

fn clean_join(root: &Path, bin_name: &str) -> PathBuf {
    root.join(bin_name.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use task_queue_core::TaskRequest;

    fn script_request(uuid: &str, bin_name: &str, args: &str, max_run_time: u64) -> TaskRequest {
        TaskRequest {
            uuid: uuid.to_string(),
            bin_name: bin_name.to_string(),
            args: args.to_string(),
            start_time: 0,
            time_interval: String::new(),
            index: 0,
            max_run_time,
            task_type: TaskType::Script,
        }
    }

    fn write_script(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{contents}").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[tokio::test]
    async fn missing_script_is_file_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Executor::new(dir.path().to_path_buf(), 5);

        let (is_success, message) = executor.execute_script(&script_request("a", "nope.sh", "", 0)).await;
        assert!(!is_success);
        assert!(message.contains("does not exist"));
    }

    #[tokio::test]
    async fn successful_script_trims_trailing_newline_from_stdout() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "echo.sh", "#!/bin/sh\necho -n \"$1\"");

        let executor = Executor::new(dir.path().to_path_buf(), 5);
        let (is_success, message) =
            executor.execute_script(&script_request("a", "echo.sh", "hello", 0)).await;

        assert!(is_success);
        assert_eq!(message, "hello");
    }

    #[tokio::test]
    async fn nonempty_stderr_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "fail.sh", "#!/bin/sh\necho boom 1>&2");

        let executor = Executor::new(dir.path().to_path_buf(), 5);
        let (is_success, message) =
            executor.execute_script(&script_request("a", "fail.sh", "", 0)).await;

        assert!(!is_success);
        assert_eq!(message, "boom");
    }

    #[tokio::test]
    async fn slow_script_hits_deadline() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "slow.sh", "#!/bin/sh\nsleep 5");

        let executor = Executor::new(dir.path().to_path_buf(), 5);
        let (is_success, message) =
            executor.execute_script(&script_request("a", "slow.sh", "", 1)).await;

        assert!(!is_success);
        assert!(message.contains("timed out"));
    }

    fn rpc_request(uuid: &str, task_type: TaskType, url: &str, args: &str, max_run_time: u64) -> TaskRequest {
        TaskRequest {
            uuid: uuid.to_string(),
            bin_name: url.to_string(),
            args: args.to_string(),
            start_time: 0,
            time_interval: String::new(),
            index: 0,
            max_run_time,
            task_type,
        }
    }

    #[tokio::test]
    async fn successful_post_reports_method_body_and_content_type() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/hook")
                .header("content-type", "application/json")
                .body("{\"n\":1}");
            then.status(200).body("ok");
        });

        let executor = Executor::new(std::env::temp_dir(), 5);
        let request = rpc_request(
            "a",
            TaskType::RpcPost,
            &server.url("/hook"),
            "{\"n\":1}",
            5,
        );
        let (is_success, message) = executor.execute_rpc(&request).await;

        mock.assert_hits(1);
        assert!(is_success);
        assert_eq!(message, "ok");
    }

    #[tokio::test]
    async fn non_200_response_is_a_failure() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/broken");
            then.status(500).body("boom");
        });

        let executor = Executor::new(std::env::temp_dir(), 5);
        let request = rpc_request("a", TaskType::RpcGet, &server.url("/broken"), "", 5);
        let (is_success, message) = executor.execute_rpc(&request).await;

        mock.assert_hits(1);
        assert!(!is_success);
        assert_eq!(message, "boom");
    }

    #[tokio::test]
    async fn worker_default_run_time_wins_over_larger_request_max_run_time() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::DELETE).path("/slow");
            then.status(200).delay(Duration::from_millis(1500)).body("ok");
        });

        // Worker configures a 1s timeout; the request asks for 10s. If
        // precedence were request-value-first (the script-side rule), the
        // 1.5s delay would succeed under the 10s budget. The worker's
        // smaller default must win instead, so the request times out.
        let executor = Executor::new(std::env::temp_dir(), 1);
        let request = rpc_request("a", TaskType::RpcDelete, &server.url("/slow"), "", 10);
        let (is_success, message) = executor.execute_rpc(&request).await;

        assert!(!is_success, "expected the worker's 1s default to cut off the 1.5s delay");
        assert!(message.to_lowercase().contains("time"), "expected a timeout-shaped error, got: {message}");
    }
}
