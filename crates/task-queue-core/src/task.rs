use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::task_type::TaskType;
use crate::Result;

/// Order of the fields stored in a request hash (`HMSET`/`HMGET`), matching
/// the positional layout the broker and worker both depend on.
pub const REQUEST_FIELDS: [&str; 8] = [
    "uuid",
    "bin_name",
    "args",
    "start_time",
    "time_interval",
    "index",
    "max_run_time",
    "task_type",
];

/// A task as submitted by a caller and stored in the request hash.
///
/// `bin_name` and `args` are overloaded by `task_type`: for a script task
/// they are the binary path (relative to the worker's bin root) and its
/// argv tail; for an HTTP task they are the URL and the request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub uuid: String,
    pub bin_name: String,
    pub args: String,
    /// Seconds since epoch; `0` means "now".
    pub start_time: i64,
    /// Space-separated retry delays, in seconds.
    pub time_interval: String,
    /// 0-based position in the retry schedule; incremented per failed attempt.
    pub index: u32,
    pub max_run_time: u64,
    pub task_type: TaskType,
}

impl TaskRequest {
    pub fn new_uuid() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Render the request as the ordered field/value pairs `HMSET` expects.
    pub fn to_hash_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (REQUEST_FIELDS[0], self.uuid.clone()),
            (REQUEST_FIELDS[1], self.bin_name.clone()),
            (REQUEST_FIELDS[2], self.args.clone()),
            (REQUEST_FIELDS[3], self.start_time.to_string()),
            (REQUEST_FIELDS[4], self.time_interval.clone()),
            (REQUEST_FIELDS[5], self.index.to_string()),
            (REQUEST_FIELDS[6], self.max_run_time.to_string()),
            (REQUEST_FIELDS[7], self.task_type.as_i64().to_string()),
        ]
    }

    /// Reconstruct a request from the 8 `HMGET` values, in `REQUEST_FIELDS`
    /// order. A missing `uuid` means the key expired between the claim and
    /// the read, which is distinct from a malformed request — callers should
    /// treat `Ok(None)` as "skip this claim", not as an error.
    pub fn from_hash_values(values: &[Option<String>]) -> Result<Option<Self>> {
        if values.len() != REQUEST_FIELDS.len() {
            return Err(TaskError::InvalidArgument);
        }

        let uuid = match &values[0] {
            Some(v) => v.clone(),
            None => return Ok(None),
        };

        let start_time: i64 = values[3]
            .as_ref()
            .ok_or(TaskError::InvalidArgument)?
            .parse()
            .map_err(|_| TaskError::InvalidArgument)?;

        let index: u32 = values[5]
            .as_ref()
            .ok_or(TaskError::InvalidArgument)?
            .parse()
            .map_err(|_| TaskError::InvalidArgument)?;

        let max_run_time: u64 = values[6]
            .as_ref()
            .ok_or(TaskError::InvalidArgument)?
            .parse()
            .map_err(|_| TaskError::InvalidArgument)?;

        let task_type_raw: i64 = values[7]
            .as_ref()
            .ok_or(TaskError::InvalidArgument)?
            .parse()
            .map_err(|_| TaskError::InvalidArgument)?;
        let task_type = TaskType::try_from(task_type_raw)?;

        Ok(Some(TaskRequest {
            uuid,
            bin_name: values[1].clone().unwrap_or_default(),
            args: values[2].clone().unwrap_or_default(),
            start_time,
            time_interval: values[4].clone().unwrap_or_default(),
            index,
            max_run_time,
            task_type,
        }))
    }
}

/// The outcome of one execution attempt, persisted into the result hash
/// alongside the original request fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub request: TaskRequest,
    pub is_success: bool,
    pub result: String,
}

impl TaskResult {
    pub fn success(request: TaskRequest, result: String) -> Self {
        TaskResult {
            request,
            is_success: true,
            result,
        }
    }

    pub fn failure(request: TaskRequest, result: String) -> Self {
        TaskResult {
            request,
            is_success: false,
            result,
        }
    }

    /// Render the result as the ordered field/value pairs `HMSET` expects:
    /// the 8 request fields plus `is_success` and `result`.
    pub fn to_hash_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = self.request.to_hash_fields();
        fields.push(("is_success", if self.is_success { "1" } else { "0" }.to_string()));
        fields.push(("result", self.result.clone()));
        fields
    }
}

/// Wire shape returned by the result-query endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub is_result_exist: bool,
    pub is_success: bool,
    #[serde(rename = "message")]
    pub result: String,
}

impl Reply {
    pub fn not_exist() -> Self {
        Reply {
            is_result_exist: false,
            is_success: false,
            result: String::new(),
        }
    }

    pub fn from_result(is_success: bool, result: String) -> Self {
        Reply {
            is_result_exist: true,
            is_success,
            result,
        }
    }
}

/// Parse a `time_interval` field into its retry delays, in seconds.
///
/// An empty string yields an empty schedule. Any non-integer entry is a
/// caller error, not a runtime one.
pub fn parse_time_interval(raw: &str) -> Result<Vec<u64>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    raw.split(' ')
        .map(|part| part.parse::<u64>().map_err(|_| TaskError::InvalidArgument))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> TaskRequest {
        TaskRequest {
            uuid: "abc-123".to_string(),
            bin_name: "runner.sh".to_string(),
            args: "--flag value".to_string(),
            start_time: 0,
            time_interval: "0 2 5".to_string(),
            index: 0,
            max_run_time: 60,
            task_type: TaskType::Script,
        }
    }

    #[test]
    fn hash_fields_round_trip() {
        let req = sample_request();
        let fields = req.to_hash_fields();
        let values: Vec<Option<String>> = fields.into_iter().map(|(_, v)| Some(v)).collect();
        let parsed = TaskRequest::from_hash_values(&values).unwrap().unwrap();

        assert_eq!(parsed.uuid, req.uuid);
        assert_eq!(parsed.bin_name, req.bin_name);
        assert_eq!(parsed.args, req.args);
        assert_eq!(parsed.start_time, req.start_time);
        assert_eq!(parsed.time_interval, req.time_interval);
        assert_eq!(parsed.index, req.index);
        assert_eq!(parsed.max_run_time, req.max_run_time);
        assert_eq!(parsed.task_type, req.task_type);
    }

    #[test]
    fn missing_uuid_signals_expiry_not_error() {
        let values: Vec<Option<String>> = vec![None, None, None, None, None, None, None, None];
        let parsed = TaskRequest::from_hash_values(&values).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn bad_field_is_invalid_argument() {
        let mut values: Vec<Option<String>> = sample_request()
            .to_hash_fields()
            .into_iter()
            .map(|(_, v)| Some(v))
            .collect();
        values[7] = Some("not-a-number".to_string());
        let err = TaskRequest::from_hash_values(&values).unwrap_err();
        assert!(matches!(err, TaskError::InvalidArgument));
    }

    #[test]
    fn empty_schedule_parses_to_empty_vec() {
        assert_eq!(parse_time_interval("").unwrap(), Vec::<u64>::new());
    }

    #[test]
    fn schedule_parses_space_separated_delays() {
        assert_eq!(parse_time_interval("0 2 5").unwrap(), vec![0, 2, 5]);
    }

    #[test]
    fn non_integer_schedule_entry_is_an_error() {
        assert!(parse_time_interval("5 soon 30").is_err());
    }

    #[test]
    fn reply_not_exist_has_zeroed_flags() {
        let reply = Reply::not_exist();
        assert!(!reply.is_result_exist);
        assert!(!reply.is_success);
        assert_eq!(reply.result, "");
    }
}
