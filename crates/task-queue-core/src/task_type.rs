use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TaskError;

/// The five dispatchable task kinds, as the wire-level integer used by the
/// request hash's `task_type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    Script = 1,
    RpcGet = 2,
    RpcPost = 3,
    RpcPut = 4,
    RpcDelete = 5,
}

impl TaskType {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn http_method(self) -> Option<&'static str> {
        match self {
            TaskType::Script => None,
            TaskType::RpcGet => Some("GET"),
            TaskType::RpcPost => Some("POST"),
            TaskType::RpcPut => Some("PUT"),
            TaskType::RpcDelete => Some("DELETE"),
        }
    }

    pub fn from_http_method(method: &str) -> Option<Self> {
        match method {
            "GET" => Some(TaskType::RpcGet),
            "POST" => Some(TaskType::RpcPost),
            "PUT" => Some(TaskType::RpcPut),
            "DELETE" => Some(TaskType::RpcDelete),
            _ => None,
        }
    }
}

impl TryFrom<i64> for TaskType {
    type Error = TaskError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TaskType::Script),
            2 => Ok(TaskType::RpcGet),
            3 => Ok(TaskType::RpcPost),
            4 => Ok(TaskType::RpcPut),
            5 => Ok(TaskType::RpcDelete),
            _ => Err(TaskError::InvalidArgument),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}
