use thiserror::Error;

/// Errors surfaced across the Broker/Worker boundary.
///
/// `InvalidArgument`, `ResultNotExist`, `FileNotExist`, `ExecTimeout` and
/// `TryMaxTimes` are the named error kinds from the task dispatch protocol;
/// everything else is passthrough from the store or an HTTP transport.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("invalid argument")]
    InvalidArgument,

    #[error("result does not exist")]
    ResultNotExist,

    #[error("file does not exist: {0}")]
    FileNotExist(String),

    #[error("execution timed out")]
    ExecTimeout,

    #[error("retry schedule exhausted")]
    TryMaxTimes,

    #[error("store error: {0}")]
    Store(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TaskError>;
