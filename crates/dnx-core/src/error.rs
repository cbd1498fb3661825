use thiserror::Error;

/// Error kinds modeled on `dnxError.h`, narrowed to the ones reachable
/// from safe Rust (memory/heap failures
/// are folded into `Memory` for the allocation-failure-at-init path;
/// there is no separate debug-heap instrumentation to report on).
#[derive(Debug, Error)]
pub enum DnxError {
    #[error("invalid argument: {0}")]
    Invalid(String),
    #[error("capacity exceeded: {0}")]
    Capacity(String),
    #[error("bad url: {0}")]
    BadUrl(String),
    #[error("state transition refused: {0}")]
    Already(String),
    #[error("already exists: {0}")]
    Exist(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("memory allocation failed: {0}")]
    Memory(String),
    #[error("transport open failed: {0}")]
    Open(String),
    #[error("message too large: {0}")]
    Size(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("address resolution failed: {0}")]
    Address(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed message: {0}")]
    Syntax(String),
    #[error("thread/lock error: {0}")]
    Thread(String),
    #[error("timed out")]
    Timeout,
    #[error("busy: {0}")]
    Busy(String),
}

pub type DnxResult<T> = Result<T, DnxError>;
