use thiserror::Error;

/// Errors raised by lane, intersection, codec and configuration operations.
///
/// Capacity exhaustion is not represented here: full lanes and empty permit
/// pools are reported through the `bool` returned by the operation itself.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid direction: {0}")]
    InvalidDirection(String),

    #[error("unknown vehicle class: {0}")]
    UnknownVehicleClass(String),

    #[error("invalid movement: {0}")]
    InvalidMovement(String),

    #[error("field `{field}` is {len} bytes, at most {max} fit on the wire")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        len: usize,
    },

    #[error("malformed coordination message: {0}")]
    MalformedMessage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("chart rendering failed: {0}")]
    Chart(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type ControlResult<T> = Result<T, ControlError>;

/// Failure of a coordination channel. Every variant means the channel is dead.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("coordination channel closed")]
    Closed,

    #[error("short transfer: expected {expected} bytes, got {received}")]
    Truncated { expected: usize, received: usize },

    #[error("coordination channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Malformed(#[from] ControlError),
}
