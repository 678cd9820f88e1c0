use thiserror::Error;

/// Structured parse failures.
///
/// Only a truly unrecognized message shape reaches the caller — it signals an
/// upstream contract break. Ordinary malformed events (missing fields,
/// non-finite numbers) are logged and skipped by the engine hooks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{0}` is not a finite number")]
    InvalidNumber(&'static str),

    #[error("unrecognized book side `{0}`")]
    InvalidSide(String),

    #[error(
        "unrecognized book message shape: expected level arrays, a top-of-book \
         object, or flat bid/ask fields"
    )]
    UnknownBookShape,
}

/// Failure of the accelerated backend for one operation. Never user-visible:
/// the engine logs it and falls back to the reference calculator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("accelerated backend unavailable: {0}")]
    Unavailable(String),

    #[error("accelerated backend call failed: {0}")]
    Call(String),
}
