use thiserror::Error;

/// Errors raised when constructing a calculator with invalid parameters.
///
/// Data-quality problems on the event path (malformed values, out-of-order
/// timestamps) are deliberately not represented here — those are skips, not
/// errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("period must be >= 1, got {0}")]
    InvalidPeriod(usize),

    #[error("fast period {fast} must be less than slow period {slow}")]
    InvalidMacdPeriods { fast: usize, slow: usize },

    #[error("tick size must be positive, got {0}")]
    InvalidTickSize(f64),
}
