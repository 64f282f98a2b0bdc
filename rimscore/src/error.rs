use thiserror::Error;

/// Errors raised by the evaluation core.
///
/// Validation errors (`Configuration`, `InvalidRange`, `PeakOverlap`,
/// `UndefinedReference`) are raised synchronously when a specification or
/// definition is constructed or edited and block the operation that would
/// produce inconsistent state. `Calculation` wraps failures surfaced while
/// deriving spectra or integrals; it is reported without retry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("inconsistent filter configuration: {0}")]
    Configuration(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("peak '{first}' overlaps peak '{second}'")]
    PeakOverlap { first: String, second: String },

    #[error("background references undefined peak '{peak}'")]
    UndefinedReference { peak: String },

    #[error("calculation failed: {0}")]
    Calculation(String),
}
