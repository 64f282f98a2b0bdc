use rimscore::error::EvalError;
use thiserror::Error;

/// Errors of the CRD file and session layer.
#[derive(Debug, Error)]
pub enum CrdError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a valid CRD file: {0}")]
    Format(String),

    #[error("calibration file error: {0}")]
    CalFile(String),

    #[error("csv export error: {0}")]
    Csv(#[from] csv::Error),

    #[error("no current evaluation: {0}")]
    Stale(String),

    #[error(transparent)]
    Eval(#[from] EvalError),
}
