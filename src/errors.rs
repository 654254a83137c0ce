/// Domain-specific error types for the options engine.
/// Validation failures are raised at construction/registration time and are
/// never retried. Numerical non-convergence is not an error: solvers return a
/// best-effort result tagged with a `SolverStatus` instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("not enough contracts to fill order: requested {requested}, available {available}")]
    InsufficientOpenInterest { requested: u64, available: u64 },

    #[error("invalid amount {0}: must purchase at least 1 contract")]
    InvalidAmount(i64),

    #[error("receipt already exists: {0}")]
    DuplicateReceiptId(String),

    #[error("contract not found: {0}")]
    UnknownContract(String),

    #[error("receipt not found: {0}")]
    UnknownReceipt(String),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<std::num::ParseFloatError> for EngineError {
    fn from(e: std::num::ParseFloatError) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<std::num::ParseIntError> for EngineError {
    fn from(e: std::num::ParseIntError) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<chrono::ParseError> for EngineError {
    fn from(e: chrono::ParseError) -> Self {
        EngineError::Parse(format!("date does not follow the format YYYY-MM-DD: {e}"))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Reject non-finite and non-positive values. Used by every fallible constructor.
pub(crate) fn require_positive(field: &str, value: f64) -> EngineResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(EngineError::InvalidParameter(format!(
            "{field}({value}) must be a positive number"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_positive() {
        assert_eq!(require_positive("strike", 105.0), Ok(105.0));
        assert!(matches!(
            require_positive("strike", 0.0),
            Err(EngineError::InvalidParameter(_))
        ));
        assert!(require_positive("price", f64::NAN).is_err());
        assert!(require_positive("price", -1.0).is_err());
    }

    #[test]
    fn test_open_interest_message() {
        let e = EngineError::InsufficientOpenInterest { requested: 5, available: 2 };
        assert!(e.to_string().contains("requested 5, available 2"));
    }
}
