pub mod normal;
pub mod black_scholes;
pub mod tranche;
pub mod implied_vol;
pub mod scenarios;

use crate::errors::{EngineError, EngineResult};
use std::str::FromStr;

/// Option right. Closed set: every payoff and pricing branch matches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    #[inline]
    pub fn is_call(self) -> bool {
        matches!(self, OptionType::Call)
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "CALL"),
            Self::Put => write!(f, "PUT"),
        }
    }
}

impl FromStr for OptionType {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CALL" => Ok(Self::Call),
            "PUT" => Ok(Self::Put),
            other => Err(EngineError::InvalidParameter(format!(
                "type({other}) must be either CALL or PUT"
            ))),
        }
    }
}

/// Render a float the way identifiers expect it: whole values keep one
/// decimal (105.0), others print as-is (102.5).
pub fn format_decimal(x: f64) -> String {
    if x.fract() == 0.0 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

/// Inputs shared by the probability-ITM estimators. Stack-allocated, Copy.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct ItmParams {
    pub spot: f64,
    pub strike: f64,
    /// Daily volatility.
    pub day_vol: f64,
    /// Daily drift (alpha).
    pub drift: f64,
    pub days: f64,
    /// Annual risk-free rate. Ignored by the drift-only estimator.
    #[serde(default)]
    pub risk_free_rate: f64,
}

/// Probability-in-the-money estimators implement this trait.
/// probability() must be a pure function: deterministic output from inputs only.
/// Send + Sync so one instance can be shared across request handlers.
pub trait ItmModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// P(option finishes in the money at expiry), in [0, 1].
    fn probability(&self, option_type: OptionType, params: &ItmParams) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_type_parse() {
        assert_eq!(" call ".parse::<OptionType>(), Ok(OptionType::Call));
        assert_eq!("PUT".parse::<OptionType>(), Ok(OptionType::Put));
        assert!("straddle".parse::<OptionType>().is_err());
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(105.0), "105.0");
        assert_eq!(format_decimal(97.5), "97.5");
        assert_eq!(format_decimal(0.56), "0.56");
    }

    #[test]
    fn test_option_type_serde() {
        let json = serde_json::to_string(&OptionType::Put).unwrap();
        assert_eq!(json, "\"PUT\"");
        let back: OptionType = serde_json::from_str("\"CALL\"").unwrap();
        assert_eq!(back, OptionType::Call);
    }
}
