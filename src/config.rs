use crate::errors::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Flat fee charged per option leg (buying or writing).
    pub options_fees: f64,
    /// Annual risk-free rate used when a request omits one.
    pub risk_free_rate: f64,
    /// Fraction of the bid/ask spread added to the bid when pegging a mid price.
    pub peg_spread: f64,
    pub solver_max_iterations: u32,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            options_fees: 0.0,
            risk_free_rate: 0.001,
            peg_spread: 0.5,
            solver_max_iterations: crate::models::implied_vol::DEFAULT_MAX_ITERATIONS,
            server_port: 3001,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let options_fees = env_var_or("OPTIONS_FEES", "0.0")
            .parse::<f64>()
            .map_err(|e| EngineError::Config(format!("OPTIONS_FEES: {e}")))?;

        let risk_free_rate = env_var_or("RISK_FREE_RATE", "0.001")
            .parse::<f64>()
            .map_err(|e| EngineError::Config(format!("RISK_FREE_RATE: {e}")))?;

        let peg_spread = env_var_or("PEG_SPREAD", "0.5")
            .parse::<f64>()
            .map_err(|e| EngineError::Config(format!("PEG_SPREAD: {e}")))?;

        let solver_max_iterations = env_var_or("SOLVER_MAX_ITERATIONS", "200")
            .parse::<u32>()
            .map_err(|e| EngineError::Config(format!("SOLVER_MAX_ITERATIONS: {e}")))?;

        let server_port = env_var_or("SERVER_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| EngineError::Config(format!("SERVER_PORT: {e}")))?;

        let cfg = Self {
            options_fees,
            risk_free_rate,
            peg_spread,
            solver_max_iterations,
            server_port,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> EngineResult<()> {
        if self.options_fees < 0.0 || !self.options_fees.is_finite() {
            return Err(EngineError::Config(format!(
                "OPTIONS_FEES: {} must be >= 0",
                self.options_fees
            )));
        }
        if !(0.0..=1.0).contains(&self.peg_spread) {
            return Err(EngineError::Config(format!(
                "PEG_SPREAD: {} must lie in [0, 1]",
                self.peg_spread
            )));
        }
        if self.solver_max_iterations == 0 {
            return Err(EngineError::Config("SOLVER_MAX_ITERATIONS: must be > 0".into()));
        }
        Ok(())
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.options_fees, 0.0);
        assert_eq!(cfg.peg_spread, 0.5);
    }

    #[test]
    fn test_rejects_bad_peg_spread() {
        let cfg = AppConfig { peg_spread: 1.5, ..AppConfig::default() };
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let cfg = AppConfig { solver_max_iterations: 0, ..AppConfig::default() };
        assert!(cfg.validate().is_err());
    }
}
