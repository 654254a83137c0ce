pub mod quotes;

pub use quotes::{extend_rows, ChainSettings, ExtendedQuoteRow, MarketInputs, QuoteRow};

use crate::errors::{EngineError, EngineResult};
use crate::ledger::contract::parse_date;
use crate::models::{ItmModel, OptionType};
use std::collections::BTreeMap;

/// Raw call and put tables for one expiry.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ChainTables {
    #[serde(default)]
    pub calls: Vec<QuoteRow>,
    #[serde(default)]
    pub puts: Vec<QuoteRow>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ExtendedChain {
    pub expiration: String,
    pub days: f64,
    pub calls: Vec<ExtendedQuoteRow>,
    pub puts: Vec<ExtendedQuoteRow>,
}

/// Expiry by position in `dates()` or by its YYYY-MM-DD string.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(untagged)]
pub enum Expiry {
    Index(usize),
    Date(String),
}

/// Quote data layer. Implementations fetch raw per-expiry tables for one ticker.
pub trait ChainSource: Send + Sync {
    /// Available expiry strings, nearest first.
    fn expirations(&self, ticker: &str) -> EngineResult<Vec<String>>;

    fn tables(&self, ticker: &str, expiration: &str) -> EngineResult<ChainTables>;
}

/// Quote tables held in memory, keyed by expiry string.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChainSource {
    tables: BTreeMap<String, ChainTables>,
}

impl InMemoryChainSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, expiration: impl Into<String>, tables: ChainTables) {
        self.tables.insert(expiration.into(), tables);
    }
}

impl ChainSource for InMemoryChainSource {
    fn expirations(&self, _ticker: &str) -> EngineResult<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn tables(&self, _ticker: &str, expiration: &str) -> EngineResult<ChainTables> {
        self.tables
            .get(expiration)
            .cloned()
            .ok_or_else(|| EngineError::InvalidParameter(format!("no quotes for expiry {expiration}")))
    }
}

/// Read-only chain view of one underlying.
pub struct OptionsChain {
    ticker: String,
    source: Box<dyn ChainSource>,
    dates: Vec<String>,
}

impl OptionsChain {
    pub fn new(ticker: impl Into<String>, source: Box<dyn ChainSource>) -> EngineResult<Self> {
        let ticker = ticker.into();
        let dates = source.expirations(&ticker)?;
        Ok(Self { ticker, source, dates })
    }

    #[inline]
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    #[inline]
    pub fn dates(&self) -> &[String] {
        &self.dates
    }

    pub fn resolve(&self, expiry: &Expiry) -> EngineResult<String> {
        match expiry {
            Expiry::Index(i) => self.dates.get(*i).cloned().ok_or_else(|| {
                EngineError::InvalidParameter(format!(
                    "expiry index {i} out of range ({} dates)",
                    self.dates.len()
                ))
            }),
            Expiry::Date(d) => Ok(d.clone()),
        }
    }

    pub fn option_chain(&self, expiry: &Expiry) -> EngineResult<ChainTables> {
        let expiration = self.resolve(expiry)?;
        self.source.tables(&self.ticker, &expiration)
    }

    pub fn calls(&self, expiry: &Expiry) -> EngineResult<Vec<QuoteRow>> {
        Ok(self.option_chain(expiry)?.calls)
    }

    pub fn puts(&self, expiry: &Expiry) -> EngineResult<Vec<QuoteRow>> {
        Ok(self.option_chain(expiry)?.puts)
    }

    /// Enrich both tables of one expiry. When `days` is None it is the
    /// calendar distance from today to the expiry, floored at zero.
    #[allow(clippy::too_many_arguments)]
    pub fn extended_chain(
        &self,
        expiry: &Expiry,
        spot: f64,
        drift: f64,
        volatility: f64,
        days: Option<f64>,
        risk_free_rate: f64,
        itm_model: &dyn ItmModel,
        settings: ChainSettings,
    ) -> EngineResult<ExtendedChain> {
        let expiration = self.resolve(expiry)?;
        let days = match days {
            Some(d) => d,
            None => days_until(&expiration, chrono::Local::now().date_naive())?,
        };
        let tables = self.source.tables(&self.ticker, &expiration)?;
        let market = MarketInputs {
            spot,
            drift,
            volatility,
            days,
            risk_free_rate,
        };

        tracing::debug!(
            ticker = %self.ticker,
            expiration = %expiration,
            days,
            calls = tables.calls.len(),
            puts = tables.puts.len(),
            model = itm_model.name(),
            "extending option chain"
        );

        Ok(ExtendedChain {
            calls: extend_rows(&tables.calls, OptionType::Call, &market, itm_model, settings),
            puts: extend_rows(&tables.puts, OptionType::Put, &market, itm_model, settings),
            expiration,
            days,
        })
    }
}

fn days_until(expiration: &str, today: chrono::NaiveDate) -> EngineResult<f64> {
    let days = (parse_date(expiration)? - today).num_days();
    if days < 0 {
        tracing::warn!(expiration, days, "expiry already passed, pricing at zero days");
    }
    Ok(days.max(0) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::black_scholes::DriftItm;
    use chrono::NaiveDate;

    fn quote(strike: f64, bid: f64, ask: f64, itm: bool) -> QuoteRow {
        QuoteRow {
            strike,
            bid,
            ask,
            last_price: ask,
            open_interest: 50.0,
            in_the_money: itm,
        }
    }

    fn chain() -> OptionsChain {
        let mut source = InMemoryChainSource::new();
        source.insert(
            "2024-01-19",
            ChainTables {
                calls: vec![quote(100.0, 1.9, 2.1, true), quote(105.0, 0.55, 0.57, false)],
                puts: vec![quote(98.0, 0.60, 0.62, false), quote(103.0, 2.5, 2.7, true)],
            },
        );
        source.insert("2024-02-16", ChainTables::default());
        OptionsChain::new("SPY", Box::new(source)).unwrap()
    }

    fn settings() -> ChainSettings {
        ChainSettings { peg_spread: 0.5, max_iterations: 200 }
    }

    #[test]
    fn test_dates_and_resolve() {
        let c = chain();
        assert_eq!(c.ticker(), "SPY");
        assert_eq!(c.dates(), &["2024-01-19".to_string(), "2024-02-16".to_string()]);
        assert_eq!(c.resolve(&Expiry::Index(1)).unwrap(), "2024-02-16");
        assert!(matches!(c.resolve(&Expiry::Index(5)), Err(EngineError::InvalidParameter(_))));
        assert_eq!(c.calls(&Expiry::Index(0)).unwrap().len(), 2);
        assert!(c.puts(&Expiry::Date("2030-01-01".into())).is_err());
    }

    #[test]
    fn test_extended_chain_both_sides() {
        let c = chain();
        let ext = c
            .extended_chain(&Expiry::Date("2024-01-19".into()), 101.24, 0.0, 0.016, Some(8.0), 0.01, &DriftItm, settings())
            .unwrap();
        assert_eq!(ext.calls.len(), 2);
        assert_eq!(ext.puts.len(), 2);
        assert_eq!(ext.calls[0].idv, 0.0);
        assert!(ext.calls[1].idv > 0.0);
        assert!(ext.puts[0].idv > 0.0);
        assert_eq!(ext.puts[1].bsm_price, 0.0);
    }

    #[test]
    fn test_days_until() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 11).unwrap();
        assert_eq!(days_until("2024-01-19", today).unwrap(), 8.0);
        assert_eq!(days_until("2024-01-01", today).unwrap(), 0.0);
        assert!(days_until("19-01-2024", today).is_err());
    }

    #[test]
    fn test_expiry_deserializes_index_or_date() {
        let e: Expiry = serde_json::from_str("2").unwrap();
        assert_eq!(e, Expiry::Index(2));
        let e: Expiry = serde_json::from_str("\"2024-01-19\"").unwrap();
        assert_eq!(e, Expiry::Date("2024-01-19".into()));
    }
}
