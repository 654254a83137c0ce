use crate::errors::{require_positive, EngineError, EngineResult};
use crate::ledger::receipt::Receipt;
use crate::models::{format_decimal, OptionType};
use chrono::{DateTime, NaiveDate, Utc};

/// Shares controlled by one option contract.
pub const CONTRACT_MULTIPLIER: f64 = 100.0;

/// A tradable option instrument. Owned by the `Options` registry that lists it;
/// only `purchase` mutates it after construction.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Contract {
    #[serde(rename = "type")]
    pub option_type: OptionType,
    pub strike: f64,
    pub expiration: NaiveDate,
    /// Quoted premium per share.
    pub price: f64,
    /// Contracts still available to buy.
    pub open_interest: u64,
    pub name: String,
}

/// Unvalidated contract fields, as they arrive from callers.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ContractSpec {
    #[serde(rename = "type")]
    pub option_type: String,
    pub strike: f64,
    pub price: f64,
    /// YYYY-MM-DD. Today when omitted.
    #[serde(default)]
    pub expiration: Option<String>,
    #[serde(default)]
    pub open_interest: Option<f64>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ContractSpec {
    pub fn build(self) -> EngineResult<Contract> {
        let option_type = self.option_type.parse::<OptionType>()?;
        let expiration = match self.expiration.as_deref() {
            Some(s) if !s.trim().is_empty() => Some(parse_date(s)?),
            _ => None,
        };
        // Missing or non-positive open interest coerces to zero; fractions truncate.
        let open_interest = self
            .open_interest
            .filter(|oi| oi.is_finite() && *oi > 0.0)
            .map(|oi| oi as u64)
            .unwrap_or(0);

        let mut contract = Contract::new(option_type, self.strike, expiration, self.price, open_interest)?;
        if let Some(name) = self.name.filter(|n| !n.trim().is_empty()) {
            contract.name = name;
        }
        Ok(contract)
    }
}

impl Contract {
    /// Validate once and derive the `type:strike:expiration` name.
    pub fn new(
        option_type: OptionType,
        strike: f64,
        expiration: Option<NaiveDate>,
        price: f64,
        open_interest: u64,
    ) -> EngineResult<Self> {
        let strike = require_positive("strike", strike)?;
        let price = require_positive("price", price)?;
        let expiration = expiration.unwrap_or_else(|| chrono::Local::now().date_naive());
        Ok(Self {
            option_type,
            strike,
            expiration,
            price,
            open_interest,
            name: Self::format_name(option_type, strike, expiration),
        })
    }

    pub fn format_name(option_type: OptionType, strike: f64, expiration: NaiveDate) -> String {
        format!("{option_type}:{}:{}", format_decimal(strike), expiration.format("%Y-%m-%d"))
    }

    /// Underlying price at which a buyer breaks even at expiry.
    #[inline]
    pub fn even_price(&self) -> f64 {
        match self.option_type {
            OptionType::Call => self.strike + self.price,
            OptionType::Put => self.strike - self.price,
        }
    }

    #[inline]
    pub fn itm(&self, spot: f64) -> bool {
        match self.option_type {
            OptionType::Call => self.strike <= spot,
            OptionType::Put => self.strike >= spot,
        }
    }

    #[inline]
    pub fn intrinsic_value(&self, spot: f64) -> f64 {
        match self.option_type {
            OptionType::Call => (spot - self.strike).max(0.0),
            OptionType::Put => (self.strike - spot).max(0.0),
        }
    }

    /// Time value remaining when `spot` is given, otherwise raw notional
    /// premium; scaled by 100 shares per contract and `amount`.
    pub fn premium(&self, spot: Option<f64>, amount: u64, purchase_price: Option<f64>) -> f64 {
        let price = purchase_price.unwrap_or(self.price);
        let per_share = match spot {
            Some(s) => price - self.intrinsic_value(s),
            None => price,
        };
        per_share * amount as f64 * CONTRACT_MULTIPLIER
    }

    /// Take `amount` contracts out of open interest and issue a receipt.
    pub fn purchase(&mut self, amount: i64, owner: &str, at: DateTime<Utc>) -> EngineResult<Receipt> {
        if amount <= 0 {
            return Err(EngineError::InvalidAmount(amount));
        }
        let requested = amount as u64;
        if requested > self.open_interest {
            return Err(EngineError::InsufficientOpenInterest {
                requested,
                available: self.open_interest,
            });
        }
        let receipt = Receipt::new(owner, self.price, requested, &self.name, self.even_price(), at)?;
        self.open_interest -= requested;
        Ok(receipt)
    }

    /// Buyer settlement for a receipt at `closing_price`, net of its cost.
    pub fn exercise(&self, closing_price: f64, receipt: &Receipt) -> f64 {
        let shares = receipt.amount as f64 * CONTRACT_MULTIPLIER;
        match self.option_type {
            OptionType::Call => shares * (closing_price - self.strike) - receipt.cost(),
            OptionType::Put => shares * (self.strike - closing_price) - receipt.cost(),
        }
    }
}

pub(crate) fn parse_date(s: &str) -> EngineResult<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn call() -> Contract {
        Contract::new(OptionType::Call, 105.0, Some(date("2024-01-19")), 0.56, 10).unwrap()
    }

    #[test]
    fn test_derived_name() {
        assert_eq!(call().name, "CALL:105.0:2024-01-19");
        let put = Contract::new(OptionType::Put, 97.5, Some(date("2024-01-19")), 1.2, 0).unwrap();
        assert_eq!(put.name, "PUT:97.5:2024-01-19");
    }

    #[test]
    fn test_rejects_bad_strike_and_price() {
        assert!(matches!(
            Contract::new(OptionType::Call, 0.0, None, 1.0, 1),
            Err(EngineError::InvalidParameter(_))
        ));
        assert!(Contract::new(OptionType::Call, 100.0, None, -1.0, 1).is_err());
    }

    #[test]
    fn test_spec_coercion() {
        let spec = ContractSpec {
            option_type: "put".into(),
            strike: 98.0,
            price: 0.61,
            expiration: None,
            open_interest: Some(-4.0),
            name: None,
        };
        let c = spec.build().unwrap();
        assert_eq!(c.option_type, OptionType::Put);
        assert_eq!(c.open_interest, 0);
        assert_eq!(c.expiration, chrono::Local::now().date_naive());

        let spec = ContractSpec {
            option_type: "CALL".into(),
            strike: 100.0,
            price: 1.0,
            expiration: Some("01/19/2024".into()),
            open_interest: None,
            name: None,
        };
        assert!(matches!(spec.build(), Err(EngineError::Parse(_))));
    }

    #[test]
    fn test_even_price_and_itm() {
        let c = call();
        assert!((c.even_price() - 105.56).abs() < 1e-12);
        assert!(c.itm(105.0));
        assert!(!c.itm(104.99));
        let p = Contract::new(OptionType::Put, 98.0, None, 0.61, 1).unwrap();
        assert!((p.even_price() - 97.39).abs() < 1e-12);
        assert!(p.itm(98.0));
        assert!(!p.itm(98.5));
    }

    #[test]
    fn test_premium_time_value() {
        let c = call();
        assert!((c.premium(None, 2, None) - 112.0).abs() < 1e-9);
        // Spot 105.3: intrinsic 0.3, time value 0.26 per share.
        assert!((c.premium(Some(105.3), 1, None) - 26.0).abs() < 1e-9);
        assert!((c.premium(Some(100.0), 1, Some(0.40)) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_purchase_decrements_open_interest() {
        let mut c = call();
        let r = c.purchase(3, "alice", Utc::now()).unwrap();
        assert_eq!(c.open_interest, 7);
        assert_eq!(r.amount, 3);
        assert_eq!(r.contract_name, c.name);

        assert_eq!(
            c.purchase(8, "bob", Utc::now()),
            Err(EngineError::InsufficientOpenInterest { requested: 8, available: 7 })
        );
        assert_eq!(c.purchase(0, "bob", Utc::now()), Err(EngineError::InvalidAmount(0)));
        assert_eq!(c.open_interest, 7);
    }

    #[test]
    fn test_exercise_settlement() {
        let mut c = call();
        let r = c.purchase(2, "alice", Utc::now()).unwrap();
        // 200 * (110 - 105) - 0.56 * 2
        assert!((c.exercise(110.0, &r) - (1000.0 - 1.12)).abs() < 1e-9);

        let mut p = Contract::new(OptionType::Put, 98.0, None, 0.61, 5).unwrap();
        let r = p.purchase(1, "bob", Utc::now()).unwrap();
        assert!((p.exercise(95.0, &r) - (300.0 - 0.61)).abs() < 1e-9);
    }
}
