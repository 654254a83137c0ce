use crate::errors::{require_positive, EngineError, EngineResult};
use chrono::{DateTime, SecondsFormat, Utc};

/// Proof of purchase of `amount` contracts of `contract_name` by `owner`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Receipt {
    pub id: String,
    pub owner: String,
    pub purchase_price: f64,
    pub amount: u64,
    pub contract_name: String,
    /// Contract break-even price at purchase time.
    pub event_price: f64,
    pub purchased_at: DateTime<Utc>,
}

impl Receipt {
    pub fn new(
        owner: &str,
        purchase_price: f64,
        amount: u64,
        contract_name: &str,
        event_price: f64,
        at: DateTime<Utc>,
    ) -> EngineResult<Self> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(EngineError::InvalidParameter("owner is required".into()));
        }
        if contract_name.trim().is_empty() {
            return Err(EngineError::InvalidParameter("contract name is required".into()));
        }
        if amount == 0 {
            return Err(EngineError::InvalidAmount(0));
        }
        let purchase_price = require_positive("purchase price", purchase_price)?;
        let event_price = require_positive("event price", event_price)?;

        Ok(Self {
            id: Self::format_id(owner, contract_name, at),
            owner: owner.to_string(),
            purchase_price,
            amount,
            contract_name: contract_name.to_string(),
            event_price,
            purchased_at: at,
        })
    }

    /// `owner:contract:timestamp`. Two purchases by one owner of one contract
    /// at the same instant collide.
    pub fn format_id(owner: &str, contract_name: &str, at: DateTime<Utc>) -> String {
        format!(
            "{}:{}",
            Self::format_name(owner, contract_name),
            at.to_rfc3339_opts(SecondsFormat::Micros, true)
        )
    }

    pub fn format_name(owner: &str, contract_name: &str) -> String {
        format!("{owner}:{contract_name}")
    }

    #[inline]
    pub fn name(&self) -> String {
        Self::format_name(&self.owner, &self.contract_name)
    }

    /// Purchase price times amount.
    #[inline]
    pub fn cost(&self) -> f64 {
        self.purchase_price * self.amount as f64
    }
}
