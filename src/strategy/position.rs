use crate::errors::{require_positive, EngineError, EngineResult};
use crate::ledger::contract::{parse_date, CONTRACT_MULTIPLIER};
use crate::models::{format_decimal, OptionType};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Scenario prices are cached at micro-unit precision.
const PRICE_KEY_SCALE: f64 = 1e6;

/// Per-position memo of scenario price -> profit.
/// Keys are prices in micro-units, so prices that round to the same micro-unit
/// share an entry. Iteration is in ascending price order.
#[derive(Debug, Clone, Default)]
pub struct ProfitCache {
    by_price: BTreeMap<i64, (f64, f64)>,
}

impl ProfitCache {
    #[inline]
    fn key(price: f64) -> i64 {
        (price * PRICE_KEY_SCALE).round() as i64
    }

    pub fn get(&self, price: f64) -> Option<f64> {
        self.by_price.get(&Self::key(price)).map(|&(_, profit)| profit)
    }

    pub fn contains(&self, price: f64) -> bool {
        self.by_price.contains_key(&Self::key(price))
    }

    pub fn insert(&mut self, price: f64, profit: f64) {
        self.by_price.entry(Self::key(price)).or_insert((price, profit));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.by_price.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_price.is_empty()
    }

    pub fn ordered_prices(&self) -> Vec<f64> {
        self.by_price.values().map(|&(price, _)| price).collect()
    }

    pub fn ordered_profits(&self) -> Vec<f64> {
        self.by_price.values().map(|&(_, profit)| profit).collect()
    }
}

/// A priced position that can be evaluated across scenario prices.
pub trait Position {
    fn name(&self) -> String;
    fn id_string(&self) -> String;
    fn cost(&self) -> f64;
    fn break_even_price(&self) -> f64;

    /// Profit at expiry if the underlying closes at `price`. Pure.
    fn profit(&self, price: f64) -> f64;

    fn cache(&self) -> &ProfitCache;
    fn cache_mut(&mut self) -> &mut ProfitCache;

    /// Cached profit, or a fresh evaluation that is not stored.
    fn get_profit(&self, price: f64) -> f64 {
        self.cache().get(price).unwrap_or_else(|| self.profit(price))
    }

    /// Evaluate every sweep price not yet cached, then return the curve over
    /// all cached prices in ascending order.
    fn profit_loss(&mut self, sweep: &[f64]) -> Vec<f64> {
        for &price in sweep {
            if !self.cache().contains(price) {
                let profit = self.profit(price);
                self.cache_mut().insert(price, profit);
            }
        }
        self.cache().ordered_profits()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(EngineError::InvalidParameter(format!(
                "subtype({other}) must be either BUY or SELL"
            ))),
        }
    }
}

/// Shares held at a cost basis.
#[derive(Debug, Clone)]
pub struct StockAsset {
    pub symbol: String,
    pub price: f64,
    pub shares: u64,
    profits: ProfitCache,
}

impl StockAsset {
    /// Non-positive share counts coerce to one share.
    pub fn new(symbol: &str, price: f64, shares: i64) -> EngineResult<Self> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(EngineError::InvalidParameter("stock symbol is required".into()));
        }
        Ok(Self {
            symbol: symbol.to_ascii_uppercase(),
            price: require_positive("price", price)?,
            shares: if shares > 0 { shares as u64 } else { 1 },
            profits: ProfitCache::default(),
        })
    }

    /// `symbol|price[|shares]`.
    pub fn from_shorthand(s: &str) -> EngineResult<Self> {
        let fields = split_fields(s);
        let (symbol, price) = match fields.as_slice() {
            [symbol, price, ..] => (*symbol, parse_f64(price)?),
            _ => {
                return Err(EngineError::Parse(format!(
                    "expected symbol|price[|shares], got {s}"
                )))
            }
        };
        let shares = fields.get(2).map(|v| parse_count(v)).transpose()?.unwrap_or(0);
        Self::new(symbol, price, shares)
    }
}

impl Position for StockAsset {
    fn name(&self) -> String {
        format!("{} {} SHARES", self.symbol, self.shares)
    }

    fn id_string(&self) -> String {
        format!("STOCK|{}|{}|{}", self.symbol, format_decimal(self.price), self.shares)
    }

    #[inline]
    fn cost(&self) -> f64 {
        self.price * self.shares as f64
    }

    #[inline]
    fn break_even_price(&self) -> f64 {
        self.price
    }

    #[inline]
    fn profit(&self, price: f64) -> f64 {
        (price - self.price) * self.shares as f64
    }

    fn cache(&self) -> &ProfitCache {
        &self.profits
    }

    fn cache_mut(&mut self) -> &mut ProfitCache {
        &mut self.profits
    }
}

/// A bought or written option leg. `fees` is a flat amount per leg.
#[derive(Debug, Clone)]
pub struct OptionPosition {
    pub symbol: Option<String>,
    pub option_type: OptionType,
    pub side: Side,
    pub strike: f64,
    /// Premium per share.
    pub price: f64,
    pub amount: u64,
    pub expiration: NaiveDate,
    pub fees: f64,
    profits: ProfitCache,
}

impl OptionPosition {
    /// Non-positive amounts coerce to one contract; expiration defaults to today.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Option<&str>,
        option_type: OptionType,
        side: Side,
        strike: f64,
        price: f64,
        amount: i64,
        expiration: Option<NaiveDate>,
        fees: f64,
    ) -> EngineResult<Self> {
        if !fees.is_finite() || fees < 0.0 {
            return Err(EngineError::InvalidParameter(format!("fees({fees}) must be >= 0")));
        }
        Ok(Self {
            symbol: symbol
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_ascii_uppercase),
            option_type,
            side,
            strike: require_positive("strike", strike)?,
            price: require_positive("price", price)?,
            amount: if amount > 0 { amount as u64 } else { 1 },
            expiration: expiration.unwrap_or_else(|| chrono::Local::now().date_naive()),
            fees,
            profits: ProfitCache::default(),
        })
    }

    /// `symbol|strike|price[|amount[|expiration]]` for the given leg kind.
    pub fn from_shorthand(option_type: OptionType, side: Side, s: &str, fees: f64) -> EngineResult<Self> {
        let fields = split_fields(s);
        let (symbol, strike, price) = match fields.as_slice() {
            [symbol, strike, price, ..] => (*symbol, parse_f64(strike)?, parse_f64(price)?),
            _ => {
                return Err(EngineError::Parse(format!(
                    "expected symbol|strike|price[|amount[|expiration]], got {s}"
                )))
            }
        };
        let amount = fields.get(3).map(|v| parse_count(v)).transpose()?.unwrap_or(1);
        let expiration = match fields.get(4) {
            Some(d) if !d.is_empty() => Some(parse_date(d)?),
            _ => None,
        };
        Self::new(Some(symbol), option_type, side, strike, price, amount, expiration, fees)
    }

    pub fn buy_call(s: &str, fees: f64) -> EngineResult<Self> {
        Self::from_shorthand(OptionType::Call, Side::Buy, s, fees)
    }

    pub fn sell_call(s: &str, fees: f64) -> EngineResult<Self> {
        Self::from_shorthand(OptionType::Call, Side::Sell, s, fees)
    }

    pub fn buy_put(s: &str, fees: f64) -> EngineResult<Self> {
        Self::from_shorthand(OptionType::Put, Side::Buy, s, fees)
    }

    pub fn sell_put(s: &str, fees: f64) -> EngineResult<Self> {
        Self::from_shorthand(OptionType::Put, Side::Sell, s, fees)
    }

    pub fn with_fees(mut self, fees: f64) -> Self {
        self.fees = fees.max(0.0);
        self.profits = ProfitCache::default();
        self
    }

    #[inline]
    pub fn shares_amount(&self) -> f64 {
        self.amount as f64 * CONTRACT_MULTIPLIER
    }

    #[inline]
    pub fn premium(&self) -> f64 {
        self.price * self.shares_amount()
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
}

impl Position for OptionPosition {
    fn name(&self) -> String {
        format!(
            "{} {} {}",
            self.symbol.as_deref().unwrap_or("-"),
            self.side,
            self.option_type
        )
    }

    fn id_string(&self) -> String {
        format!(
            "OPTIONS|{}|{}|{}|{}|{}|{}|{}",
            self.symbol.as_deref().unwrap_or(""),
            self.option_type,
            self.side,
            format_decimal(self.strike),
            format_decimal(self.price),
            self.amount,
            self.expiration.format("%Y-%m-%d")
        )
    }

    /// Buyers pay premium plus fees; writers pay only fees.
    #[inline]
    fn cost(&self) -> f64 {
        match self.side {
            Side::Buy => self.premium() + self.fees,
            Side::Sell => self.fees,
        }
    }

    #[inline]
    fn break_even_price(&self) -> f64 {
        match self.option_type {
            OptionType::Call => self.strike + self.price + self.fees / CONTRACT_MULTIPLIER,
            OptionType::Put => self.strike - self.price - self.fees / CONTRACT_MULTIPLIER,
        }
    }

    fn profit(&self, price: f64) -> f64 {
        let shares = self.shares_amount();
        match (self.option_type, self.side) {
            (OptionType::Call, Side::Buy) if price > self.strike => (price - self.strike) * shares - self.cost(),
            (OptionType::Call, Side::Buy) => -self.cost(),
            (OptionType::Call, Side::Sell) if price > self.strike => {
                self.premium() - self.cost() - (price - self.strike) * shares
            }
            (OptionType::Call, Side::Sell) => self.premium() - self.cost(),
            (OptionType::Put, Side::Buy) if price < self.strike => (self.strike - price) * shares - self.cost(),
            (OptionType::Put, Side::Buy) => -self.cost(),
            (OptionType::Put, Side::Sell) if price < self.strike => {
                self.premium() - self.cost() - (self.strike - price) * shares
            }
            (OptionType::Put, Side::Sell) => self.premium() - self.cost(),
        }
    }

    fn cache(&self) -> &ProfitCache {
        &self.profits
    }

    fn cache_mut(&mut self) -> &mut ProfitCache {
        &mut self.profits
    }
}

/// Any position parsed from an id string.
#[derive(Debug, Clone)]
pub enum Asset {
    Stock(StockAsset),
    Option(OptionPosition),
}

impl Asset {
    pub fn as_position(&self) -> &dyn Position {
        match self {
            Asset::Stock(s) => s,
            Asset::Option(o) => o,
        }
    }
}

/// `[FINANCIAL|]STOCK|symbol|price|shares` or
/// `[DERIVATIVE|]OPTIONS|symbol|type|subtype|strike|price|amount|expiration`.
/// Option fees start at zero; see `OptionPosition::with_fees`.
impl FromStr for Asset {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        let mut fields = split_fields(s);
        if matches!(
            fields.first().map(|f| f.to_ascii_uppercase()).as_deref(),
            Some("FINANCIAL" | "DERIVATIVE" | "DERIVITIVE" | "PHYSICAL")
        ) {
            fields.remove(0);
        }
        let kind = fields.first().map(|f| f.to_ascii_uppercase()).unwrap_or_default();
        match (kind.as_str(), &fields[..]) {
            ("STOCK", [_, symbol, price, rest @ ..]) => {
                let shares = rest.first().map(|v| parse_count(v)).transpose()?.unwrap_or(0);
                Ok(Asset::Stock(StockAsset::new(symbol, parse_f64(price)?, shares)?))
            }
            ("OPTIONS", [_, symbol, typ, subtype, strike, price, rest @ ..]) => {
                let amount = rest.first().map(|v| parse_count(v)).transpose()?.unwrap_or(1);
                let expiration = match rest.get(1) {
                    Some(d) if !d.is_empty() => Some(parse_date(d)?),
                    _ => None,
                };
                Ok(Asset::Option(OptionPosition::new(
                    Some(symbol),
                    typ.parse()?,
                    subtype.parse()?,
                    parse_f64(strike)?,
                    parse_f64(price)?,
                    amount,
                    expiration,
                    0.0,
                )?))
            }
            _ => Err(EngineError::Parse(format!(
                "not found, string not in the correct format: {s}"
            ))),
        }
    }
}

fn split_fields(s: &str) -> Vec<&str> {
    s.split('|').map(str::trim).collect()
}

fn parse_f64(s: &str) -> EngineResult<f64> {
    Ok(s.trim().parse::<f64>()?)
}

/// Counts may arrive as "2" or "2.0".
fn parse_count(s: &str) -> EngineResult<i64> {
    let s = s.trim();
    match s.parse::<i64>() {
        Ok(n) => Ok(n),
        Err(_) => Ok(s.parse::<f64>()? as i64),
    }
}
