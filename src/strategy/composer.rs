use crate::errors::{require_positive, EngineError, EngineResult};
use crate::ledger::contract::CONTRACT_MULTIPLIER;
use crate::models::scenarios::SummaryStats;
use crate::models::OptionType;
use crate::strategy::position::{OptionPosition, Position, Side, StockAsset};
use smallvec::SmallVec;

/// Strike offset used when a spread leg's strike is omitted.
pub const DEFAULT_SPREAD_PERCENT: f64 = 0.1;

/// One evaluated leg of a strategy.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LegSummary {
    pub role: &'static str,
    pub name: String,
    pub id_string: String,
    pub cost: f64,
    pub break_even_price: f64,
    pub profit_loss: Vec<f64>,
}

/// Result of evaluating a strategy over a price sweep. `profit_loss[i]` is the
/// summed leg profit at `price_range[i]`; prices ascend without repeats.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StrategyResult {
    pub strategy: &'static str,
    pub legs: SmallVec<[LegSummary; 3]>,
    pub profit_loss: Vec<f64>,
    pub price_range: Vec<f64>,
    pub break_even_prices: SmallVec<[f64; 2]>,
    pub curve_stats: Option<SummaryStats>,
}

/// Upper bound on sweep length, default or caller-supplied.
pub const MAX_SWEEP_POINTS: usize = 100_000;

#[inline]
fn default_sweep_len(current_price: f64) -> f64 {
    ((current_price + 1.0).floor() * 2.0).max(0.0)
}

/// Integer sweep 0, 1, ..., 2*floor(current + 1) - 1.
pub fn default_price_range(current_price: f64) -> Vec<f64> {
    let upper = default_sweep_len(current_price) as u64;
    (0..upper).map(|p| p as f64).collect()
}

/// Collects legs and sums their curves.
struct Composer {
    strategy: &'static str,
    sweep: Vec<f64>,
    legs: SmallVec<[LegSummary; 3]>,
    total: Vec<f64>,
    prices: Vec<f64>,
}

impl Composer {
    fn new(strategy: &'static str, current_price: f64, price_range: &[f64]) -> EngineResult<Self> {
        let current_price = require_positive("current price", current_price)?;
        let sweep = if price_range.is_empty() {
            let points = default_sweep_len(current_price);
            if points > MAX_SWEEP_POINTS as f64 {
                return Err(EngineError::InvalidParameter(format!(
                    "default price range for current price {current_price} has {points} points, limit is {MAX_SWEEP_POINTS}"
                )));
            }
            default_price_range(current_price)
        } else {
            if price_range.len() > MAX_SWEEP_POINTS {
                return Err(EngineError::InvalidParameter(format!(
                    "price range has {} points, limit is {MAX_SWEEP_POINTS}",
                    price_range.len()
                )));
            }
            if let Some(bad) = price_range.iter().find(|p| !p.is_finite()) {
                return Err(EngineError::InvalidParameter(format!(
                    "price range value ({bad}) must be finite"
                )));
            }
            price_range.to_vec()
        };
        Ok(Self {
            strategy,
            sweep,
            legs: SmallVec::new(),
            total: Vec::new(),
            prices: Vec::new(),
        })
    }

    fn add<P: Position>(&mut self, role: &'static str, leg: &mut P) {
        let curve = leg.profit_loss(&self.sweep);
        if self.total.is_empty() {
            self.total = curve.clone();
            self.prices = leg.cache().ordered_prices();
        } else {
            for (t, p) in self.total.iter_mut().zip(&curve) {
                *t += p;
            }
        }
        self.legs.push(LegSummary {
            role,
            name: leg.name(),
            id_string: leg.id_string(),
            cost: leg.cost(),
            break_even_price: leg.break_even_price(),
            profit_loss: curve,
        });
    }

    fn finish(self, break_even_prices: SmallVec<[f64; 2]>) -> StrategyResult {
        tracing::debug!(
            strategy = self.strategy,
            legs = self.legs.len(),
            points = self.total.len(),
            break_evens = ?break_even_prices.as_slice(),
            "strategy evaluated"
        );
        StrategyResult {
            strategy: self.strategy,
            curve_stats: SummaryStats::from_sample(&self.total),
            legs: self.legs,
            profit_loss: self.total,
            price_range: self.prices,
            break_even_prices,
        }
    }
}

fn default_amount() -> i64 {
    1
}

fn default_atm_amount() -> i64 {
    2
}

fn default_spread_percent() -> f64 {
    DEFAULT_SPREAD_PERCENT
}

/// Non-positive contract counts coerce to one.
#[inline]
fn contracts(amount: i64) -> i64 {
    if amount > 0 {
        amount
    } else {
        1
    }
}

/// Explicit strike when positive, else current price moved by the spread.
#[inline]
fn strike_or(strike: Option<f64>, current_price: f64, offset: f64) -> f64 {
    strike
        .filter(|s| *s > 0.0)
        .unwrap_or(current_price + current_price * offset)
}

#[inline]
fn shares_equivalent(leg: &OptionPosition) -> f64 {
    leg.amount as f64 * CONTRACT_MULTIPLIER
}

#[allow(clippy::too_many_arguments)]
fn leg(
    stock: &str,
    option_type: OptionType,
    side: Side,
    strike: f64,
    price: f64,
    amount: i64,
    fees: f64,
) -> EngineResult<OptionPosition> {
    OptionPosition::new(Some(stock), option_type, side, strike, price, amount, None, fees)
}

/// Long stock plus a written call.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CoveredCall {
    pub stock: String,
    pub current_price: f64,
    pub strike: f64,
    pub call_price: f64,
    #[serde(default = "default_amount")]
    pub amount: i64,
    /// Defaults to amount * 100.
    #[serde(default)]
    pub shares: i64,
    #[serde(default)]
    pub price_range: Vec<f64>,
}

impl CoveredCall {
    pub fn evaluate(&self, fees: f64) -> EngineResult<StrategyResult> {
        let mut c = Composer::new("covered_call", self.current_price, &self.price_range)?;
        let amount = contracts(self.amount);
        let shares = if self.shares > 0 { self.shares } else { amount * 100 };

        let mut stock = StockAsset::new(&self.stock, self.current_price, shares)?;
        let mut sell_call = leg(&self.stock, OptionType::Call, Side::Sell, self.strike, self.call_price, amount, fees)?;
        c.add("stock", &mut stock);
        c.add("sell_call", &mut sell_call);

        let held = stock.shares as f64;
        // Left of the strike: stock cost basis less premium collected.
        let mut bep: SmallVec<[f64; 2]> = smallvec::smallvec![stock.price - sell_call.premium() / held];
        let a = shares_equivalent(&sell_call);
        if held < a {
            bep.push((stock.price * held - a * sell_call.strike - sell_call.premium()) / (held - a));
        }
        Ok(c.finish(bep))
    }
}

/// Long stock plus a bought put.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MarriedPut {
    pub stock: String,
    pub current_price: f64,
    pub strike: f64,
    pub put_price: f64,
    #[serde(default = "default_amount")]
    pub amount: i64,
    #[serde(default)]
    pub shares: i64,
    #[serde(default)]
    pub price_range: Vec<f64>,
}

impl MarriedPut {
    pub fn evaluate(&self, fees: f64) -> EngineResult<StrategyResult> {
        let mut c = Composer::new("married_put", self.current_price, &self.price_range)?;
        let amount = contracts(self.amount);
        let shares = if self.shares > 0 { self.shares } else { amount * 100 };

        let mut stock = StockAsset::new(&self.stock, self.current_price, shares)?;
        let mut buy_put = leg(&self.stock, OptionType::Put, Side::Buy, self.strike, self.put_price, amount, fees)?;
        c.add("stock", &mut stock);
        c.add("buy_put", &mut buy_put);

        let held = stock.shares as f64;
        let mut bep: SmallVec<[f64; 2]> =
            smallvec::smallvec![stock.price + (buy_put.premium() + buy_put.fees) / held];
        let a = shares_equivalent(&buy_put);
        if held < a {
            bep.push((buy_put.fees + buy_put.premium() + stock.price * held - a * buy_put.strike) / (held - a));
        }
        Ok(c.finish(bep))
    }
}

/// Buy a low-strike call, write a high-strike call.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BullCallSpread {
    pub stock: String,
    pub current_price: f64,
    pub buy_call_price: f64,
    pub sell_call_price: f64,
    #[serde(default)]
    pub low_strike: Option<f64>,
    #[serde(default)]
    pub high_strike: Option<f64>,
    #[serde(default = "default_amount")]
    pub buy_amount: i64,
    #[serde(default = "default_amount")]
    pub sell_amount: i64,
    #[serde(default = "default_spread_percent")]
    pub spread_percent: f64,
    #[serde(default)]
    pub price_range: Vec<f64>,
}

impl BullCallSpread {
    pub fn evaluate(&self, fees: f64) -> EngineResult<StrategyResult> {
        let mut c = Composer::new("bull_call_spread", self.current_price, &self.price_range)?;
        let low = strike_or(self.low_strike, self.current_price, -self.spread_percent);
        let high = strike_or(self.high_strike, self.current_price, self.spread_percent);

        let mut buy_call = leg(&self.stock, OptionType::Call, Side::Buy, low, self.buy_call_price, self.buy_amount, fees)?;
        let mut sell_call = leg(&self.stock, OptionType::Call, Side::Sell, high, self.sell_call_price, self.sell_amount, fees)?;
        c.add("buy_call", &mut buy_call);
        c.add("sell_call", &mut sell_call);

        let a = shares_equivalent(&buy_call);
        let be = (a * buy_call.strike + buy_call.premium() + buy_call.fees - sell_call.premium()) / a;
        Ok(c.finish(smallvec::smallvec![be]))
    }
}

/// Write a low-strike put, buy a high-strike put.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BearPutSpread {
    pub stock: String,
    pub current_price: f64,
    pub buy_put_price: f64,
    pub sell_put_price: f64,
    #[serde(default)]
    pub low_strike: Option<f64>,
    #[serde(default)]
    pub high_strike: Option<f64>,
    #[serde(default = "default_amount")]
    pub buy_amount: i64,
    #[serde(default = "default_amount")]
    pub sell_amount: i64,
    #[serde(default = "default_spread_percent")]
    pub spread_percent: f64,
    #[serde(default)]
    pub price_range: Vec<f64>,
}

impl BearPutSpread {
    pub fn evaluate(&self, fees: f64) -> EngineResult<StrategyResult> {
        let mut c = Composer::new("bear_put_spread", self.current_price, &self.price_range)?;
        let low = strike_or(self.low_strike, self.current_price, -self.spread_percent);
        let high = strike_or(self.high_strike, self.current_price, self.spread_percent);

        let mut buy_put = leg(&self.stock, OptionType::Put, Side::Buy, high, self.buy_put_price, self.buy_amount, fees)?;
        let mut sell_put = leg(&self.stock, OptionType::Put, Side::Sell, low, self.sell_put_price, self.sell_amount, fees)?;
        c.add("buy_put", &mut buy_put);
        c.add("sell_put", &mut sell_put);

        let a = shares_equivalent(&buy_put);
        let be = (sell_put.premium() + a * buy_put.strike - buy_put.premium() - buy_put.fees) / a;
        Ok(c.finish(smallvec::smallvec![be]))
    }
}

/// Long stock, bought OTM put, written OTM call.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProtectiveCollar {
    pub stock: String,
    pub current_price: f64,
    pub buy_put_price: f64,
    pub sell_call_price: f64,
    #[serde(default)]
    pub put_otm_strike: Option<f64>,
    #[serde(default)]
    pub call_otm_strike: Option<f64>,
    #[serde(default = "default_amount")]
    pub buy_amount: i64,
    #[serde(default = "default_amount")]
    pub sell_amount: i64,
    #[serde(default = "default_spread_percent")]
    pub spread_percent: f64,
    /// Defaults to sell_amount * 100.
    #[serde(default)]
    pub shares: i64,
    #[serde(default)]
    pub price_range: Vec<f64>,
}

impl ProtectiveCollar {
    pub fn evaluate(&self, fees: f64) -> EngineResult<StrategyResult> {
        let mut c = Composer::new("protective_collar", self.current_price, &self.price_range)?;
        let put_strike = strike_or(self.put_otm_strike, self.current_price, -self.spread_percent);
        let call_strike = strike_or(self.call_otm_strike, self.current_price, self.spread_percent);
        let shares = if self.shares > 0 { self.shares } else { contracts(self.sell_amount) * 100 };

        let mut stock = StockAsset::new(&self.stock, self.current_price, shares)?;
        let mut buy_put = leg(&self.stock, OptionType::Put, Side::Buy, put_strike, self.buy_put_price, self.buy_amount, fees)?;
        let mut sell_call =
            leg(&self.stock, OptionType::Call, Side::Sell, call_strike, self.sell_call_price, self.sell_amount, fees)?;
        c.add("stock", &mut stock);
        c.add("buy_put", &mut buy_put);
        c.add("sell_call", &mut sell_call);

        let held = stock.shares as f64;
        let net_premium = buy_put.premium() + buy_put.fees - sell_call.premium();
        let mut bep: SmallVec<[f64; 2]> = smallvec::smallvec![net_premium / held + stock.price];

        let a = shares_equivalent(&buy_put);
        if held < a {
            bep.push((net_premium - a * buy_put.strike + stock.price * held) / (held - a));
        }
        let a = shares_equivalent(&sell_call);
        if held < a {
            bep.push((net_premium - a * sell_call.strike + stock.price * held) / (held - a));
        }
        Ok(c.finish(bep))
    }
}

/// Bought call and bought put at one strike.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LongStraddle {
    pub stock: String,
    pub current_price: f64,
    pub strike: f64,
    pub put_price: f64,
    pub call_price: f64,
    #[serde(default = "default_amount")]
    pub put_amount: i64,
    #[serde(default = "default_amount")]
    pub call_amount: i64,
    #[serde(default)]
    pub price_range: Vec<f64>,
}

impl LongStraddle {
    pub fn evaluate(&self, fees: f64) -> EngineResult<StrategyResult> {
        let mut c = Composer::new("long_straddle", self.current_price, &self.price_range)?;
        let mut buy_call = leg(&self.stock, OptionType::Call, Side::Buy, self.strike, self.call_price, self.call_amount, fees)?;
        let mut buy_put = leg(&self.stock, OptionType::Put, Side::Buy, self.strike, self.put_price, self.put_amount, fees)?;
        c.add("buy_call", &mut buy_call);
        c.add("buy_put", &mut buy_put);

        let outlay = buy_put.premium() + buy_put.fees + buy_call.premium() + buy_call.fees;
        let left = buy_put.strike - outlay / shares_equivalent(&buy_put);
        let right = outlay / shares_equivalent(&buy_call) + buy_call.strike;
        Ok(c.finish(smallvec::smallvec![left, right]))
    }
}

/// Bought OTM call and bought OTM put.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LongStrangle {
    pub stock: String,
    pub current_price: f64,
    pub put_price: f64,
    pub call_price: f64,
    #[serde(default)]
    pub put_otm_strike: Option<f64>,
    #[serde(default)]
    pub call_otm_strike: Option<f64>,
    #[serde(default = "default_amount")]
    pub put_amount: i64,
    #[serde(default = "default_amount")]
    pub call_amount: i64,
    #[serde(default = "default_spread_percent")]
    pub spread_percent: f64,
    #[serde(default)]
    pub price_range: Vec<f64>,
}

impl LongStrangle {
    pub fn evaluate(&self, fees: f64) -> EngineResult<StrategyResult> {
        let mut c = Composer::new("long_strangle", self.current_price, &self.price_range)?;
        let put_strike = strike_or(self.put_otm_strike, self.current_price, -self.spread_percent);
        let call_strike = strike_or(self.call_otm_strike, self.current_price, self.spread_percent);

        let mut buy_call = leg(&self.stock, OptionType::Call, Side::Buy, call_strike, self.call_price, self.call_amount, fees)?;
        let mut buy_put = leg(&self.stock, OptionType::Put, Side::Buy, put_strike, self.put_price, self.put_amount, fees)?;
        c.add("buy_call", &mut buy_call);
        c.add("buy_put", &mut buy_put);

        let adjusted_fees = buy_put.fees / CONTRACT_MULTIPLIER;
        let call_be = buy_call.break_even_price() + buy_put.price + adjusted_fees;
        let put_be = buy_put.break_even_price() - buy_call.price - adjusted_fees;
        Ok(c.finish(smallvec::smallvec![call_be, put_be]))
    }
}

/// Bought ITM and OTM calls around written ATM calls at the current price.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CallButterflySpread {
    pub stock: String,
    pub current_price: f64,
    pub otm_price: f64,
    pub itm_price: f64,
    pub atm_price: f64,
    #[serde(default)]
    pub itm_strike: Option<f64>,
    #[serde(default)]
    pub otm_strike: Option<f64>,
    #[serde(default = "default_amount")]
    pub itm_amount: i64,
    #[serde(default = "default_amount")]
    pub otm_amount: i64,
    #[serde(default = "default_atm_amount")]
    pub atm_amount: i64,
    #[serde(default = "default_spread_percent")]
    pub spread_percent: f64,
    #[serde(default)]
    pub price_range: Vec<f64>,
}

impl CallButterflySpread {
    pub fn evaluate(&self, fees: f64) -> EngineResult<StrategyResult> {
        let mut c = Composer::new("call_butterfly_spread", self.current_price, &self.price_range)?;
        let itm_strike = strike_or(self.itm_strike, self.current_price, -self.spread_percent);
        let otm_strike = strike_or(self.otm_strike, self.current_price, self.spread_percent);

        let mut buy_itm = leg(&self.stock, OptionType::Call, Side::Buy, itm_strike, self.itm_price, self.itm_amount, fees)?;
        let mut sell_atm =
            leg(&self.stock, OptionType::Call, Side::Sell, self.current_price, self.atm_price, self.atm_amount, fees)?;
        let mut buy_otm = leg(&self.stock, OptionType::Call, Side::Buy, otm_strike, self.otm_price, self.otm_amount, fees)?;
        c.add("buy_itm", &mut buy_itm);
        c.add("sell_atm", &mut sell_atm);
        c.add("buy_otm", &mut buy_otm);

        let a_itm = shares_equivalent(&buy_itm);
        let a_atm = shares_equivalent(&sell_atm);
        let outlay = buy_itm.cost() + buy_otm.cost();
        let mut bep: SmallVec<[f64; 2]> = smallvec::smallvec![buy_itm.strike + (outlay - sell_atm.premium()) / a_itm];
        if a_atm != a_itm {
            bep.push(
                (a_itm * buy_itm.strike - sell_atm.premium() - a_atm * sell_atm.strike + outlay) / (a_itm - a_atm),
            );
        }
        Ok(c.finish(bep))
    }
}

/// Evaluate a strategy by name from a JSON parameter object.
pub fn evaluate_named(name: &str, params: serde_json::Value, fees: f64) -> EngineResult<StrategyResult> {
    let key = name.trim().to_ascii_lowercase().replace('-', "_");
    match key.as_str() {
        "covered_call" => serde_json::from_value::<CoveredCall>(params)?.evaluate(fees),
        "married_put" => serde_json::from_value::<MarriedPut>(params)?.evaluate(fees),
        "bull_call_spread" => serde_json::from_value::<BullCallSpread>(params)?.evaluate(fees),
        "bear_put_spread" => serde_json::from_value::<BearPutSpread>(params)?.evaluate(fees),
        "protective_collar" => serde_json::from_value::<ProtectiveCollar>(params)?.evaluate(fees),
        "long_straddle" => serde_json::from_value::<LongStraddle>(params)?.evaluate(fees),
        "long_strangle" => serde_json::from_value::<LongStrangle>(params)?.evaluate(fees),
        "call_butterfly_spread" => serde_json::from_value::<CallButterflySpread>(params)?.evaluate(fees),
        _ => Err(EngineError::InvalidParameter(format!("unknown strategy: {name}"))),
    }
}
