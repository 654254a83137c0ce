//! Multi-leg option strategies.
//! Each leg evaluates its own payoff over a shared price sweep; the strategy
//! curve is the elementwise sum. Break-even prices are closed-form, derived
//! from leg costs, strikes and premiums rather than read off the curve.

pub mod composer;
pub mod position;

pub use composer::{
    default_price_range, evaluate_named, BearPutSpread, BullCallSpread, CallButterflySpread, CoveredCall,
    LegSummary, LongStraddle, LongStrangle, MarriedPut, ProtectiveCollar, StrategyResult, MAX_SWEEP_POINTS,
};
pub use position::{Asset, OptionPosition, Position, ProfitCache, Side, StockAsset};
