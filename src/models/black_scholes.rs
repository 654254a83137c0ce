//! Black-Scholes-Merton pricing on daily volatility.
//!
//! d1 = ln(S/K) + (r/365 + sigma_d^2/2) * days
//! sigma_dur = sigma_d * sqrt(days)
//!
//! CALL: delta = Phi(d1/sigma_dur), P(ITM) = Phi(d1/sigma_dur - sigma_dur)
//!       price = S*delta - K*exp(-r*days/365)*P(ITM)
//! PUT mirrors the signs.
//!
//! Volatilities are daily unless named `duration_vol`. Rates are annual.

use crate::models::normal::std_normal_cdf;
use crate::models::{ItmModel, ItmParams, OptionType};

/// Precomputed pricing inputs (stack, no alloc).
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ModelParams {
    pub spot: f64,
    pub strike: f64,
    pub day_vol: f64,
    pub days: f64,
    pub risk_free_rate: f64,
    // Precomputed
    pub d1: f64,
    pub duration_vol: f64,
    pub discount: f64,
}

impl ModelParams {
    #[inline]
    pub fn new(spot: f64, strike: f64, day_vol: f64, days: f64, risk_free_rate: f64) -> Self {
        let d1 = (spot / strike).ln() + (risk_free_rate / 365.0 + day_vol * day_vol / 2.0) * days;
        let duration_vol = duration_volatility(day_vol, days);
        let discount = (-risk_free_rate * days / 365.0).exp();
        Self {
            spot,
            strike,
            day_vol,
            days,
            risk_free_rate,
            d1,
            duration_vol,
            discount,
        }
    }
}

/// Kernel price output.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct OptionPrice {
    pub price: f64,
    pub delta: f64,
    pub duration_vol: f64,
    pub prob_itm: f64,
}

/// Price an option with BSM on daily volatility. Pure function.
/// Zero duration volatility (zero vol or zero days) yields delta = P(ITM) = 0.
#[inline]
pub fn price(
    option_type: OptionType,
    spot: f64,
    strike: f64,
    day_vol: f64,
    days: f64,
    risk_free_rate: f64,
) -> OptionPrice {
    price_params(option_type, &ModelParams::new(spot, strike, day_vol, days, risk_free_rate))
}

#[inline]
pub fn price_params(option_type: OptionType, p: &ModelParams) -> OptionPrice {
    let dv = p.duration_vol;
    let (delta, prob_itm) = if dv > 0.0 {
        match option_type {
            OptionType::Call => (std_normal_cdf(p.d1 / dv), std_normal_cdf(p.d1 / dv - dv)),
            OptionType::Put => (std_normal_cdf(-p.d1 / dv), std_normal_cdf(-(p.d1 / dv - dv))),
        }
    } else {
        (0.0, 0.0)
    };

    let price = match option_type {
        OptionType::Call => p.spot * delta - p.strike * p.discount * prob_itm,
        OptionType::Put => -(p.spot * delta) + p.strike * p.discount * prob_itm,
    };

    OptionPrice {
        price,
        delta,
        duration_vol: dv,
        prob_itm,
    }
}

/// Daily volatility scaled to the holding period.
#[inline]
pub fn duration_volatility(day_vol: f64, days: f64) -> f64 {
    day_vol * days.sqrt()
}

/// Drift multiplier exp(alpha * t).
#[inline]
pub fn drift(alpha: f64, time: f64) -> f64 {
    (alpha * time).exp()
}

/// Discount factor for `time` days at an annual rate.
#[inline]
pub fn discount(risk_free_rate: f64, time: f64) -> f64 {
    (-(risk_free_rate / 365.0) * time).exp()
}

/// Rate adjustment term used by delta and rate-aware P(ITM): (r/365)*sqrt(t)/sigma.
#[inline]
pub fn discount_rfrate(risk_free_rate: f64, sigma: f64, time: f64) -> f64 {
    ((risk_free_rate / 365.0) * time.sqrt()) / sigma
}

/// Half-variance Ito adjustment to drift.
#[inline]
pub fn ito_half_var(sigma: f64, days: f64) -> f64 {
    sigma * sigma * days / 2.0
}

/// One-day expected-mean multiplier for log-distributed prices.
#[inline]
pub fn ln_mean_shift(sigma: f64) -> f64 {
    (-(sigma * sigma / 2.0)).exp()
}

/// Peg a price inside the bid/ask spread, rounded to cents (ties to even).
/// `spread_fraction` in [0, 1] is added to the bid.
#[inline]
pub fn peg(bid: f64, ask: f64, spread_fraction: f64) -> f64 {
    let raw = bid + (ask - bid) * spread_fraction;
    round_half_even(raw * 100.0) / 100.0
}

fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
        r - x.signum()
    } else {
        r
    }
}

/// Standardized log-spread of the strike against the drifted spot.
#[inline]
fn normalized_log_spread(spot: f64, strike: f64, duration_vol: f64, alpha: f64, days: f64) -> f64 {
    let drifted_spot = spot * drift(alpha, days);
    (strike / drifted_spot).ln() / duration_vol
}

/// Upper or lower tail of the adjusted spread. Zero duration volatility
/// yields 0, the same convention as `price`.
#[inline]
fn tail(option_type: OptionType, dv: f64, adj: f64) -> f64 {
    if dv <= 0.0 {
        return 0.0;
    }
    match option_type {
        OptionType::Call => 1.0 - std_normal_cdf(adj),
        OptionType::Put => std_normal_cdf(adj),
    }
}

/// Drift- and rate-adjusted delta estimator.
/// Uses the drifted forward spot, not the BSM d1 term, so it differs from
/// `price().delta`.
#[inline]
pub fn delta(
    option_type: OptionType,
    spot: f64,
    strike: f64,
    day_vol: f64,
    alpha: f64,
    risk_free_rate: f64,
    days: f64,
) -> f64 {
    let dv = duration_volatility(day_vol, days);
    let adj = normalized_log_spread(spot, strike, dv, alpha, days)
        - dv / 2.0
        - discount_rfrate(risk_free_rate, day_vol, days);
    tail(option_type, dv, adj)
}

/// P(ITM at expiry) with drift and the half-variance Ito adjustment.
/// Ignores the risk-free rate; the single-day models depend on that.
#[inline]
pub fn probability_itm(
    option_type: OptionType,
    spot: f64,
    strike: f64,
    day_vol: f64,
    alpha: f64,
    days: f64,
) -> f64 {
    let dv = duration_volatility(day_vol, days);
    let adj = normalized_log_spread(spot, strike, dv, alpha, days) + dv / 2.0;
    tail(option_type, dv, adj)
}

/// P(ITM at expiry) with drift, Ito adjustment and the risk-free rate term.
/// For longer-duration trades. Not interchangeable with `probability_itm`.
#[inline]
pub fn probability_itm_rfr(
    option_type: OptionType,
    spot: f64,
    strike: f64,
    day_vol: f64,
    alpha: f64,
    risk_free_rate: f64,
    days: f64,
) -> f64 {
    let dv = duration_volatility(day_vol, days);
    let adj = normalized_log_spread(spot, strike, dv, alpha, days) + dv / 2.0
        - discount_rfrate(risk_free_rate, day_vol, days);
    tail(option_type, dv, adj)
}

/// Drift-only P(ITM) estimator.
pub struct DriftItm;

impl ItmModel for DriftItm {
    #[inline]
    fn name(&self) -> &'static str {
        "drift"
    }

    #[inline]
    fn probability(&self, option_type: OptionType, p: &ItmParams) -> f64 {
        probability_itm(option_type, p.spot, p.strike, p.day_vol, p.drift, p.days)
    }
}

/// Drift plus risk-free-rate P(ITM) estimator.
pub struct RiskFreeItm;

impl ItmModel for RiskFreeItm {
    #[inline]
    fn name(&self) -> &'static str {
        "drift-rfr"
    }

    #[inline]
    fn probability(&self, option_type: OptionType, p: &ItmParams) -> f64 {
        probability_itm_rfr(
            option_type,
            p.spot,
            p.strike,
            p.day_vol,
            p.drift,
            p.risk_free_rate,
            p.days,
        )
    }
}
