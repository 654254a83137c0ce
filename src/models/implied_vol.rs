//! Implied daily volatility by bisection (divide and conquer).
//!
//! Both solvers search daily volatility in [0, 1]. Each step prices at the
//! bracket midpoint and moves the bracket toward the target. Iteration is
//! bounded by `max_iterations`; hitting the cap or a collapsed price returns
//! the last estimate with a non-converged status instead of failing.

use crate::models::black_scholes::{self, duration_volatility, OptionPrice};
use crate::models::tranche::tranche;
use crate::models::OptionType;

/// Target band for the BSM solver (price units).
pub const BSM_PRECISION: f64 = 1e-3;
/// Target band for the tranche solver (price units).
pub const TRANCHE_PRECISION: f64 = 1e-4;
/// Bisection on [0, 1] exhausts f64 resolution well before this.
pub const DEFAULT_MAX_ITERATIONS: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    Converged,
    MaxIterationsReached,
    /// Model price fell to zero or below; the bracket cannot recover.
    PriceCollapsed,
}

impl SolverStatus {
    #[inline]
    pub fn is_converged(&self) -> bool {
        matches!(self, SolverStatus::Converged)
    }
}

/// BSM price at the implied daily volatility.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct BsmSolution {
    pub price: f64,
    pub delta: f64,
    pub duration_vol: f64,
    pub prob_itm: f64,
    pub implied_daily_vol: f64,
    pub status: SolverStatus,
    pub iterations: u32,
}

/// Tranche-model implied volatility.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct TrancheSolution {
    pub implied_daily_vol: f64,
    pub implied_duration_vol: f64,
    pub status: SolverStatus,
    pub iterations: u32,
}

/// Invert BSM price to implied daily volatility with the default iteration cap.
pub fn implied_volatility_from_price(
    option_type: OptionType,
    spot: f64,
    strike: f64,
    target_price: f64,
    days: f64,
    risk_free_rate: f64,
) -> BsmSolution {
    implied_volatility_from_price_with(
        option_type,
        spot,
        strike,
        target_price,
        days,
        risk_free_rate,
        DEFAULT_MAX_ITERATIONS,
    )
}

pub fn implied_volatility_from_price_with(
    option_type: OptionType,
    spot: f64,
    strike: f64,
    target_price: f64,
    days: f64,
    risk_free_rate: f64,
    max_iterations: u32,
) -> BsmSolution {
    let price_at = |vol: f64| black_scholes::price(option_type, spot, strike, vol, days, risk_free_rate);

    let (mut low, mut high) = (0.0_f64, 1.0_f64);
    let mut idv = (high + low) / 2.0;
    let mut quote: OptionPrice = price_at(idv);
    let mut iterations = 0_u32;
    let mut status = SolverStatus::Converged;

    while outside_band(quote.price, target_price, BSM_PRECISION) {
        if quote.price >= target_price + BSM_PRECISION {
            high = idv;
        } else {
            low = idv;
        }
        idv = (high + low) / 2.0;
        quote = price_at(idv);
        iterations += 1;

        if quote.price <= 0.0 {
            status = SolverStatus::PriceCollapsed;
            break;
        }
        if iterations >= max_iterations {
            status = SolverStatus::MaxIterationsReached;
            break;
        }
    }

    if !status.is_converged() {
        tracing::warn!(
            option_type = %option_type,
            spot,
            strike,
            target = target_price,
            last_price = quote.price,
            iterations,
            status = ?status,
            "bsm implied volatility did not converge"
        );
    }

    BsmSolution {
        price: quote.price,
        delta: quote.delta,
        duration_vol: quote.duration_vol,
        prob_itm: quote.prob_itm,
        implied_daily_vol: idv,
        status,
        iterations,
    }
}

/// Invert tranche value to implied daily and duration volatility.
pub fn implied_volatility_from_tranche(
    spot: f64,
    strike: f64,
    option_value: f64,
    days: f64,
    is_call: bool,
) -> TrancheSolution {
    implied_volatility_from_tranche_with(spot, strike, option_value, days, is_call, DEFAULT_MAX_ITERATIONS)
}

pub fn implied_volatility_from_tranche_with(
    spot: f64,
    strike: f64,
    option_value: f64,
    days: f64,
    is_call: bool,
    max_iterations: u32,
) -> TrancheSolution {
    let (mut low, mut high) = (0.0_f64, 1.0_f64);
    let mut day_sigma = (high + low) / 2.0;
    let mut dur_sigma = duration_volatility(day_sigma, days);
    let mut value = tranche(spot, strike, dur_sigma, is_call);
    let mut iterations = 0_u32;
    let mut status = SolverStatus::Converged;

    while outside_band(value, option_value, TRANCHE_PRECISION) {
        if iterations >= max_iterations {
            status = SolverStatus::MaxIterationsReached;
            break;
        }
        if value >= option_value + TRANCHE_PRECISION {
            high = day_sigma;
        } else {
            low = day_sigma;
        }
        day_sigma = (high + low) / 2.0;
        dur_sigma = duration_volatility(day_sigma, days);
        value = tranche(spot, strike, dur_sigma, is_call);
        iterations += 1;
    }

    if !status.is_converged() {
        tracing::warn!(
            spot,
            strike,
            target = option_value,
            last_value = value,
            iterations,
            "tranche implied volatility did not converge"
        );
    }

    TrancheSolution {
        implied_daily_vol: day_sigma,
        implied_duration_vol: dur_sigma,
        status,
        iterations,
    }
}

/// True while `value` sits outside the open band (target - p, target + p).
/// NaN counts as outside so a broken price still walks the bracket.
#[inline]
fn outside_band(value: f64, target: f64, precision: f64) -> bool {
    !(value > target - precision && value < target + precision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_call_reference_solution() {
        let s = implied_volatility_from_price(OptionType::Call, 101.24, 105.0, 0.565, 8.0, 0.01);
        assert!(s.status.is_converged());
        assert_abs_diff_eq!(s.implied_daily_vol, 0.01605224609375, epsilon = 1e-12);
        assert_abs_diff_eq!(s.price, 0.5641959774931493, epsilon = 1e-9);
        assert_abs_diff_eq!(s.delta, 0.2189778030455098, epsilon = 1e-9);
        assert_abs_diff_eq!(s.duration_vol, 0.04540260826466358, epsilon = 1e-12);
        assert_abs_diff_eq!(s.prob_itm, 0.2058081208560285, epsilon = 1e-9);
    }

    #[test]
    fn test_put_reference_solution() {
        let s = implied_volatility_from_price(OptionType::Put, 101.24, 98.0, 0.610, 8.0, 0.01);
        assert!(s.status.is_converged());
        assert_abs_diff_eq!(s.implied_daily_vol, 0.015899658203125, epsilon = 1e-12);
        assert_abs_diff_eq!(s.price, 0.6099021262867019, epsilon = 1e-9);
        assert_abs_diff_eq!(s.prob_itm, 0.24019851874642345, epsilon = 1e-9);
    }

    #[test]
    fn test_round_trip_recovers_vol() {
        for &(ty, spot, strike, vol, days, r) in &[
            (OptionType::Call, 101.24, 105.0, 0.016, 8.0, 0.02),
            (OptionType::Put, 101.24, 98.0, 0.021, 12.0, 0.01),
            (OptionType::Call, 50.0, 50.0, 0.03, 30.0, 0.0),
            (OptionType::Put, 200.0, 210.0, 0.012, 60.0, 0.03),
        ] {
            let target = black_scholes::price(ty, spot, strike, vol, days, r).price;
            let s = implied_volatility_from_price(ty, spot, strike, target, days, r);
            assert!(s.status.is_converged(), "{ty} {spot}/{strike} did not converge");
            assert_abs_diff_eq!(s.implied_daily_vol, vol, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_unreachable_target_is_bounded() {
        // Intrinsic value alone is ~20; a 0.5 target can never be hit, the
        // bracket collapses to zero vol and stops at the cap.
        let s = implied_volatility_from_price_with(OptionType::Call, 120.0, 100.0, 0.5, 5.0, 0.0, 64);
        assert!(!s.status.is_converged());
        assert!(s.iterations <= 64);
    }

    #[test]
    fn test_collapsed_price_stops_early() {
        // Strike so far out that Phi underflows to 0 for every vol in [0, 1].
        let s = implied_volatility_from_price(OptionType::Call, 1.0, 1_000_000.0, 0.5, 1.0, 0.0);
        assert_eq!(s.status, SolverStatus::PriceCollapsed);
        assert_eq!(s.iterations, 1);
        assert_eq!(s.price, 0.0);
    }

    #[test]
    fn test_tranche_reference_solution() {
        let s = implied_volatility_from_tranche(101.24, 105.0, 0.555, 8.0, true);
        assert!(s.status.is_converged());
        assert_abs_diff_eq!(s.implied_daily_vol, 0.015956878662109375, epsilon = 1e-12);
        assert_abs_diff_eq!(s.implied_duration_vol, 0.045132868434193854, epsilon = 1e-12);
        assert_abs_diff_eq!(
            s.implied_duration_vol,
            duration_volatility(s.implied_daily_vol, 8.0),
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_tranche_round_trip() {
        let value = tranche(101.24, 98.0, duration_volatility(0.02, 10.0), false);
        let s = implied_volatility_from_tranche(101.24, 98.0, value, 10.0, false);
        assert!(s.status.is_converged());
        assert_abs_diff_eq!(s.implied_daily_vol, 0.02, epsilon = 1e-3);
    }
}
