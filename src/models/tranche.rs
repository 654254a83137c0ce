//! Tranche integration of option value.
//!
//! The log-return distribution is cut into bins on a standard-normal grid
//! running from the strike's standardized offset ln(K/S)/sigma_dur out to
//! +5 sigma (calls) or from -5 sigma in to the offset (puts). Each bin's
//! midpoint payoff is weighted by its probability mass and summed.
//!
//! `duration_vol` is already adjusted externally (drift is applied by the caller).

use crate::models::black_scholes::{duration_volatility, ln_mean_shift};
use crate::models::normal::{linspace, std_normal_cdf};

/// Number of bin edges on the integration grid (23 bins).
pub const TRANCHE_EDGES: usize = 24;
/// Grid half-width in standard deviations.
pub const TRANCHE_SIGMA_LIMIT: f64 = 5.0;

/// Option value from tranche integration.
pub fn tranche(spot: f64, strike: f64, duration_vol: f64, is_call: bool) -> f64 {
    let sigma_spread = (strike / spot).ln() / duration_vol;
    let edges = if is_call {
        linspace(sigma_spread, TRANCHE_SIGMA_LIMIT, TRANCHE_EDGES)
    } else {
        linspace(-TRANCHE_SIGMA_LIMIT, sigma_spread, TRANCHE_EDGES)
    };
    let value = integrate_bins(&edges, spot, duration_vol, strike);
    if is_call {
        value
    } else {
        -value
    }
}

/// Full tranche value: like `tranche` but the reference price is not
/// subtracted, giving the whole stock value of the slice. `left` integrates
/// from -5 sigma to the reference, otherwise from the reference to +5 sigma.
pub fn full_tranche(spot: f64, reference: f64, duration_vol: f64, left: bool) -> f64 {
    let sigma_spread = (reference / spot).ln() / duration_vol;
    let edges = if left {
        linspace(-TRANCHE_SIGMA_LIMIT, sigma_spread, TRANCHE_EDGES)
    } else {
        linspace(sigma_spread, TRANCHE_SIGMA_LIMIT, TRANCHE_EDGES)
    };
    integrate_bins(&edges, spot, duration_vol, 0.0)
}

/// One-day time decay: the drop in tranche value when a day comes off the clock.
pub fn time_decay(
    spot: f64,
    strike: f64,
    day_vol: f64,
    option_price: f64,
    days: f64,
    is_call: bool,
) -> f64 {
    let dv = duration_volatility(day_vol, days - 1.0);
    option_price - tranche(spot, strike, dv, is_call)
}

#[inline]
fn integrate_bins(edges: &[f64], spot: f64, duration_vol: f64, offset: f64) -> f64 {
    let shift = ln_mean_shift(duration_vol);
    edges
        .windows(2)
        .map(|w| {
            let prob = std_normal_cdf(w[1]) - std_normal_cdf(w[0]);
            let mid_price = spot * (((w[1] + w[0]) / 2.0) * duration_vol).exp() * shift - offset;
            mid_price * prob
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_time_decay_reference() {
        let decay = time_decay(101.24, 105.0, 0.016, 0.555, 8.0, true);
        assert_abs_diff_eq!(decay, 0.0818037222196441, epsilon = 1e-9);
    }

    #[test]
    fn test_tranche_positive_and_monotone_in_vol() {
        let lo = tranche(101.24, 105.0, 0.03, true);
        let hi = tranche(101.24, 105.0, 0.06, true);
        assert!(lo > 0.0);
        assert!(hi > lo, "call value should grow with vol: {lo} -> {hi}");

        let put_lo = tranche(101.24, 98.0, 0.03, false);
        let put_hi = tranche(101.24, 98.0, 0.06, false);
        assert!(put_lo > 0.0);
        assert!(put_hi > put_lo);
    }

    #[test]
    fn test_tranche_close_to_bsm_for_short_dated() {
        // Zero rate: tranche and BSM integrate the same lognormal payoff.
        let bsm = crate::models::black_scholes::price(
            crate::models::OptionType::Call,
            101.24,
            105.0,
            0.016,
            8.0,
            0.0,
        );
        let tr = tranche(101.24, 105.0, bsm.duration_vol, true);
        assert_abs_diff_eq!(tr, bsm.price, epsilon = 0.02);
    }

    #[test]
    fn test_full_tranche_sides_sum_to_spot() {
        let left = full_tranche(100.0, 100.0, 0.05, true);
        let right = full_tranche(100.0, 100.0, 0.05, false);
        // Both halves together approximate E[S_T] = spot (up to grid error).
        assert_abs_diff_eq!(left + right, 100.0, epsilon = 0.5);
    }
}
