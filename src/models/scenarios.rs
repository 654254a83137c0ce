//! Scenario sweeps over spot prices and days to expiry, plus sample statistics.

use crate::models::black_scholes;
use crate::models::implied_vol::implied_volatility_from_price;
use crate::models::OptionType;
use statrs::statistics::{Data, Median, Statistics};
use std::collections::VecDeque;

/// Option inputs for scenario sweeps.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct ScenarioOption {
    pub option_type: OptionType,
    pub strike: f64,
    /// Quoted premium per share.
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ScenarioPoint {
    pub spot: f64,
    pub price: f64,
}

/// One row of a days-to-expiry matrix.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ScenarioRow {
    pub days: u32,
    pub points: Vec<ScenarioPoint>,
}

/// Centred ladder of prices around `current`, rounded to cents.
/// Steps `spread` up and down at most `show_amount` times and stops before
/// the downward side would reach zero.
pub fn price_range(current: f64, spread: f64, show_amount: usize) -> Vec<f64> {
    let current = round_cents(current);
    let (mut up, mut down) = (current, current);
    let mut prices = VecDeque::with_capacity(2 * show_amount + 1);
    prices.push_back(current);

    if spread <= 0.0 {
        return prices.into();
    }

    for _ in 0..show_amount {
        up = round_cents(up + spread);
        prices.push_back(up);
        down = round_cents(down - spread);
        prices.push_front(down);
        if down - spread <= 0.0 {
            break;
        }
    }
    prices.into()
}

/// Price the option at each spot by solving implied volatility against its
/// own quoted premium.
pub fn bsm_prices(option: &ScenarioOption, spots: &[f64], days: u32, risk_free_rate: f64) -> Vec<ScenarioPoint> {
    spots
        .iter()
        .map(|&spot| ScenarioPoint {
            spot,
            price: implied_volatility_from_price(
                option.option_type,
                spot,
                option.strike,
                option.price,
                days as f64,
                risk_free_rate,
            )
            .price,
        })
        .collect()
}

/// Kernel price at each spot for a fixed daily volatility.
pub fn estimated_prices(
    option: &ScenarioOption,
    spots: &[f64],
    day_vol: f64,
    days: u32,
    risk_free_rate: f64,
) -> Vec<ScenarioPoint> {
    spots
        .iter()
        .map(|&spot| ScenarioPoint {
            spot,
            price: black_scholes::price(option.option_type, spot, option.strike, day_vol, days as f64, risk_free_rate)
                .price,
        })
        .collect()
}

/// `bsm_prices` for days, days-1, ..., 1.
pub fn bsm_prices_matrix(option: &ScenarioOption, spots: &[f64], days: u32, risk_free_rate: f64) -> Vec<ScenarioRow> {
    (1..=days)
        .rev()
        .map(|d| ScenarioRow {
            days: d,
            points: bsm_prices(option, spots, d, risk_free_rate),
        })
        .collect()
}

/// `estimated_prices` for days, days-1, ..., 1.
pub fn estimated_prices_matrix(
    option: &ScenarioOption,
    spots: &[f64],
    day_vol: f64,
    days: u32,
    risk_free_rate: f64,
) -> Vec<ScenarioRow> {
    (1..=days)
        .rev()
        .map(|d| ScenarioRow {
            days: d,
            points: estimated_prices(option, spots, day_vol, d, risk_free_rate),
        })
        .collect()
}

/// Descriptive statistics of a sample. Variance, std, skew and kurtosis are
/// population (biased) estimates; kurtosis is excess (Fisher).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct SummaryStats {
    pub mean: f64,
    pub variance: f64,
    pub standard_deviation: f64,
    pub median: f64,
    pub max: f64,
    pub min: f64,
    pub skew: f64,
    pub kurtosis: f64,
    pub standard_error_mean: f64,
}

impl SummaryStats {
    /// None for an empty sample.
    pub fn from_sample(sample: &[f64]) -> Option<Self> {
        if sample.is_empty() {
            return None;
        }
        let n = sample.len() as f64;
        let mean = Statistics::mean(sample);
        let variance = Statistics::population_variance(sample);

        let (mut m3, mut m4) = (0.0_f64, 0.0_f64);
        for &x in sample {
            let d = x - mean;
            let d2 = d * d;
            m3 += d2 * d;
            m4 += d2 * d2;
        }
        m3 /= n;
        m4 /= n;

        let (skew, kurtosis) = if variance > 1e-300 {
            (m3 / variance.powf(1.5), m4 / (variance * variance) - 3.0)
        } else {
            (0.0, 0.0)
        };

        let standard_error_mean = if sample.len() > 1 {
            Statistics::std_dev(sample) / n.sqrt()
        } else {
            0.0
        };

        Some(Self {
            mean,
            variance,
            standard_deviation: variance.sqrt(),
            median: Data::new(sample.to_vec()).median(),
            max: Statistics::max(sample),
            min: Statistics::min(sample),
            skew,
            kurtosis,
            standard_error_mean,
        })
    }
}

#[inline]
fn round_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_price_range_centred() {
        let r = price_range(50.123, 1.0, 3);
        assert_eq!(r, vec![47.12, 48.12, 49.12, 50.12, 51.12, 52.12, 53.12]);
    }

    #[test]
    fn test_price_range_stops_near_zero() {
        let r = price_range(2.5, 1.0, 5);
        // 1.5 then 0.5; 0.5 - 1 <= 0 stops the ladder.
        assert_eq!(r, vec![0.5, 1.5, 2.5, 3.5, 4.5]);
    }

    #[test]
    fn test_estimated_matrix_shape_and_decay() {
        let opt = ScenarioOption { option_type: OptionType::Call, strike: 105.0, price: 0.56 };
        let spots = [100.0, 105.0, 110.0];
        let m = estimated_prices_matrix(&opt, &spots, 0.016, 5, 0.02);
        assert_eq!(m.len(), 5);
        assert_eq!(m[0].days, 5);
        assert_eq!(m[4].days, 1);
        // ATM value shrinks as expiry approaches.
        assert!(m[0].points[1].price > m[4].points[1].price);
    }

    #[test]
    fn test_bsm_prices_hit_quote_at_each_spot() {
        let opt = ScenarioOption { option_type: OptionType::Put, strike: 98.0, price: 0.61 };
        let pts = bsm_prices(&opt, &[100.0, 101.24], 8, 0.01);
        for p in pts {
            assert_abs_diff_eq!(p.price, 0.61, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_summary_stats() {
        let s = SummaryStats::from_sample(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_abs_diff_eq!(s.mean, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(s.variance, 1.25, epsilon = 1e-12);
        assert_abs_diff_eq!(s.median, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(s.skew, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.kurtosis, -1.36, epsilon = 1e-12);
        assert_eq!(s.max, 4.0);
        assert_eq!(s.min, 1.0);
        assert!(SummaryStats::from_sample(&[]).is_none());
    }
}
