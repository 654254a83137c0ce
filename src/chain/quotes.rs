use crate::models::black_scholes::{self, peg};
use crate::models::implied_vol::implied_volatility_from_price_with;
use crate::models::{ItmModel, ItmParams, OptionType};

/// Below this the pegged mid is treated as missing and `lastPrice` is used.
pub const MIN_MID_PRICE: f64 = 0.001;

/// One raw quote row of a per-expiry chain table.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRow {
    pub strike: f64,
    #[serde(default)]
    pub bid: f64,
    #[serde(default)]
    pub ask: f64,
    #[serde(default)]
    pub last_price: f64,
    #[serde(default)]
    pub open_interest: f64,
    #[serde(default)]
    pub in_the_money: bool,
}

/// A quote row plus model valuations. Probabilities are percentages.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedQuoteRow {
    #[serde(flatten)]
    pub quote: QuoteRow,
    pub mid: f64,
    #[serde(rename = "probabilityITM")]
    pub probability_itm: f64,
    pub estimated_price: f64,
    pub estimated_probability: f64,
    pub bsm_price: f64,
    pub bsm_probability: f64,
    pub delta: f64,
    pub duration_volatility: f64,
    pub idv: f64,
}

/// Market estimates applied to every row of one table.
/// Zero `volatility` or zero `days` means zero duration volatility: model
/// probabilities and the estimated price are then reported as 0.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct MarketInputs {
    pub spot: f64,
    /// Daily drift.
    pub drift: f64,
    /// Daily volatility.
    pub volatility: f64,
    pub days: f64,
    pub risk_free_rate: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ChainSettings {
    pub peg_spread: f64,
    pub max_iterations: u32,
}

/// Enrich every row, preserving order. Rows already in the money pass
/// through with every derived field zeroed.
pub fn extend_rows(
    rows: &[QuoteRow],
    option_type: OptionType,
    market: &MarketInputs,
    itm_model: &dyn ItmModel,
    settings: ChainSettings,
) -> Vec<ExtendedQuoteRow> {
    rows.iter()
        .map(|row| extend_row(row, option_type, market, itm_model, settings))
        .collect()
}

fn extend_row(
    row: &QuoteRow,
    option_type: OptionType,
    market: &MarketInputs,
    itm_model: &dyn ItmModel,
    settings: ChainSettings,
) -> ExtendedQuoteRow {
    let mut mid = peg(row.bid, row.ask, settings.peg_spread);
    if mid <= MIN_MID_PRICE {
        mid = row.last_price;
    }

    let mut out = ExtendedQuoteRow {
        quote: row.clone(),
        mid,
        probability_itm: 0.0,
        estimated_price: 0.0,
        estimated_probability: 0.0,
        bsm_price: 0.0,
        bsm_probability: 0.0,
        delta: 0.0,
        duration_volatility: 0.0,
        idv: 0.0,
    };
    if row.in_the_money {
        return out;
    }

    let params = ItmParams {
        spot: market.spot,
        strike: row.strike,
        day_vol: market.volatility,
        drift: market.drift,
        days: market.days,
        risk_free_rate: market.risk_free_rate,
    };
    out.probability_itm = itm_model.probability(option_type, &params) * 100.0;

    let estimated = black_scholes::price(
        option_type,
        market.spot,
        row.strike,
        market.volatility,
        market.days,
        market.risk_free_rate,
    );
    out.estimated_price = estimated.price;
    out.estimated_probability = estimated.prob_itm * 100.0;

    let implied = implied_volatility_from_price_with(
        option_type,
        market.spot,
        row.strike,
        mid,
        market.days,
        market.risk_free_rate,
        settings.max_iterations,
    );
    out.bsm_price = implied.price;
    out.bsm_probability = implied.prob_itm * 100.0;
    out.delta = implied.delta;
    out.duration_volatility = implied.duration_vol;
    out.idv = implied.implied_daily_vol;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::black_scholes::DriftItm;
    use approx::assert_abs_diff_eq;

    fn market() -> MarketInputs {
        MarketInputs {
            spot: 101.24,
            drift: 0.00021,
            volatility: 0.016,
            days: 8.0,
            risk_free_rate: 0.01,
        }
    }

    fn settings() -> ChainSettings {
        ChainSettings { peg_spread: 0.5, max_iterations: 200 }
    }

    fn row(strike: f64, bid: f64, ask: f64, last: f64, itm: bool) -> QuoteRow {
        QuoteRow {
            strike,
            bid,
            ask,
            last_price: last,
            open_interest: 120.0,
            in_the_money: itm,
        }
    }

    #[test]
    fn test_otm_row_valued() {
        let rows = [row(105.0, 0.55, 0.57, 0.57, false)];
        let out = extend_rows(&rows, OptionType::Call, &market(), &DriftItm, settings());
        let r = &out[0];
        assert_abs_diff_eq!(r.mid, 0.56, epsilon = 1e-12);
        assert!(r.probability_itm > 0.0 && r.probability_itm < 100.0);
        assert!(r.estimated_probability > 0.0 && r.estimated_probability < 100.0);
        // Solver reprices the mid within its band.
        assert_abs_diff_eq!(r.bsm_price, 0.56, epsilon = 1e-3);
        assert!(r.idv > 0.0);
        assert_abs_diff_eq!(r.duration_volatility, r.idv * 8.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_itm_row_zeroed_and_order_kept() {
        let rows = [
            row(95.0, 6.2, 6.5, 6.3, true),
            row(105.0, 0.55, 0.57, 0.57, false),
        ];
        let out = extend_rows(&rows, OptionType::Call, &market(), &DriftItm, settings());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].quote.strike, 95.0);
        assert_eq!(out[0].idv, 0.0);
        assert_eq!(out[0].bsm_price, 0.0);
        assert_eq!(out[0].probability_itm, 0.0);
        assert!(out[0].mid > 6.0);
        assert_eq!(out[1].quote.strike, 105.0);
    }

    #[test]
    fn test_zero_duration_vol_rows_stay_finite() {
        let rows = [row(105.0, 0.55, 0.57, 0.57, false)];
        let flat = MarketInputs { volatility: 0.0, ..market() };
        let expiring = MarketInputs { days: 0.0, ..market() };
        for m in [flat, expiring] {
            for ty in [OptionType::Call, OptionType::Put] {
                let r = &extend_rows(&rows, ty, &m, &DriftItm, settings())[0];
                assert_eq!(r.probability_itm, 0.0);
                assert_eq!(r.estimated_probability, 0.0);
                assert_eq!(r.estimated_price.abs(), 0.0);
                for v in [r.mid, r.bsm_price, r.bsm_probability, r.delta, r.duration_volatility, r.idv] {
                    assert!(v.is_finite());
                }
            }
        }
        let json = serde_json::to_value(&extend_rows(&rows, OptionType::Call, &flat, &DriftItm, settings())[0]).unwrap();
        assert_eq!(json["probabilityITM"], 0.0);
    }

    #[test]
    fn test_mid_falls_back_to_last_price() {
        let rows = [row(98.0, 0.0, 0.0, 0.61, false)];
        let out = extend_rows(&rows, OptionType::Put, &market(), &DriftItm, settings());
        assert_eq!(out[0].mid, 0.61);
        assert_abs_diff_eq!(out[0].bsm_price, 0.61, epsilon = 1e-3);
    }

    #[test]
    fn test_serialized_column_names() {
        let out = extend_rows(&[row(105.0, 0.55, 0.57, 0.57, true)], OptionType::Call, &market(), &DriftItm, settings());
        let json = serde_json::to_value(&out[0]).unwrap();
        for key in [
            "strike",
            "lastPrice",
            "openInterest",
            "inTheMoney",
            "mid",
            "probabilityITM",
            "estimatedPrice",
            "bsmProbability",
            "durationVolatility",
            "idv",
        ] {
            assert!(json.get(key).is_some(), "missing column {key}");
        }
    }
}
