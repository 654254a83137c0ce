use crate::chain::{ChainSettings, ChainTables, Expiry, InMemoryChainSource, OptionsChain, QuoteRow};
use crate::errors::{require_positive, EngineError, EngineResult};
use crate::ledger::{Contract, ContractSpec, Receipt};
use crate::models::black_scholes::{self, DriftItm, OptionPrice, RiskFreeItm};
use crate::models::implied_vol::{self, BsmSolution, TrancheSolution};
use crate::models::{ItmModel, OptionType};
use crate::state::{AppState, CountersSnapshot, PerfCounters};
use crate::strategy::{evaluate_named, StrategyResult};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::InvalidParameter(_) | EngineError::InvalidAmount(_) | EngineError::Parse(_) => {
                StatusCode::BAD_REQUEST
            }
            EngineError::InsufficientOpenInterest { .. } | EngineError::DuplicateReceiptId(_) => StatusCode::CONFLICT,
            EngineError::UnknownContract(_) | EngineError::UnknownReceipt(_) => StatusCode::NOT_FOUND,
            EngineError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            EngineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Count rejected requests on the way out.
fn tally<T>(state: &AppState, result: EngineResult<T>) -> EngineResult<T> {
    if let Err(e) = &result {
        PerfCounters::bump(&state.counters.requests_rejected);
        tracing::debug!(error = %e, "request rejected");
    }
    result
}

fn require_non_negative(field: &str, value: f64) -> EngineResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(EngineError::InvalidParameter(format!("{field}({value}) must be >= 0")))
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct PriceRequest {
    pub option_type: OptionType,
    pub spot: f64,
    pub strike: f64,
    pub day_vol: f64,
    pub days: f64,
    #[serde(default)]
    pub risk_free_rate: Option<f64>,
}

/// POST /api/price -- kernel price, delta, duration vol and P(ITM)
pub async fn price_option(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PriceRequest>,
) -> Result<Json<OptionPrice>, EngineError> {
    let priced = tally(&state, (|| -> EngineResult<_> {
        let spot = require_positive("spot", req.spot)?;
        let strike = require_positive("strike", req.strike)?;
        let day_vol = require_non_negative("day_vol", req.day_vol)?;
        let days = require_non_negative("days", req.days)?;
        let r = req.risk_free_rate.unwrap_or(state.config.risk_free_rate);
        Ok(black_scholes::price(req.option_type, spot, strike, day_vol, days, r))
    })())?;
    PerfCounters::bump(&state.counters.prices_computed);
    Ok(Json(priced))
}

#[derive(Debug, serde::Deserialize)]
pub struct ImpliedVolRequest {
    pub option_type: OptionType,
    pub spot: f64,
    pub strike: f64,
    pub target_price: f64,
    pub days: f64,
    #[serde(default)]
    pub risk_free_rate: Option<f64>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

/// POST /api/implied-volatility -- BSM bisection solve
pub async fn implied_volatility(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImpliedVolRequest>,
) -> Result<Json<BsmSolution>, EngineError> {
    let solution = tally(&state, (|| -> EngineResult<_> {
        let spot = require_positive("spot", req.spot)?;
        let strike = require_positive("strike", req.strike)?;
        let target = require_positive("target_price", req.target_price)?;
        let days = require_non_negative("days", req.days)?;
        let r = req.risk_free_rate.unwrap_or(state.config.risk_free_rate);
        let cap = req.max_iterations.unwrap_or(state.config.solver_max_iterations).max(1);
        Ok(implied_vol::implied_volatility_from_price_with(
            req.option_type,
            spot,
            strike,
            target,
            days,
            r,
            cap,
        ))
    })())?;

    PerfCounters::bump(&state.counters.iv_solves);
    if !solution.status.is_converged() {
        PerfCounters::bump(&state.counters.iv_not_converged);
    }
    Ok(Json(solution))
}

#[derive(Debug, serde::Deserialize)]
pub struct TrancheRequest {
    pub option_type: OptionType,
    pub spot: f64,
    pub strike: f64,
    pub option_value: f64,
    pub days: f64,
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

/// POST /api/implied-volatility/tranche -- tranche-integration bisection solve
pub async fn implied_volatility_tranche(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TrancheRequest>,
) -> Result<Json<TrancheSolution>, EngineError> {
    let solution = tally(&state, (|| -> EngineResult<_> {
        let spot = require_positive("spot", req.spot)?;
        let strike = require_positive("strike", req.strike)?;
        let value = require_positive("option_value", req.option_value)?;
        let days = require_positive("days", req.days)?;
        let cap = req.max_iterations.unwrap_or(state.config.solver_max_iterations).max(1);
        Ok(implied_vol::implied_volatility_from_tranche_with(
            spot,
            strike,
            value,
            days,
            req.option_type.is_call(),
            cap,
        ))
    })())?;

    PerfCounters::bump(&state.counters.iv_solves);
    if !solution.status.is_converged() {
        PerfCounters::bump(&state.counters.iv_not_converged);
    }
    Ok(Json(solution))
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItmModelChoice {
    Drift,
    DriftRfr,
}

#[derive(Debug, serde::Deserialize)]
pub struct ChainRequest {
    #[serde(default)]
    pub ticker: String,
    pub expiration: String,
    #[serde(default)]
    pub calls: Vec<QuoteRow>,
    #[serde(default)]
    pub puts: Vec<QuoteRow>,
    pub spot: f64,
    pub drift: f64,
    pub volatility: f64,
    #[serde(default)]
    pub days: Option<f64>,
    #[serde(default)]
    pub risk_free_rate: Option<f64>,
    #[serde(default)]
    pub itm_model: Option<ItmModelChoice>,
}

/// POST /api/chain/extended -- enrich posted quote tables for one expiry
pub async fn extended_chain(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChainRequest>,
) -> Result<Json<serde_json::Value>, EngineError> {
    let chain = tally(&state, (|| -> EngineResult<_> {
        let spot = require_positive("spot", req.spot)?;
        let volatility = require_non_negative("volatility", req.volatility)?;
        if let Some(days) = req.days {
            require_non_negative("days", days)?;
        }

        let mut source = InMemoryChainSource::new();
        source.insert(
            req.expiration.clone(),
            ChainTables {
                calls: req.calls.clone(),
                puts: req.puts.clone(),
            },
        );
        let chain = OptionsChain::new(req.ticker.clone(), Box::new(source))?;

        let model: &dyn ItmModel = match req.itm_model {
            Some(ItmModelChoice::DriftRfr) => &RiskFreeItm,
            Some(ItmModelChoice::Drift) | None => &DriftItm,
        };
        let settings = ChainSettings {
            peg_spread: state.config.peg_spread,
            max_iterations: state.config.solver_max_iterations,
        };
        chain.extended_chain(
            &Expiry::Date(req.expiration.clone()),
            spot,
            req.drift,
            volatility,
            req.days,
            req.risk_free_rate.unwrap_or(state.config.risk_free_rate),
            model,
            settings,
        )
    })())?;

    PerfCounters::bump(&state.counters.chains_extended);
    Ok(Json(serde_json::json!({
        "ticker": req.ticker,
        "chain": chain,
    })))
}

/// POST /api/strategies/{name} -- evaluate a named multi-leg strategy
pub async fn evaluate_strategy(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<StrategyResult>, EngineError> {
    let result = tally(&state, evaluate_named(&name, params, state.config.options_fees))?;
    PerfCounters::bump(&state.counters.strategies_evaluated);
    Ok(Json(result))
}

#[derive(Debug, serde::Serialize)]
pub struct RegisterResponse {
    pub registered: bool,
    pub contract: Contract,
}

/// POST /api/contracts -- list a contract; duplicates are ignored
pub async fn register_contract(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<ContractSpec>,
) -> Result<Json<RegisterResponse>, EngineError> {
    let contract = tally(&state, spec.build())?;
    let mut registry = state.registry.lock().await;
    let registered = registry.register(contract.clone());
    let contract = match registry.get_contract(&contract.name) {
        Some(listed) => listed.clone(),
        None => contract,
    };
    drop(registry);

    if registered {
        PerfCounters::bump(&state.counters.contracts_registered);
    }
    Ok(Json(RegisterResponse { registered, contract }))
}

#[derive(Debug, serde::Deserialize)]
pub struct ContractsQuery {
    /// Only contracts in the money at this spot.
    pub itm_at: Option<f64>,
}

/// GET /api/contracts -- calls then puts in listing order
pub async fn list_contracts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ContractsQuery>,
) -> Json<serde_json::Value> {
    let registry = state.registry.lock().await;
    let contracts: Vec<Contract> = match params.itm_at {
        Some(spot) => registry.itm_contracts(spot).cloned().collect(),
        None => registry.contracts().cloned().collect(),
    };
    Json(serde_json::json!({ "contracts": contracts }))
}

#[derive(Debug, serde::Deserialize)]
pub struct PurchaseRequest {
    pub owner: String,
    pub amount: i64,
}

/// POST /api/contracts/{name}/purchase
pub async fn purchase_contract(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<Receipt>, EngineError> {
    let receipt = {
        let mut registry = state.registry.lock().await;
        tally(&state, registry.purchase(&name, req.amount, &req.owner))?
    };
    PerfCounters::bump(&state.counters.purchases);
    Ok(Json(receipt))
}

#[derive(Debug, serde::Serialize)]
pub struct RemoveResponse {
    pub contract: Contract,
    pub receipts: Vec<Receipt>,
}

/// DELETE /api/contracts/{name} -- delist and return outstanding receipts
pub async fn remove_contract(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<RemoveResponse>, EngineError> {
    let mut registry = state.registry.lock().await;
    let (contract, receipts) = tally(&state, registry.remove(&name))?;
    Ok(Json(RemoveResponse { contract, receipts }))
}

#[derive(Debug, serde::Deserialize)]
pub struct ExerciseRequest {
    pub closing_price: f64,
}

/// POST /api/receipts/{id}/exercise
pub async fn exercise_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ExerciseRequest>,
) -> Result<Json<serde_json::Value>, EngineError> {
    let value = {
        let mut registry = state.registry.lock().await;
        tally(
            &state,
            require_positive("closing_price", req.closing_price).and_then(|p| registry.exercise(p, &id)),
        )?
    };
    PerfCounters::bump(&state.counters.exercises);
    Ok(Json(serde_json::json!({ "receipt_id": id, "value": value })))
}

/// POST /api/contracts/{name}/expire -- settle every outstanding receipt at the close
pub async fn expire_contract(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<ExerciseRequest>,
) -> Result<Json<serde_json::Value>, EngineError> {
    let values = {
        let mut registry = state.registry.lock().await;
        tally(
            &state,
            require_positive("closing_price", req.closing_price)
                .and_then(|p| registry.expire_contract(&name, p)),
        )?
    };
    Ok(Json(serde_json::json!({ "contract": name, "values": values })))
}

/// GET /api/counters -- performance counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<CountersSnapshot> {
    Json(state.counters.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::implied_vol::SolverStatus;

    fn state() -> Arc<AppState> {
        AppState::new(AppConfig::default())
    }

    fn put_spec() -> ContractSpec {
        ContractSpec {
            option_type: "PUT".into(),
            strike: 98.0,
            price: 0.61,
            expiration: Some("2024-01-19".into()),
            open_interest: Some(5.0),
            name: None,
        }
    }

    #[tokio::test]
    async fn test_price_endpoint() {
        let s = state();
        let req = PriceRequest {
            option_type: OptionType::Call,
            spot: 101.24,
            strike: 105.0,
            day_vol: 0.016,
            days: 8.0,
            risk_free_rate: Some(0.02),
        };
        let Json(p) = price_option(State(s.clone()), Json(req)).await.unwrap();
        assert!((p.price - 0.5645167696167235).abs() < 1e-9);
        assert_eq!(s.counters.snapshot().prices_computed, 1);

        let bad = PriceRequest {
            option_type: OptionType::Call,
            spot: -1.0,
            strike: 105.0,
            day_vol: 0.016,
            days: 8.0,
            risk_free_rate: None,
        };
        let err = price_option(State(s.clone()), Json(bad)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(s.counters.snapshot().requests_rejected, 1);
    }

    #[tokio::test]
    async fn test_implied_vol_counts_non_convergence() {
        let s = state();
        let req = ImpliedVolRequest {
            option_type: OptionType::Call,
            spot: 120.0,
            strike: 100.0,
            target_price: 0.5,
            days: 5.0,
            risk_free_rate: Some(0.0),
            max_iterations: Some(32),
        };
        let Json(sol) = implied_volatility(State(s.clone()), Json(req)).await.unwrap();
        assert_ne!(sol.status, SolverStatus::Converged);
        let c = s.counters.snapshot();
        assert_eq!(c.iv_solves, 1);
        assert_eq!(c.iv_not_converged, 1);
    }

    #[tokio::test]
    async fn test_tranche_endpoint() {
        let s = state();
        let req = TrancheRequest {
            option_type: OptionType::Call,
            spot: 101.24,
            strike: 105.0,
            option_value: 0.555,
            days: 8.0,
            max_iterations: None,
        };
        let Json(sol) = implied_volatility_tranche(State(s), Json(req)).await.unwrap();
        assert!(sol.status.is_converged());
        assert!((sol.implied_daily_vol - 0.015956878662109375).abs() < 1e-12);
        assert!((sol.implied_duration_vol - 0.045132868434193854).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_contract_lifecycle_endpoints() {
        let s = state();
        let Json(reg) = register_contract(State(s.clone()), Json(put_spec())).await.unwrap();
        assert!(reg.registered);
        assert_eq!(reg.contract.name, "PUT:98.0:2024-01-19");
        let Json(dup) = register_contract(State(s.clone()), Json(put_spec())).await.unwrap();
        assert!(!dup.registered);

        let name = reg.contract.name.clone();
        let Json(receipt) = purchase_contract(
            State(s.clone()),
            Path(name.clone()),
            Json(PurchaseRequest { owner: "alice".into(), amount: 2 }),
        )
        .await
        .unwrap();
        assert_eq!(receipt.amount, 2);

        let err = purchase_contract(
            State(s.clone()),
            Path(name.clone()),
            Json(PurchaseRequest { owner: "bob".into(), amount: 9 }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);

        let Json(listed) = list_contracts(State(s.clone()), Query(ContractsQuery { itm_at: None })).await;
        assert_eq!(listed["contracts"][0]["open_interest"], 3);

        let Json(ex) = exercise_receipt(
            State(s.clone()),
            Path(receipt.id.clone()),
            Json(ExerciseRequest { closing_price: 95.0 }),
        )
        .await
        .unwrap();
        let value = ex["value"].as_f64().unwrap();
        assert!((value - (600.0 - 1.22)).abs() < 1e-9);

        let Json(removed) = remove_contract(State(s.clone()), Path(name.clone())).await.unwrap();
        assert!(removed.receipts.is_empty());
        let err = remove_contract(State(s.clone()), Path(name)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let c = s.counters.snapshot();
        assert_eq!(c.contracts_registered, 1);
        assert_eq!(c.purchases, 1);
        assert_eq!(c.exercises, 1);
        assert_eq!(c.requests_rejected, 2);
    }

    #[tokio::test]
    async fn test_strategy_endpoint() {
        let s = state();
        let params = serde_json::json!({
            "stock": "SPY",
            "current_price": 100.0,
            "strike": 105.0,
            "call_price": 2.0
        });
        let Json(r) = evaluate_strategy(State(s.clone()), Path("covered_call".into()), Json(params))
            .await
            .unwrap();
        assert_eq!(r.break_even_prices.as_slice(), &[98.0]);
        assert_eq!(s.counters.snapshot().strategies_evaluated, 1);
    }

    #[tokio::test]
    async fn test_chain_endpoint() {
        let s = state();
        let req = ChainRequest {
            ticker: "SPY".into(),
            expiration: "2024-01-19".into(),
            calls: vec![QuoteRow {
                strike: 105.0,
                bid: 0.55,
                ask: 0.57,
                last_price: 0.56,
                open_interest: 10.0,
                in_the_money: false,
            }],
            puts: vec![],
            spot: 101.24,
            drift: 0.0,
            volatility: 0.016,
            days: Some(8.0),
            risk_free_rate: Some(0.01),
            itm_model: Some(ItmModelChoice::DriftRfr),
        };
        let Json(v) = extended_chain(State(s.clone()), Json(req)).await.unwrap();
        assert_eq!(v["ticker"], "SPY");
        assert_eq!(v["chain"]["calls"].as_array().unwrap().len(), 1);
        assert!(v["chain"]["calls"][0]["idv"].as_f64().unwrap() > 0.0);
        assert_eq!(s.counters.snapshot().chains_extended, 1);
    }

    #[tokio::test]
    async fn test_expire_endpoint() {
        let s = state();
        let Json(reg) = register_contract(State(s.clone()), Json(put_spec())).await.unwrap();

        let err = expire_contract(
            State(s.clone()),
            Path(reg.contract.name.clone()),
            Json(ExerciseRequest { closing_price: 95.0 }),
        )
        .await
        .unwrap_err();
        assert_eq!(err, EngineError::NotImplemented("contract expiry"));
        assert_eq!(err.into_response().status(), StatusCode::NOT_IMPLEMENTED);

        let err = expire_contract(
            State(s.clone()),
            Path("CALL:1.0:2024-01-19".into()),
            Json(ExerciseRequest { closing_price: 95.0 }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(s.counters.snapshot().requests_rejected, 2);

        let Json(listed) = list_contracts(State(s), Query(ContractsQuery { itm_at: None })).await;
        assert_eq!(listed["contracts"][0]["open_interest"], 5);
    }
}
