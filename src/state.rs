use crate::config::AppConfig;
use crate::ledger::Options;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

// ── Performance Counters (lock-free) ──

#[derive(Default)]
pub struct PerfCounters {
    pub prices_computed: AtomicU64,
    pub iv_solves: AtomicU64,
    pub iv_not_converged: AtomicU64,
    pub chains_extended: AtomicU64,
    pub strategies_evaluated: AtomicU64,
    pub contracts_registered: AtomicU64,
    pub purchases: AtomicU64,
    pub exercises: AtomicU64,
    pub requests_rejected: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            prices_computed: self.prices_computed.load(Ordering::Relaxed),
            iv_solves: self.iv_solves.load(Ordering::Relaxed),
            iv_not_converged: self.iv_not_converged.load(Ordering::Relaxed),
            chains_extended: self.chains_extended.load(Ordering::Relaxed),
            strategies_evaluated: self.strategies_evaluated.load(Ordering::Relaxed),
            contracts_registered: self.contracts_registered.load(Ordering::Relaxed),
            purchases: self.purchases.load(Ordering::Relaxed),
            exercises: self.exercises.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CountersSnapshot {
    pub prices_computed: u64,
    pub iv_solves: u64,
    pub iv_not_converged: u64,
    pub chains_extended: u64,
    pub strategies_evaluated: u64,
    pub contracts_registered: u64,
    pub purchases: u64,
    pub exercises: u64,
    pub requests_rejected: u64,
}

// ── Application shared state ──

/// Pricing, chain and strategy handlers are stateless and never take the lock;
/// only registry mutations serialize on `registry`.
pub struct AppState {
    pub config: AppConfig,
    pub registry: Mutex<Options>,
    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(config: AppConfig) -> Arc<Self> {
        Self::with_registry(config, Options::new())
    }

    pub fn with_registry(config: AppConfig, registry: Options) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: Mutex::new(registry),
            counters: PerfCounters::new(),
        })
    }
}
