//! Fuser weight vector (the optimizer's genome) and the hot-swap store
//!
//! The five component weights always sum to one; renormalization runs
//! after any mutation or crossover. The store caches the active row per
//! ticker with a short TTL so an optimizer write is picked up without a
//! restart and no scoring call ever sees a torn vector.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::persistence::Repository;

/// Per-field legal range, used by mutation clamping and random init
pub const TPO_RANGE: (f64, f64) = (0.05, 0.5);
pub const RSI_RANGE: (f64, f64) = (0.05, 0.4);
pub const IB_RANGE: (f64, f64) = (0.05, 0.4);
pub const CVD_RANGE: (f64, f64) = (0.05, 0.3);
pub const VWAP_RANGE: (f64, f64) = (0.05, 0.4);
pub const MIN_CONFIDENCE_RANGE: (f64, f64) = (50.0, 80.0);
pub const ORB_BREAKOUT_RANGE: (f64, f64) = (0.3, 3.0);
pub const STOP_LOSS_RANGE: (f64, f64) = (0.2, 0.8);
pub const TARGET_RANGE: (f64, f64) = (1.2, 4.0);

/// Scoring weights for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genes {
    pub tpo: f64,
    pub rsi: f64,
    pub ib: f64,
    pub cvd: f64,
    pub vwap: f64,
    /// Confidence floor a prediction must clear, percent
    pub min_confidence: f64,
    pub orb_breakout_mult: f64,
    pub stop_loss_mult: f64,
    pub target_mult: f64,
}

impl Default for Genes {
    fn default() -> Self {
        Self {
            tpo: 0.30,
            rsi: 0.20,
            ib: 0.20,
            cvd: 0.10,
            vwap: 0.20,
            min_confidence: 60.0,
            orb_breakout_mult: 1.0,
            stop_loss_mult: 0.5,
            target_mult: 2.0,
        }
    }
}

impl Genes {
    /// Rescale the five component weights to sum to one
    pub fn normalize(&mut self) {
        let sum = self.tpo + self.rsi + self.ib + self.cvd + self.vwap;
        if sum > 0.0 {
            self.tpo /= sum;
            self.rsi /= sum;
            self.ib /= sum;
            self.cvd /= sum;
            self.vwap /= sum;
        } else {
            let d = Genes::default();
            self.tpo = d.tpo;
            self.rsi = d.rsi;
            self.ib = d.ib;
            self.cvd = d.cvd;
            self.vwap = d.vwap;
        }
    }

    /// Sum of the five component weights
    pub fn component_sum(&self) -> f64 {
        self.tpo + self.rsi + self.ib + self.cvd + self.vwap
    }
}

struct CachedGenes {
    genes: Genes,
    refreshed_at: Instant,
}

/// Ticker-partitioned cache over the repository's active weights rows.
/// Reads hand out owned snapshots; writers go through the repository and
/// become visible on the next TTL refresh or an explicit invalidate.
pub struct WeightStore {
    repo: Arc<Repository>,
    ttl: Duration,
    cache: RwLock<HashMap<String, CachedGenes>>,
}

impl WeightStore {
    pub fn new(repo: Arc<Repository>, ttl: Duration) -> Self {
        Self {
            repo,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Active weights for a ticker; documented defaults when no row exists
    pub fn active(&self, ticker: &str) -> Genes {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = cache.get(ticker) {
                if entry.refreshed_at.elapsed() < self.ttl {
                    return entry.genes.clone();
                }
            }
        }

        let genes = match self.repo.get_active_weights(ticker) {
            Ok(Some(g)) => g,
            Ok(None) => Genes::default(),
            Err(e) => {
                warn!("weight load failed for {}: {:#}, using defaults", ticker, e);
                Genes::default()
            }
        };

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(
            ticker.to_string(),
            CachedGenes {
                genes: genes.clone(),
                refreshed_at: Instant::now(),
            },
        );
        genes
    }

    /// Drop the cached row so the next read reloads from the repository
    pub fn invalidate(&self, ticker: &str) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.remove(ticker);
    }
}
