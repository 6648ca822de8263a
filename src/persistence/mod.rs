//! CSV persistence module
//!
//! Typed storage for candles, quotes, option snapshots, predictions,
//! outcomes, weight rows, weight deltas, and backtest results. One
//! append-only CSV per table under the data directory; status transitions
//! rewrite the affected table under a write lock so multi-row changes
//! (outcome + status, delta + active row) are never observed half-done.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::parallax::weights::Genes;
use crate::types::{
    BacktestResult, Candle, Direction, Engine, Interval, OptionContract, Outcome, OutcomeResult,
    Prediction, PredictionStatus, Quote, Reasoning, Session, TradePlan,
};

fn ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_ms(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ts).single()
}

// ─────────────────────────────────────────────────────────────────
// Row shapes
// ─────────────────────────────────────────────────────────────────

/// Candle row for CSV storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleRecord {
    pub ticker: String,
    pub ts: i64,
    pub interval: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub is_complete: bool,
}

/// Quote row for CSV storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub ticker: String,
    pub ts: i64,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub size: f64,
}

/// Option-chain snapshot row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionSnapshotRecord {
    pub ticker: String,
    pub snapshot_ts: i64,
    pub expiration: String,
    pub strike: f64,
    pub option_type: String,
    pub bid: f64,
    pub ask: f64,
    #[serde(default)]
    pub iv: Option<f64>,
    #[serde(default)]
    pub delta: Option<f64>,
    #[serde(default)]
    pub gamma: Option<f64>,
    pub open_interest: f64,
    pub volume: f64,
}

/// Prediction row; the reasoning blob is JSON inside the CSV column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: String,
    pub ticker: String,
    pub category: String,
    pub direction: String,
    pub strike: f64,
    pub entry_price: f64,
    pub confidence: f64,
    pub entry_trigger: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward_ratio: f64,
    pub session: String,
    pub engine: String,
    pub reasoning: String,
    pub status: String,
    pub generated_at: i64,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Outcome row, one per CLOSED prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub id: String,
    pub prediction_id: String,
    pub actual_pnl: f64,
    pub result: String,
    pub closed_at: i64,
}

/// Weight row; at most one active per ticker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightsRecord {
    pub id: String,
    pub ticker: String,
    pub genes: String,
    pub win_rate: f64,
    pub is_active: bool,
    pub last_updated: i64,
}

/// Audit row for a weight change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightsDeltaRecord {
    pub id: String,
    pub weights_id: String,
    pub old_genes: String,
    pub new_genes: String,
    pub reason: String,
    pub at: i64,
}

/// Backtest result row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRecord {
    pub id: String,
    pub ticker: String,
    pub strategy_name: String,
    pub time_range: String,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub run_at: i64,
}

fn session_parse(s: &str) -> Option<Session> {
    match s {
        "PRE_MARKET" => Some(Session::PreMarket),
        "OPENING_RANGE" => Some(Session::OpeningRange),
        "MORNING" => Some(Session::Morning),
        "AFTERNOON" => Some(Session::Afternoon),
        "POWER_HOUR" => Some(Session::PowerHour),
        "CLOSED" => Some(Session::Closed),
        "CLOSED_WEEKEND" => Some(Session::ClosedWeekend),
        "CLOSED_HOLIDAY" => Some(Session::ClosedHoliday),
        _ => None,
    }
}

impl PredictionRecord {
    fn from_prediction(p: &Prediction) -> Result<Self> {
        Ok(Self {
            id: p.id.clone(),
            ticker: p.ticker.clone(),
            category: p.category.clone(),
            direction: p.direction.to_string(),
            strike: p.strike,
            entry_price: p.entry_stock_price,
            confidence: p.confidence,
            entry_trigger: p.plan.entry,
            stop_loss: p.plan.stop,
            take_profit: p.plan.target,
            risk_reward_ratio: p.plan.risk_reward,
            session: p.session.to_string(),
            engine: p.engine.to_string(),
            reasoning: serde_json::to_string(&p.reasoning).context("serialize reasoning")?,
            status: p.status.to_string(),
            generated_at: ms(p.generated_at),
            expires_at: None,
        })
    }

    fn into_prediction(self) -> Option<Prediction> {
        let reasoning: Reasoning = serde_json::from_str(&self.reasoning).ok()?;
        Some(Prediction {
            id: self.id,
            ticker: self.ticker,
            category: self.category,
            direction: Direction::parse(&self.direction)?,
            strike: self.strike,
            entry_stock_price: self.entry_price,
            confidence: self.confidence,
            session: session_parse(&self.session)?,
            engine: Engine::parse(&self.engine)?,
            reasoning,
            status: PredictionStatus::parse(&self.status)?,
            generated_at: from_ms(self.generated_at)?,
            plan: TradePlan {
                entry: self.entry_trigger,
                stop: self.stop_loss,
                target: self.take_profit,
                risk_reward: self.risk_reward_ratio,
            },
        })
    }
}

// ─────────────────────────────────────────────────────────────────
// File helpers
// ─────────────────────────────────────────────────────────────────

fn append_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let write_headers = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(write_headers).from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    let mut records = Vec::new();
    for row in reader.deserialize() {
        match row {
            Ok(r) => records.push(r),
            Err(e) => warn!("skipping malformed row in {}: {}", path.display(), e),
        }
    }
    Ok(records)
}

fn rewrite_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    {
        let file = fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Repository
// ─────────────────────────────────────────────────────────────────

/// CSV-file repository; the only shared-state collaborator in the pipeline
pub struct Repository {
    data_dir: PathBuf,
    /// Guards candles/quotes/chain appends
    market_lock: RwLock<()>,
    /// Guards predictions + outcomes; close transitions hold it exclusively
    prediction_lock: RwLock<()>,
    /// Guards weights + deltas
    weights_lock: RwLock<()>,
    backtest_lock: RwLock<()>,
    /// Keys already persisted to candles.csv, seeded lazily
    candle_keys: RwLock<Option<HashSet<(String, i64, String)>>>,
}

impl Repository {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("create data dir {}", data_dir.display()))?;
        Ok(Self {
            data_dir,
            market_lock: RwLock::new(()),
            prediction_lock: RwLock::new(()),
            weights_lock: RwLock::new(()),
            backtest_lock: RwLock::new(()),
            candle_keys: RwLock::new(None),
        })
    }

    fn path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", table))
    }

    // ── Market data ──────────────────────────────────────────────

    pub fn insert_quote(&self, quote: &Quote) -> Result<()> {
        let _guard = self.market_lock.write().unwrap_or_else(|e| e.into_inner());
        append_records(
            &self.path("quotes"),
            &[QuoteRecord {
                ticker: quote.ticker.clone(),
                ts: ms(quote.ts),
                bid: quote.bid,
                ask: quote.ask,
                last: quote.last,
                size: quote.size,
            }],
        )
    }

    /// Append candles, skipping (ticker, ts, interval) keys already stored
    pub fn insert_candles(&self, candles: &[Candle]) -> Result<usize> {
        let _guard = self.market_lock.write().unwrap_or_else(|e| e.into_inner());

        let mut keys_guard = self.candle_keys.write().unwrap_or_else(|e| e.into_inner());
        if keys_guard.is_none() {
            let existing: Vec<CandleRecord> = read_records(&self.path("candles"))?;
            let seeded: HashSet<_> = existing
                .into_iter()
                .map(|r| (r.ticker, r.ts, r.interval))
                .collect();
            *keys_guard = Some(seeded);
        }
        let keys = keys_guard.as_mut().unwrap();

        let mut fresh = Vec::new();
        for c in candles {
            let key = (c.ticker.clone(), ms(c.ts), c.interval.to_string());
            if keys.insert(key) {
                fresh.push(CandleRecord {
                    ticker: c.ticker.clone(),
                    ts: ms(c.ts),
                    interval: c.interval.to_string(),
                    open: c.open,
                    high: c.high,
                    low: c.low,
                    close: c.close,
                    volume: c.volume,
                    is_complete: c.is_complete,
                });
            }
        }
        append_records(&self.path("candles"), &fresh)?;
        Ok(fresh.len())
    }

    pub fn insert_option_snapshots(
        &self,
        snapshot_ts: DateTime<Utc>,
        contracts: &[OptionContract],
    ) -> Result<()> {
        let _guard = self.market_lock.write().unwrap_or_else(|e| e.into_inner());
        let rows: Vec<OptionSnapshotRecord> = contracts
            .iter()
            .map(|c| OptionSnapshotRecord {
                ticker: c.ticker.clone(),
                snapshot_ts: ms(snapshot_ts),
                expiration: c.expiration.format("%Y-%m-%d").to_string(),
                strike: c.strike,
                option_type: c.direction.to_string(),
                bid: c.bid,
                ask: c.ask,
                iv: c.iv,
                delta: c.delta,
                gamma: c.gamma,
                open_interest: c.open_interest,
                volume: c.volume,
            })
            .collect();
        append_records(&self.path("option_chain"), &rows)
    }

    fn load_candles(&self) -> Result<Vec<Candle>> {
        let records: Vec<CandleRecord> = read_records(&self.path("candles"))?;
        Ok(records
            .into_iter()
            .filter_map(|r| {
                Some(Candle {
                    ticker: r.ticker,
                    ts: from_ms(r.ts)?,
                    interval: Interval::parse(&r.interval)?,
                    open: r.open,
                    high: r.high,
                    low: r.low,
                    close: r.close,
                    volume: r.volume,
                    is_complete: r.is_complete,
                })
            })
            .collect())
    }

    /// Stored candles in [start, end), chronological
    pub fn candles_between(
        &self,
        ticker: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let _guard = self.market_lock.read().unwrap_or_else(|e| e.into_inner());
        let mut candles: Vec<Candle> = self
            .load_candles()?
            .into_iter()
            .filter(|c| c.ticker == ticker && c.interval == interval && c.ts >= start && c.ts < end)
            .collect();
        candles.sort_by_key(|c| c.ts);
        Ok(candles)
    }

    /// Most recent stored candle for a ticker across intervals
    pub fn latest_candle(&self, ticker: &str) -> Result<Option<Candle>> {
        let _guard = self.market_lock.read().unwrap_or_else(|e| e.into_inner());
        Ok(self
            .load_candles()?
            .into_iter()
            .filter(|c| c.ticker == ticker)
            .max_by_key(|c| c.ts))
    }

    // ── Predictions & outcomes ───────────────────────────────────

    fn load_prediction_records(&self) -> Result<Vec<PredictionRecord>> {
        read_records(&self.path("predictions"))
    }

    pub fn insert_prediction(&self, prediction: &Prediction) -> Result<String> {
        let _guard = self
            .prediction_lock
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let record = PredictionRecord::from_prediction(prediction)?;
        append_records(&self.path("predictions"), &[record])?;
        Ok(prediction.id.clone())
    }

    pub fn get_active_predictions(&self, ticker: Option<&str>) -> Result<Vec<Prediction>> {
        let _guard = self
            .prediction_lock
            .read()
            .unwrap_or_else(|e| e.into_inner());
        Ok(self
            .load_prediction_records()?
            .into_iter()
            .filter_map(PredictionRecord::into_prediction)
            .filter(|p| p.status == PredictionStatus::Active)
            .filter(|p| ticker.map_or(true, |t| p.ticker == t))
            .collect())
    }

    /// Latest `n` predictions of any status, newest first
    pub fn get_recent_predictions(&self, ticker: Option<&str>, n: usize) -> Result<Vec<Prediction>> {
        let _guard = self
            .prediction_lock
            .read()
            .unwrap_or_else(|e| e.into_inner());
        let mut predictions: Vec<Prediction> = self
            .load_prediction_records()?
            .into_iter()
            .filter_map(PredictionRecord::into_prediction)
            .filter(|p| ticker.map_or(true, |t| p.ticker == t))
            .collect();
        predictions.sort_by_key(|p| std::cmp::Reverse(p.generated_at));
        predictions.truncate(n);
        Ok(predictions)
    }

    /// True when an ACTIVE prediction already holds this slot
    pub fn has_active_signal(
        &self,
        ticker: &str,
        direction: Direction,
        engine: Engine,
    ) -> Result<bool> {
        Ok(self
            .get_active_predictions(Some(ticker))?
            .iter()
            .any(|p| p.direction == direction && p.engine == engine))
    }

    pub fn update_prediction_status(&self, id: &str, status: PredictionStatus) -> Result<()> {
        let _guard = self
            .prediction_lock
            .write()
            .unwrap_or_else(|e| e.into_inner());
        self.set_status_locked(id, status)
    }

    fn set_status_locked(&self, id: &str, status: PredictionStatus) -> Result<()> {
        let mut records = self.load_prediction_records()?;
        let mut found = false;
        for r in records.iter_mut() {
            if r.id == id {
                r.status = status.to_string();
                found = true;
            }
        }
        if !found {
            anyhow::bail!("prediction {} not found", id);
        }
        rewrite_records(&self.path("predictions"), &records)
    }

    fn append_outcome_locked(
        &self,
        prediction_id: &str,
        result: OutcomeResult,
        pnl: f64,
        closed_at: DateTime<Utc>,
    ) -> Result<()> {
        append_records(
            &self.path("outcomes"),
            &[OutcomeRecord {
                id: Uuid::new_v4().to_string(),
                prediction_id: prediction_id.to_string(),
                actual_pnl: pnl,
                result: result.to_string(),
                closed_at: ms(closed_at),
            }],
        )
    }

    /// Append an outcome row on its own. Prefer [`Repository::close_prediction`],
    /// which pairs the row with the status flip in one locked section.
    pub fn insert_outcome(
        &self,
        prediction_id: &str,
        result: OutcomeResult,
        pnl: f64,
        closed_at: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self
            .prediction_lock
            .write()
            .unwrap_or_else(|e| e.into_inner());
        self.append_outcome_locked(prediction_id, result, pnl, closed_at)
    }

    /// Terminal transition: status -> CLOSED plus the outcome row, atomically
    pub fn close_prediction(
        &self,
        id: &str,
        result: OutcomeResult,
        pnl: f64,
        closed_at: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self
            .prediction_lock
            .write()
            .unwrap_or_else(|e| e.into_inner());
        self.set_status_locked(id, PredictionStatus::Closed)?;
        self.append_outcome_locked(id, result, pnl, closed_at)
    }

    /// Mark ACTIVE predictions generated before the cutoff as EXPIRED.
    /// No outcome rows are written.
    pub fn expire_active_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let _guard = self
            .prediction_lock
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let mut records = self.load_prediction_records()?;
        let mut expired = 0;
        for r in records.iter_mut() {
            if r.status == PredictionStatus::Active.to_string() && r.generated_at < ms(cutoff) {
                r.status = PredictionStatus::Expired.to_string();
                expired += 1;
            }
        }
        if expired > 0 {
            rewrite_records(&self.path("predictions"), &records)?;
            info!("expired {} stale predictions", expired);
        }
        Ok(expired)
    }

    fn load_outcomes(&self) -> Result<Vec<Outcome>> {
        let records: Vec<OutcomeRecord> = read_records(&self.path("outcomes"))?;
        Ok(records
            .into_iter()
            .filter_map(|r| {
                Some(Outcome {
                    prediction_id: r.prediction_id,
                    result: OutcomeResult::parse(&r.result)?,
                    realized_pnl: r.actual_pnl,
                    closed_at: from_ms(r.closed_at)?,
                })
            })
            .collect())
    }

    /// Closed predictions joined to their outcomes, newest close last
    pub fn outcomes_joined(
        &self,
        ticker: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<(Prediction, Outcome)>> {
        let _guard = self
            .prediction_lock
            .read()
            .unwrap_or_else(|e| e.into_inner());
        let predictions: Vec<Prediction> = self
            .load_prediction_records()?
            .into_iter()
            .filter_map(PredictionRecord::into_prediction)
            .collect();
        let mut joined: Vec<(Prediction, Outcome)> = self
            .load_outcomes()?
            .into_iter()
            .filter(|o| since.map_or(true, |s| o.closed_at >= s))
            .filter_map(|o| {
                let p = predictions.iter().find(|p| p.id == o.prediction_id)?;
                if ticker.map_or(true, |t| p.ticker == t) {
                    Some((p.clone(), o))
                } else {
                    None
                }
            })
            .collect();
        joined.sort_by_key(|(_, o)| o.closed_at);
        Ok(joined)
    }

    // ── Weights ──────────────────────────────────────────────────

    /// Activate a new weight row for a ticker. If a previous active row
    /// existed it is deactivated and an audit delta is written in the same
    /// locked section.
    pub fn upsert_active_weights(
        &self,
        ticker: &str,
        genes: &Genes,
        win_rate: f64,
        reason: &str,
    ) -> Result<()> {
        let _guard = self.weights_lock.write().unwrap_or_else(|e| e.into_inner());

        let mut records: Vec<WeightsRecord> = read_records(&self.path("weights"))?;
        let new_genes_json = serde_json::to_string(genes).context("serialize genes")?;
        let new_id = Uuid::new_v4().to_string();
        let now = ms(Utc::now());

        let mut delta: Option<WeightsDeltaRecord> = None;
        for r in records.iter_mut() {
            if r.ticker == ticker && r.is_active {
                r.is_active = false;
                delta = Some(WeightsDeltaRecord {
                    id: Uuid::new_v4().to_string(),
                    weights_id: new_id.clone(),
                    old_genes: r.genes.clone(),
                    new_genes: new_genes_json.clone(),
                    reason: reason.to_string(),
                    at: now,
                });
            }
        }

        records.push(WeightsRecord {
            id: new_id,
            ticker: ticker.to_string(),
            genes: new_genes_json,
            win_rate,
            is_active: true,
            last_updated: now,
        });
        rewrite_records(&self.path("weights"), &records)?;

        if let Some(d) = delta {
            append_records(&self.path("weights_deltas"), &[d])?;
        }
        Ok(())
    }

    /// Latest active weights for a ticker. A corrupt genes blob logs and
    /// reads as no active row; the next optimizer run overwrites it.
    pub fn get_active_weights(&self, ticker: &str) -> Result<Option<Genes>> {
        let _guard = self.weights_lock.read().unwrap_or_else(|e| e.into_inner());
        let records: Vec<WeightsRecord> = read_records(&self.path("weights"))?;
        let row = records
            .into_iter()
            .filter(|r| r.ticker == ticker && r.is_active)
            .max_by_key(|r| r.last_updated);
        match row {
            Some(r) => match serde_json::from_str::<Genes>(&r.genes) {
                Ok(genes) => Ok(Some(genes)),
                Err(e) => {
                    warn!("corrupt weights row {} for {}: {}", r.id, ticker, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub fn weights_delta_count(&self) -> Result<usize> {
        let _guard = self.weights_lock.read().unwrap_or_else(|e| e.into_inner());
        let records: Vec<WeightsDeltaRecord> = read_records(&self.path("weights_deltas"))?;
        Ok(records.len())
    }

    // ── Backtests ────────────────────────────────────────────────

    pub fn insert_backtest_result(&self, result: &BacktestResult) -> Result<()> {
        let _guard = self.backtest_lock.write().unwrap_or_else(|e| e.into_inner());
        append_records(
            &self.path("backtest_results"),
            &[BacktestRecord {
                id: Uuid::new_v4().to_string(),
                ticker: result.ticker.clone(),
                strategy_name: result.strategy_name.clone(),
                time_range: result.time_range.clone(),
                total_trades: result.total_trades,
                wins: result.wins,
                losses: result.losses,
                win_rate: result.win_rate,
                profit_factor: result.profit_factor,
                max_drawdown: result.max_drawdown,
                run_at: ms(result.run_at),
            }],
        )
    }

    // ── Startup ──────────────────────────────────────────────────

    /// Counts of active predictions and weight rows, for the boot log
    pub fn startup_summary(&self) -> Result<(usize, usize)> {
        let active = self.get_active_predictions(None)?.len();
        let _guard = self.weights_lock.read().unwrap_or_else(|e| e.into_inner());
        let weights: Vec<WeightsRecord> = read_records(&self.path("weights"))?;
        Ok((active, weights.len()))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::BTreeMap;

    /// Repository rooted in a unique temp directory
    pub fn temp_repository() -> Repository {
        let dir = std::env::temp_dir().join(format!("aurora_test_{}", Uuid::new_v4()));
        Repository::new(dir).expect("temp repository")
    }

    /// ACTIVE TPO_MIT prediction with a given plan
    pub fn make_prediction(ticker: &str, direction: Direction, plan: TradePlan) -> Prediction {
        Prediction {
            id: Uuid::new_v4().to_string(),
            ticker: ticker.to_string(),
            category: "0DTE".into(),
            direction,
            strike: 450.0,
            entry_stock_price: 450.0,
            confidence: 72.0,
            session: Session::Morning,
            engine: Engine::TpoMit,
            reasoning: Reasoning::TpoMit {
                poc: 450.0,
                vah: 450.75,
                val: 449.25,
                tpo_bias: "SHORT".into(),
                scores: BTreeMap::new(),
            },
            status: PredictionStatus::Active,
            generated_at: Utc::now(),
            plan,
        }
    }

    pub fn default_plan() -> TradePlan {
        TradePlan {
            entry: 1.0,
            stop: 0.5,
            target: 2.0,
            risk_reward: 2.0,
        }
    }
}
