//! Scheduler - the fixed-cadence pipeline daemon
//!
//! Ticks every thirty seconds while the market calendar allows it, fans
//! the tracked underliers through fetch -> fuse -> project -> persist,
//! suppresses duplicate active signals, and invokes the grader once per
//! minute. No error escapes a tick; a failed unit is logged and skipped.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::calendar::MarketCalendar;
use crate::config::AppConfig;
use crate::feed::MarketFeed;
use crate::grader::Grader;
use crate::parallax::{FuserInput, SignalFuser};
use crate::persistence::Repository;
use crate::risk::RiskProjector;
use crate::types::{
    Direction, Interval, OptionContract, Prediction, PredictionStatus, Quote, Session,
};

/// Everything a tick needs; shared between the loop task and tests
pub struct Pipeline {
    pub calendar: MarketCalendar,
    pub feed: Arc<dyn MarketFeed>,
    pub repo: Arc<Repository>,
    pub fuser: SignalFuser,
    pub grader: Grader,
    pub projector: RiskProjector,
    pub primary_ticker: String,
    pub friday_tickers: Vec<String>,
    pub staleness_ms: i64,
    pub candle_tail: usize,
    pub rolling_window_days: i64,
}

impl Pipeline {
    /// Tickers in play for this instant
    fn ticker_universe(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut tickers = vec![self.primary_ticker.clone()];
        if self.calendar.is_friday(now) {
            tickers.extend(self.friday_tickers.iter().cloned());
        }
        tickers
    }

    fn is_stale(&self, quote: &Quote, now: DateTime<Utc>) -> bool {
        (now - quote.ts).num_milliseconds() > self.staleness_ms
    }

    /// Close of the previous trading session, from the store first and the
    /// feed as a fallback. Drives the pre-market gap bias.
    async fn prior_session_close(&self, ticker: &str, now: DateTime<Utc>) -> Option<f64> {
        let today = self.calendar.local_midnight_utc(now);
        let stored = self
            .repo
            .candles_between(ticker, Interval::Min1, today - ChronoDuration::days(10), today)
            .ok()?;
        if let Some(last) = stored.last() {
            return Some(last.close);
        }

        let fetched = self
            .feed
            .historical_candles(
                ticker,
                Interval::Min15,
                today - ChronoDuration::days(10),
                today,
            )
            .await;
        fetched.last().map(|c| c.close)
    }

    /// Nearest listed expiration on or after today: the 0DTE contract date
    async fn front_expiration(&self, ticker: &str, today: NaiveDate) -> Option<NaiveDate> {
        self.feed
            .option_expirations(ticker)
            .await
            .into_iter()
            .filter(|d| *d >= today)
            .min()
    }

    /// Fetch and persist the front chain, returning it for reuse
    async fn front_chain(
        &self,
        ticker: &str,
        now: DateTime<Utc>,
    ) -> Option<(NaiveDate, Vec<OptionContract>)> {
        let today = self.calendar.local_date(now);
        let expiration = self.front_expiration(ticker, today).await?;
        let chain = self.feed.option_chain(ticker, expiration).await;
        if chain.is_empty() {
            return None;
        }
        if let Err(e) = self.repo.insert_option_snapshots(now, &chain) {
            warn!("chain snapshot persist failed for {}: {:#}", ticker, e);
        }
        Some((expiration, chain))
    }

    /// ATM implied volatility from a chain, when the vendor supplied one
    fn atm_sigma(chain: &[OptionContract], price: f64) -> Option<f64> {
        chain
            .iter()
            .filter(|c| c.iv.is_some())
            .min_by(|a, b| {
                (a.strike - price)
                    .abs()
                    .total_cmp(&(b.strike - price).abs())
            })
            .and_then(|c| c.iv)
    }

    /// Contract row closest to the requested strike on the requested side
    fn pick_contract(
        chain: &[OptionContract],
        direction: Direction,
        strike: f64,
    ) -> Option<OptionContract> {
        chain
            .iter()
            .filter(|c| c.direction == direction)
            .min_by(|a, b| {
                (a.strike - strike)
                    .abs()
                    .total_cmp(&(b.strike - strike).abs())
            })
            .cloned()
    }

    /// One underlier's fetch -> fuse -> project -> persist pipeline
    async fn run_ticker(&self, ticker: &str, quote: &Quote, session: Session, now: DateTime<Utc>) {
        if let Err(e) = self.repo.insert_quote(quote) {
            warn!("quote persist failed for {}: {:#}", ticker, e);
        }

        let candles = if session.is_trading() {
            let candles = self.feed.intraday_candles(ticker, Interval::Min1).await;
            if !candles.is_empty() {
                let tail_start = candles.len().saturating_sub(self.candle_tail);
                if let Err(e) = self.repo.insert_candles(&candles[tail_start..]) {
                    warn!("candle persist failed for {}: {:#}", ticker, e);
                }
            }
            candles
        } else {
            Vec::new()
        };

        // Pre-market needs the overnight context before the fuser runs
        let (prior_close, premarket_chain) = if session == Session::PreMarket {
            (
                self.prior_session_close(ticker, now).await,
                self.front_chain(ticker, now).await,
            )
        } else {
            (None, None)
        };
        let sigma = premarket_chain
            .as_ref()
            .and_then(|(_, chain)| Self::atm_sigma(chain, quote.last));

        let input = FuserInput {
            ticker,
            session,
            price: quote.last,
            candles: &candles,
            prior_close,
            sigma,
        };
        let candidate = match self.fuser.evaluate(&input) {
            Some(c) => c,
            None => return,
        };

        match self
            .repo
            .has_active_signal(ticker, candidate.direction, candidate.engine)
        {
            Ok(true) => {
                info!(
                    "duplicate active signal suppressed: {} {} {}",
                    ticker, candidate.direction, candidate.engine
                );
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("duplicate check failed for {}: {:#}", ticker, e);
                return;
            }
        }

        // Overlay the contract-premium plan from the 0DTE chain
        let chain = match premarket_chain {
            Some(chain) => Some(chain),
            None => self.front_chain(ticker, now).await,
        };
        let contract = chain.as_ref().and_then(|(_, rows)| {
            Self::pick_contract(rows, candidate.direction, candidate.strike)
        });
        let contract = match contract {
            Some(c) => c,
            None => {
                warn!(
                    "no {} contract near {} for {}; signal dropped",
                    candidate.direction, candidate.strike, ticker
                );
                return;
            }
        };
        let mid = contract.mid();
        if mid <= 0.0 {
            warn!("unpriced contract for {} {}; signal dropped", ticker, candidate.strike);
            return;
        }
        let plan = self
            .projector
            .project(mid, candidate.levels, contract.delta);

        let prediction = Prediction {
            id: Uuid::new_v4().to_string(),
            ticker: ticker.to_string(),
            category: "0DTE".to_string(),
            direction: candidate.direction,
            strike: contract.strike,
            entry_stock_price: quote.last,
            confidence: candidate.confidence,
            session,
            engine: candidate.engine,
            reasoning: candidate.reasoning,
            status: PredictionStatus::Active,
            generated_at: now,
            plan,
        };

        match self.repo.insert_prediction(&prediction) {
            Ok(id) => info!(
                "new {} {} {} @ strike {} conf {:.1} entry {:.2} stop {:.2} target {:.2} ({})",
                ticker,
                prediction.direction,
                prediction.engine,
                prediction.strike,
                prediction.confidence,
                prediction.plan.entry,
                prediction.plan.stop,
                prediction.plan.target,
                id
            ),
            Err(e) => warn!("prediction persist failed for {}: {:#}", ticker, e),
        }
    }

    /// One full tick. Public so the integration suite can drive the
    /// pipeline without the timer.
    pub async fn run_tick(&self, now: DateTime<Utc>, grade: bool) {
        let session = self.calendar.session_at(now);
        if !session.is_active() {
            debug!("session {}; skipping tick", session);
            return;
        }

        let tickers = self.ticker_universe(now);
        let quotes = self.feed.quotes(&tickers).await;

        for ticker in &tickers {
            let quote = quotes.iter().find(|q| &q.ticker == ticker);
            match quote {
                Some(q) if q.last > 0.0 && !self.is_stale(q, now) => {
                    self.run_ticker(ticker, q, session, now).await;
                }
                Some(_) => {
                    debug!("stale or unpriced quote for {}; skipping", ticker);
                }
                _ => debug!("no usable quote for {}; skipping", ticker),
            }
        }

        if grade {
            match self.grader.grade_open() {
                Ok(summary) if summary.graded > 0 => {
                    let stats = self
                        .grader
                        .win_rate(&self.primary_ticker, self.rolling_window_days)
                        .unwrap_or_default();
                    info!(
                        "graded {} ({} wins / {} losses); rolling {}d: {}/{} ({:.0}%)",
                        summary.graded,
                        summary.wins,
                        summary.losses,
                        self.rolling_window_days,
                        stats.wins,
                        stats.graded,
                        stats.rate * 100.0
                    );
                }
                Ok(_) => {}
                Err(e) => warn!("grading pass failed: {:#}", e),
            }
        }
    }
}

/// Process-wide daemon with idempotent start and draining stop
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    tick_secs: u64,
    grade_every: u64,
    vendor_configured: bool,
    running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, config: &AppConfig, vendor_configured: bool) -> Self {
        let tick_secs = config.pipeline.tick_secs.max(1);
        Self {
            pipeline: Arc::new(pipeline),
            tick_secs,
            grade_every: (config.pipeline.grade_secs / tick_secs).max(1),
            vendor_configured,
            running: Arc::new(AtomicBool::new(false)),
            stop_signal: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    /// Start the loop. Calling twice is a no-op; starting without vendor
    /// credentials refuses outright.
    pub fn start(&self) -> Result<()> {
        if !self.vendor_configured {
            bail!("vendor credentials missing; refusing to start the scheduler");
        }
        if self.running.swap(true, Ordering::SeqCst) {
            info!("scheduler already running");
            return Ok(());
        }

        // Recover from the previous session before the first tick
        let now = Utc::now();
        match self.pipeline.grader.expire_stale(now) {
            Ok(n) if n > 0 => info!("startup sweep expired {} stale predictions", n),
            Ok(_) => {}
            Err(e) => warn!("startup expiry sweep failed: {:#}", e),
        }
        match self.pipeline.repo.startup_summary() {
            Ok((active, weights)) => info!(
                "recovered state: {} active predictions, {} weight rows",
                active, weights
            ),
            Err(e) => warn!("startup summary failed: {:#}", e),
        }

        let pipeline = self.pipeline.clone();
        let running = self.running.clone();
        let stop_signal = self.stop_signal.clone();
        let tick_secs = self.tick_secs;
        let grade_every = self.grade_every;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!("scheduler loop started ({}s cadence)", tick_secs);

            let mut ticks: u64 = 0;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        let grade = ticks % grade_every == 0;
                        ticks += 1;
                        pipeline.run_tick(Utc::now(), grade).await;
                    }
                    _ = stop_signal.notified() => break,
                }
            }
            info!("scheduler loop drained");
        });

        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Signal the loop and wait for the in-flight tick to drain
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.stop_signal.notify_one();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("scheduler task join failed: {}", e);
            }
        }
        info!("scheduler stopped");
    }
}
