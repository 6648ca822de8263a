//! End-to-end pipeline tests over a scripted market feed

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use chrono_tz::America::New_York;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use uuid::Uuid;

use aurora::calendar::MarketCalendar;
use aurora::config::EvolutionConfig;
use aurora::evolution::EvolutionEngine;
use aurora::feed::MarketFeed;
use aurora::grader::Grader;
use aurora::parallax::weights::{Genes, WeightStore};
use aurora::parallax::{EngineParams, SignalFuser};
use aurora::persistence::Repository;
use aurora::risk::RiskProjector;
use aurora::scheduler::Pipeline;
use aurora::types::{
    Candle, Direction, Engine, Interval, OptionContract, OutcomeResult, PredictionStatus, Quote,
};

/// Scripted market feed; every field can be rewritten mid-test
struct MockFeed {
    quotes: RwLock<Vec<Quote>>,
    candles: RwLock<Vec<Candle>>,
    expirations: Vec<NaiveDate>,
    chain: Vec<OptionContract>,
    requested_symbols: RwLock<Vec<Vec<String>>>,
}

impl MockFeed {
    fn new(expiration: NaiveDate) -> Self {
        Self {
            quotes: RwLock::new(Vec::new()),
            candles: RwLock::new(Vec::new()),
            expirations: vec![expiration],
            chain: default_chain(expiration),
            requested_symbols: RwLock::new(Vec::new()),
        }
    }

    fn set_quote(&self, quote: Quote) {
        *self.quotes.write().unwrap() = vec![quote];
    }

    fn set_candles(&self, candles: Vec<Candle>) {
        *self.candles.write().unwrap() = candles;
    }

    fn push_candle(&self, candle: Candle) {
        self.candles.write().unwrap().push(candle);
    }
}

#[async_trait]
impl MarketFeed for MockFeed {
    async fn quote(&self, ticker: &str) -> Option<Quote> {
        self.quotes
            .read()
            .unwrap()
            .iter()
            .find(|q| q.ticker == ticker)
            .cloned()
    }

    async fn quotes(&self, tickers: &[String]) -> Vec<Quote> {
        self.requested_symbols
            .write()
            .unwrap()
            .push(tickers.to_vec());
        self.quotes
            .read()
            .unwrap()
            .iter()
            .filter(|q| tickers.contains(&q.ticker))
            .cloned()
            .collect()
    }

    async fn intraday_candles(&self, ticker: &str, _interval: Interval) -> Vec<Candle> {
        self.candles
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.ticker == ticker)
            .cloned()
            .collect()
    }

    async fn historical_candles(
        &self,
        _ticker: &str,
        _interval: Interval,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Vec<Candle> {
        Vec::new()
    }

    async fn option_expirations(&self, _ticker: &str) -> Vec<NaiveDate> {
        self.expirations.clone()
    }

    async fn option_chain(&self, _ticker: &str, _expiration: NaiveDate) -> Vec<OptionContract> {
        self.chain.clone()
    }
}

fn default_chain(expiration: NaiveDate) -> Vec<OptionContract> {
    let mut chain = Vec::new();
    for strike in [448.0, 449.0, 450.0, 451.0, 452.0, 453.0] {
        for direction in [Direction::Call, Direction::Put] {
            chain.push(OptionContract {
                ticker: "SPY".into(),
                expiration,
                strike,
                direction,
                bid: 1.1,
                ask: 1.3,
                iv: Some(0.22),
                delta: Some(match direction {
                    Direction::Call => 0.5,
                    Direction::Put => -0.5,
                }),
                gamma: Some(0.04),
                open_interest: 1000.0,
                volume: 500.0,
            });
        }
    }
    chain
}

/// A UTC instant from an Eastern wall-clock time
fn eastern(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    New_York
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
        .with_timezone(&Utc)
}

fn make_quote(ticker: &str, last: f64, ts: DateTime<Utc>) -> Quote {
    Quote {
        ticker: ticker.into(),
        ts,
        bid: last - 0.02,
        ask: last + 0.02,
        last,
        size: 100.0,
    }
}

fn make_candle(ts: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        ticker: "SPY".into(),
        ts,
        interval: Interval::Min1,
        open,
        high,
        low,
        close,
        volume: 500.0,
        is_complete: true,
    }
}

/// Bell-shaped session around `center`, rising into the close, starting at
/// the given instant
fn bell_candles(start: DateTime<Utc>, n: usize, center: f64) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let t = i as f64 / (n - 1) as f64;
            let weight = (-(t - 0.5).powi(2) / 0.02).exp();
            let offset = (t - 0.5) * 4.0;
            let price = center + offset * (1.0 - weight);
            let mut c = make_candle(
                start + ChronoDuration::minutes(i as i64),
                price,
                price + 0.25,
                price - 0.25,
                price,
            );
            c.volume = 100.0 + 900.0 * weight;
            c
        })
        .collect()
}

struct Harness {
    pipeline: Pipeline,
    repo: Arc<Repository>,
    feed: Arc<MockFeed>,
}

fn build_harness(weights_ttl: Duration) -> Harness {
    let repo = Arc::new(
        Repository::new(std::env::temp_dir().join(format!("aurora_e2e_{}", Uuid::new_v4())))
            .unwrap(),
    );
    let calendar = MarketCalendar::default();
    let feed = Arc::new(MockFeed::new(NaiveDate::from_ymd_opt(2025, 6, 4).unwrap()));

    let weight_store = Arc::new(WeightStore::new(repo.clone(), weights_ttl));
    let fuser = SignalFuser::new(weight_store.clone(), EngineParams::default());
    let optimizer = Arc::new(
        EvolutionEngine::new(
            repo.clone(),
            EvolutionConfig {
                population_size: 10,
                elite_count: 2,
                mutation_rate: 0.15,
                crossover_rate: 0.7,
                generations: 1,
            },
            0.60,
        )
        .with_weight_store(weight_store),
    );
    let grader = Grader::new(repo.clone(), calendar.clone(), optimizer, 7, 0.10, 10);

    let pipeline = Pipeline {
        calendar,
        feed: feed.clone(),
        repo: repo.clone(),
        fuser,
        grader,
        projector: RiskProjector::default(),
        primary_ticker: "SPY".into(),
        friday_tickers: vec!["QQQ".into(), "IWM".into()],
        staleness_ms: 20_000,
        candle_tail: 5,
        rolling_window_days: 7,
    };

    Harness {
        pipeline,
        repo,
        feed,
    }
}

#[tokio::test]
async fn tick_produces_contract_level_prediction() {
    let harness = build_harness(Duration::from_secs(60));
    let now = eastern(2025, 6, 4, 11, 0);
    let session_open = eastern(2025, 6, 4, 9, 30);

    harness
        .feed
        .set_candles(bell_candles(session_open, 60, 450.0));
    harness.feed.set_quote(make_quote("SPY", 452.0, now));

    harness.pipeline.run_tick(now, false).await;

    let active = harness.repo.get_active_predictions(Some("SPY")).unwrap();
    assert_eq!(active.len(), 1);
    let p = &active[0];
    assert_eq!(p.direction, Direction::Put);
    assert_eq!(p.engine, Engine::TpoMit);
    assert!(p.confidence >= 60.0 && p.confidence <= 100.0);
    assert_eq!(p.strike, 450.0);
    // Plan numbers are option premiums from the chain mid
    assert!((p.plan.entry - 1.2).abs() < 1e-9);
    assert!(p.plan.stop < p.plan.entry);
    assert!(p.plan.target > p.plan.entry);
}

#[tokio::test]
async fn duplicate_active_signal_is_suppressed() {
    let harness = build_harness(Duration::from_secs(60));
    let session_open = eastern(2025, 6, 4, 9, 30);
    harness
        .feed
        .set_candles(bell_candles(session_open, 60, 450.0));

    for minute in [0, 1] {
        let now = eastern(2025, 6, 4, 11, minute);
        harness.feed.set_quote(make_quote("SPY", 452.0, now));
        harness.pipeline.run_tick(now, false).await;
    }

    let active = harness.repo.get_active_predictions(Some("SPY")).unwrap();
    assert_eq!(active.len(), 1, "second identical signal must be suppressed");
}

#[tokio::test]
async fn grading_closes_prediction_with_single_outcome() {
    let harness = build_harness(Duration::from_secs(60));
    let session_open = eastern(2025, 6, 4, 9, 30);
    harness
        .feed
        .set_candles(bell_candles(session_open, 60, 450.0));

    let now = eastern(2025, 6, 4, 11, 0);
    harness.feed.set_quote(make_quote("SPY", 452.0, now));
    harness.pipeline.run_tick(now, false).await;
    assert_eq!(harness.repo.get_active_predictions(None).unwrap().len(), 1);

    // Stock drops hard: the put's projected premium clears its target
    let later = eastern(2025, 6, 4, 11, 5);
    harness
        .feed
        .push_candle(make_candle(later, 449.0, 449.2, 447.5, 448.0));
    harness.feed.set_quote(make_quote("SPY", 452.0, later));
    harness.pipeline.run_tick(later, true).await;

    let joined = harness.repo.outcomes_joined(Some("SPY"), None).unwrap();
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].0.status, PredictionStatus::Closed);
    assert_eq!(joined[0].1.result, OutcomeResult::Win);
    assert!(joined[0].1.realized_pnl > 0.0);
    assert!(harness.repo.get_active_predictions(None).unwrap().is_empty());
}

#[tokio::test]
async fn closed_sessions_do_not_tick() {
    let harness = build_harness(Duration::from_secs(60));
    let session_open = eastern(2025, 6, 4, 9, 30);
    harness
        .feed
        .set_candles(bell_candles(session_open, 60, 450.0));

    // Saturday, a holiday, and a weekday evening
    for now in [
        eastern(2025, 6, 7, 11, 0),
        eastern(2025, 7, 4, 11, 0),
        eastern(2025, 6, 4, 19, 0),
    ] {
        harness.feed.set_quote(make_quote("SPY", 452.0, now));
        harness.pipeline.run_tick(now, false).await;
    }

    assert!(harness.repo.get_active_predictions(None).unwrap().is_empty());
    assert!(harness.feed.requested_symbols.read().unwrap().is_empty());
}

#[tokio::test]
async fn friday_expands_the_ticker_universe() {
    let harness = build_harness(Duration::from_secs(60));

    // Wednesday
    let wednesday = eastern(2025, 6, 4, 11, 0);
    harness.feed.set_quote(make_quote("SPY", 452.0, wednesday));
    harness.pipeline.run_tick(wednesday, false).await;

    // Friday
    let friday = eastern(2025, 6, 6, 11, 0);
    harness.feed.set_quote(make_quote("SPY", 452.0, friday));
    harness.pipeline.run_tick(friday, false).await;

    let requested = harness.feed.requested_symbols.read().unwrap();
    assert_eq!(requested[0], vec!["SPY".to_string()]);
    assert_eq!(
        requested[1],
        vec!["SPY".to_string(), "QQQ".to_string(), "IWM".to_string()]
    );
}

#[tokio::test]
async fn stale_quotes_are_ignored() {
    let harness = build_harness(Duration::from_secs(60));
    let session_open = eastern(2025, 6, 4, 9, 30);
    harness
        .feed
        .set_candles(bell_candles(session_open, 60, 450.0));

    let now = eastern(2025, 6, 4, 11, 0);
    harness
        .feed
        .set_quote(make_quote("SPY", 452.0, now - ChronoDuration::minutes(5)));
    harness.pipeline.run_tick(now, false).await;

    assert!(harness.repo.get_active_predictions(None).unwrap().is_empty());
}

#[test]
fn weight_hot_swap_respects_ttl() {
    let repo = Arc::new(
        Repository::new(std::env::temp_dir().join(format!("aurora_e2e_{}", Uuid::new_v4())))
            .unwrap(),
    );
    let store = WeightStore::new(repo.clone(), Duration::from_millis(50));

    // First read caches the documented defaults
    let initial = store.active("SPY");
    assert_eq!(initial, Genes::default());

    let mut evolved = Genes::default();
    evolved.tpo = 0.45;
    evolved.normalize();
    repo.upsert_active_weights("SPY", &evolved, 0.4, "test swap")
        .unwrap();

    // Within the TTL the stale snapshot is still served
    assert_eq!(store.active("SPY"), initial);

    std::thread::sleep(Duration::from_millis(60));
    let refreshed = store.active("SPY");
    assert!((refreshed.tpo - evolved.tpo).abs() < 1e-9);

    // An explicit invalidate skips the wait entirely
    let mut next = Genes::default();
    next.rsi = 0.35;
    next.normalize();
    repo.upsert_active_weights("SPY", &next, 0.4, "second swap")
        .unwrap();
    store.invalidate("SPY");
    assert!((store.active("SPY").rsi - next.rsi).abs() < 1e-9);
}

#[tokio::test]
async fn startup_expiry_marks_yesterdays_signals() {
    let harness = build_harness(Duration::from_secs(60));
    let session_open = eastern(2025, 6, 3, 9, 30);
    harness
        .feed
        .set_candles(bell_candles(session_open, 60, 450.0));

    // Tuesday's signal never graded
    let yesterday = eastern(2025, 6, 3, 11, 0);
    harness.feed.set_quote(make_quote("SPY", 452.0, yesterday));
    harness.pipeline.run_tick(yesterday, false).await;
    assert_eq!(harness.repo.get_active_predictions(None).unwrap().len(), 1);

    // Wednesday boot sweeps it to EXPIRED without an outcome
    let today = eastern(2025, 6, 4, 9, 0);
    let expired = harness.pipeline.grader.expire_stale(today).unwrap();
    assert_eq!(expired, 1);
    assert!(harness.repo.get_active_predictions(None).unwrap().is_empty());
    assert!(harness.repo.outcomes_joined(None, None).unwrap().is_empty());

    let recent = harness.repo.get_recent_predictions(Some("SPY"), 5).unwrap();
    assert_eq!(recent[0].status, PredictionStatus::Expired);
}
