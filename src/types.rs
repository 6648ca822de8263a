//! Core types used throughout Aurora
//!
//! Defines the shared data structures for candles, quotes, option chains,
//! predictions, and trade plans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Supported intraday candle intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    Min1,
    Min5,
    Min15,
}

impl Default for Interval {
    fn default() -> Self {
        Interval::Min1
    }
}

impl Interval {
    /// Get duration in seconds
    pub fn duration_secs(&self) -> u64 {
        match self {
            Interval::Min1 => 60,
            Interval::Min5 => 5 * 60,
            Interval::Min15 => 15 * 60,
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "1m" | "1min" => Some(Interval::Min1),
            "5m" | "5min" => Some(Interval::Min5),
            "15m" | "15min" => Some(Interval::Min15),
            _ => None,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Min1 => write!(f, "1m"),
            Interval::Min5 => write!(f, "5m"),
            Interval::Min15 => write!(f, "15m"),
        }
    }
}

/// Market session tag resolved by the calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Session {
    PreMarket,
    OpeningRange,
    Morning,
    Afternoon,
    PowerHour,
    Closed,
    ClosedWeekend,
    ClosedHoliday,
}

impl Session {
    /// True during regular trading hours (open through close)
    pub fn is_trading(&self) -> bool {
        matches!(
            self,
            Session::OpeningRange | Session::Morning | Session::Afternoon | Session::PowerHour
        )
    }

    /// True whenever the pipeline should run at all (pre-market included)
    pub fn is_active(&self) -> bool {
        self.is_trading() || matches!(self, Session::PreMarket)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Session::PreMarket => "PRE_MARKET",
            Session::OpeningRange => "OPENING_RANGE",
            Session::Morning => "MORNING",
            Session::Afternoon => "AFTERNOON",
            Session::PowerHour => "POWER_HOUR",
            Session::Closed => "CLOSED",
            Session::ClosedWeekend => "CLOSED_WEEKEND",
            Session::ClosedHoliday => "CLOSED_HOLIDAY",
        };
        write!(f, "{}", s)
    }
}

/// Recommendation direction (option type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Call,
    Put,
}

impl Direction {
    /// Premium projection sign: +1 for calls, -1 for puts
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Call => 1.0,
            Direction::Put => -1.0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CALL" => Some(Direction::Call),
            "PUT" => Some(Direction::Put),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Call => write!(f, "CALL"),
            Direction::Put => write!(f, "PUT"),
        }
    }
}

/// Which engine produced a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Engine {
    TpoMit,
    BlackScholes,
    OrbMomentum,
}

impl Engine {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TPO_MIT" => Some(Engine::TpoMit),
            "BLACK_SCHOLES" => Some(Engine::BlackScholes),
            "ORB_MOMENTUM" => Some(Engine::OrbMomentum),
            _ => None,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Engine::TpoMit => "TPO_MIT",
            Engine::BlackScholes => "BLACK_SCHOLES",
            Engine::OrbMomentum => "ORB_MOMENTUM",
        };
        write!(f, "{}", s)
    }
}

/// Immutable OHLCV bar for (ticker, timestamp, interval)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub ticker: String,
    /// Bar open time (UTC)
    pub ts: DateTime<Utc>,
    pub interval: Interval,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// False while the bar is still forming
    pub is_complete: bool,
}

impl Candle {
    /// True range against a previous close
    pub fn true_range(&self, prev_close: f64) -> f64 {
        (self.high - self.low)
            .max((self.high - prev_close).abs())
            .max((self.low - prev_close).abs())
    }

    /// Typical price (H+L+C)/3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Point-in-time quote for a ticker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub ts: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub size: f64,
}

impl Quote {
    pub fn mid(&self) -> f64 {
        if self.bid > 0.0 && self.ask > 0.0 {
            (self.bid + self.ask) / 2.0
        } else {
            self.last
        }
    }
}

/// Option contract snapshot from a chain fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionContract {
    pub ticker: String,
    pub expiration: chrono::NaiveDate,
    pub strike: f64,
    pub direction: Direction,
    pub bid: f64,
    pub ask: f64,
    pub iv: Option<f64>,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub open_interest: f64,
    pub volume: f64,
}

impl OptionContract {
    pub fn mid(&self) -> f64 {
        if self.bid > 0.0 && self.ask > 0.0 {
            (self.bid + self.ask) / 2.0
        } else {
            self.bid.max(self.ask)
        }
    }
}

/// Contract-premium trade plan attached to a prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePlan {
    /// Entry premium
    pub entry: f64,
    /// Stop premium
    pub stop: f64,
    /// Target premium
    pub target: f64,
    pub risk_reward: f64,
}

/// Per-signal component scores carried in the reasoning blob
pub type ComponentScores = BTreeMap<String, f64>;

/// Engine-specific reasoning attached to each prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "engine")]
pub enum Reasoning {
    #[serde(rename = "TPO_MIT")]
    TpoMit {
        poc: f64,
        vah: f64,
        val: f64,
        tpo_bias: String,
        scores: ComponentScores,
    },
    #[serde(rename = "BLACK_SCHOLES")]
    BlackScholes {
        bias: String,
        theoretical: f64,
        sigma: f64,
        expected_move: f64,
    },
    #[serde(rename = "ORB_MOMENTUM")]
    OrbMomentum {
        range_high: f64,
        range_low: f64,
        breakout_strength: f64,
    },
}

/// Prediction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionStatus {
    Active,
    Closed,
    Expired,
}

impl PredictionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Some(PredictionStatus::Active),
            "CLOSED" => Some(PredictionStatus::Closed),
            "EXPIRED" => Some(PredictionStatus::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PredictionStatus::Active => "ACTIVE",
            PredictionStatus::Closed => "CLOSED",
            PredictionStatus::Expired => "EXPIRED",
        };
        write!(f, "{}", s)
    }
}

/// A directional options recommendation with its trade plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub ticker: String,
    /// Coarse grouping for downstream display ("0DTE", "INTRADAY", ...)
    pub category: String,
    pub direction: Direction,
    pub strike: f64,
    /// Underlying price when the signal was formed
    pub entry_stock_price: f64,
    /// Confidence percentage, gated to [min_confidence, 100]
    pub confidence: f64,
    pub session: Session,
    pub engine: Engine,
    pub reasoning: Reasoning,
    pub status: PredictionStatus,
    pub generated_at: DateTime<Utc>,
    pub plan: TradePlan,
}

/// Terminal grade for a closed prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeResult {
    Win,
    Loss,
}

impl OutcomeResult {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "WIN" => Some(OutcomeResult::Win),
            "LOSS" => Some(OutcomeResult::Loss),
            _ => None,
        }
    }
}

impl fmt::Display for OutcomeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeResult::Win => write!(f, "WIN"),
            OutcomeResult::Loss => write!(f, "LOSS"),
        }
    }
}

/// Graded outcome, one-to-one with a CLOSED prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub prediction_id: String,
    pub result: OutcomeResult,
    pub realized_pnl: f64,
    pub closed_at: DateTime<Utc>,
}

/// Aggregate statistics from a backtest replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub ticker: String,
    pub strategy_name: String,
    pub time_range: String,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub run_at: DateTime<Utc>,
}
