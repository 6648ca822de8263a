//! Parallax - the signal fuser
//!
//! Per (ticker, session) it picks the engine the session calls for,
//! scores the available signals, fuses them into a confidence in
//! [0, 100] under the active weights, and emits at most one candidate
//! recommendation with stock-level trade levels attached. The scheduler
//! later overlays the contract-premium projection.
//!
//! Engines:
//! - PRE_MARKET: Black-Scholes theoretical pricing off the overnight gap
//! - OPENING_RANGE (and post-OR fallback): opening-range breakout
//! - regular hours: TPO value-area positioning + mean-reversion toward value

pub mod weights;

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::indicators::black_scholes;
use crate::indicators::cvd;
use crate::indicators::session_range::{InitialBalance, OrbLevels};
use crate::indicators::tpo::{TpoBias, TpoProfile};
use crate::indicators::TechnicalSnapshot;
use crate::risk::StockLevels;
use crate::types::{Candle, Direction, Engine, Reasoning, Session};
use weights::{Genes, WeightStore};

/// Overnight gap beyond which the pre-market bias is directional
const PREMARKET_BIAS_THRESHOLD: f64 = 0.002;
/// Risk-free rate for theoretical pricing
const RISK_FREE_RATE: f64 = 0.05;
/// One trading day in years, the 0DTE pricing horizon
const ZERO_DTE_HORIZON: f64 = 1.0 / 252.0;

/// Everything one evaluation needs; the fuser itself holds no market state
pub struct FuserInput<'a> {
    pub ticker: &'a str,
    pub session: Session,
    /// Current underlying price
    pub price: f64,
    /// Today's regular-hours one-minute candles, chronological
    pub candles: &'a [Candle],
    /// Prior session close, for the pre-market gap bias
    pub prior_close: Option<f64>,
    /// ATM implied volatility estimate, when a chain snapshot offered one
    pub sigma: Option<f64>,
}

/// Candidate recommendation before the contract overlay
#[derive(Debug, Clone)]
pub struct SignalCandidate {
    pub direction: Direction,
    pub strike: f64,
    pub confidence: f64,
    pub engine: Engine,
    pub reasoning: Reasoning,
    pub levels: StockLevels,
}

/// Kernel parameters shared by the live fuser and the backtest replay
#[derive(Debug, Clone)]
pub struct EngineParams {
    pub tick_size: f64,
    pub value_area_fraction: f64,
    pub ib_duration_minutes: usize,
    pub orb_duration_minutes: usize,
    pub atr_fallback: f64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            tick_size: 0.25,
            value_area_fraction: 0.70,
            ib_duration_minutes: 60,
            orb_duration_minutes: 30,
            atr_fallback: 2.0,
        }
    }
}

/// Fuser configuration and weight access
pub struct SignalFuser {
    weights: Arc<WeightStore>,
    params: EngineParams,
}

fn round_to(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

impl SignalFuser {
    pub fn new(weights: Arc<WeightStore>, params: EngineParams) -> Self {
        Self { weights, params }
    }

    /// Run the session-appropriate engine. None means no actionable signal
    /// this cycle, which is the common case.
    pub fn evaluate(&self, input: &FuserInput<'_>) -> Option<SignalCandidate> {
        if input.price <= 0.0 {
            return None;
        }
        let genes = self.weights.active(input.ticker);

        let candidate = match input.session {
            Session::PreMarket => self.black_scholes_engine(input),
            Session::OpeningRange => self.orb_engine(input, &genes),
            Session::Morning | Session::Afternoon | Session::PowerHour => self
                .tpo_mit_engine(input, &genes)
                .or_else(|| self.orb_engine(input, &genes)),
            _ => None,
        }?;

        if candidate.confidence < genes.min_confidence {
            debug!(
                "{}: {} candidate below floor ({:.1} < {:.1})",
                input.ticker, candidate.engine, candidate.confidence, genes.min_confidence
            );
            return None;
        }
        Some(candidate)
    }

    /// Pre-market theoretical pricing. Needs a directional overnight gap.
    fn black_scholes_engine(&self, input: &FuserInput<'_>) -> Option<SignalCandidate> {
        let prior_close = input.prior_close.filter(|c| *c > 0.0)?;
        let gap = input.price / prior_close - 1.0;

        let direction = if gap > PREMARKET_BIAS_THRESHOLD {
            Direction::Call
        } else if gap < -PREMARKET_BIAS_THRESHOLD {
            Direction::Put
        } else {
            return None;
        };
        let confirmed = gap.abs() >= 2.0 * PREMARKET_BIAS_THRESHOLD;

        let strike = match direction {
            Direction::Call => round_to(input.price * 1.005, 0.5),
            Direction::Put => round_to(input.price * 0.995, 0.5),
        };

        let sigma = input.sigma.unwrap_or(0.25);
        let greeks = black_scholes::price(
            direction,
            input.price,
            strike,
            ZERO_DTE_HORIZON,
            RISK_FREE_RATE,
            sigma,
        );
        let expected_move = black_scholes::expected_move(input.price, sigma, ZERO_DTE_HORIZON);

        let moneyness = match direction {
            Direction::Call => (input.price - strike) / strike,
            Direction::Put => (strike - input.price) / strike,
        };
        let mut confidence = 50.0;
        if moneyness > -0.02 && moneyness < 0.0 {
            confidence += 10.0;
        }
        if sigma > 0.3 && sigma < 0.5 {
            confidence += 5.0;
        }
        if confirmed {
            confidence += 5.0;
        }

        let levels = match direction {
            Direction::Call => StockLevels {
                entry: input.price,
                stop: input.price - expected_move / 2.0,
                target: input.price + expected_move,
            },
            Direction::Put => StockLevels {
                entry: input.price,
                stop: input.price + expected_move / 2.0,
                target: input.price - expected_move,
            },
        };

        let bias = if direction == Direction::Call {
            "BULLISH"
        } else {
            "BEARISH"
        };
        Some(SignalCandidate {
            direction,
            strike,
            confidence,
            engine: Engine::BlackScholes,
            reasoning: Reasoning::BlackScholes {
                bias: bias.to_string(),
                theoretical: greeks.price,
                sigma,
                expected_move,
            },
            levels,
        })
    }

    /// Opening-range breakout. Needs the full opening range on file.
    fn orb_engine(&self, input: &FuserInput<'_>, genes: &Genes) -> Option<SignalCandidate> {
        let orb = OrbLevels::derive(input.candles, self.params.orb_duration_minutes)?;

        let (direction, distance) = if input.price > orb.high {
            (Direction::Call, input.price - orb.high)
        } else if input.price < orb.low {
            (Direction::Put, orb.low - input.price)
        } else {
            return None;
        };

        let breakout_strength = distance / orb.range_size;
        let confidence = 55.0 + (40.0 * breakout_strength).min(20.0);

        let levels = match direction {
            Direction::Call => StockLevels {
                entry: input.price,
                stop: orb.long_stop,
                target: orb.high + orb.range_size * genes.orb_breakout_mult,
            },
            Direction::Put => StockLevels {
                entry: input.price,
                stop: orb.short_stop,
                target: orb.low - orb.range_size * genes.orb_breakout_mult,
            },
        };

        let strike = match direction {
            Direction::Call => (input.price * 1.005).round(),
            Direction::Put => (input.price * 0.995).round(),
        };

        Some(SignalCandidate {
            direction,
            strike,
            confidence,
            engine: Engine::OrbMomentum,
            reasoning: Reasoning::OrbMomentum {
                range_high: orb.high,
                range_low: orb.low,
                breakout_strength,
            },
            levels,
        })
    }

    /// TPO positioning plus technical confirmation. Needs thirty candles.
    fn tpo_mit_engine(&self, input: &FuserInput<'_>, genes: &Genes) -> Option<SignalCandidate> {
        score_tpo_mit(input.candles, input.price, genes, &self.params)
    }
}

/// TPO+MIT scoring against an explicit weight vector. The live fuser and
/// the backtest replay share this path.
pub fn score_tpo_mit(
    candles: &[Candle],
    price: f64,
    genes: &Genes,
    params: &EngineParams,
) -> Option<SignalCandidate> {
    if candles.len() < 30 {
        return None;
    }

    let profile = TpoProfile::build(candles, params.tick_size, params.value_area_fraction)?;
    let technicals = TechnicalSnapshot::compute(candles);
    let balance = InitialBalance::derive(candles, params.ib_duration_minutes);
    let volume_delta = cvd::cumulative(candles);

    let tpo_bias = profile.bias(price);

    // Per-signal scores in [0, 1]; a missing input drops the component
    // from both sides of the weighted sum.
    let mut scores: BTreeMap<String, f64> = BTreeMap::new();
    scores.insert(
        "tpo".into(),
        if tpo_bias == TpoBias::Neutral { 0.3 } else { 0.7 },
    );
    if let Some(rsi) = technicals.rsi14 {
        scores.insert(
            "rsi".into(),
            if rsi < 30.0 || rsi > 70.0 { 0.8 } else { 0.5 },
        );
    }
    if let Some(ib) = &balance {
        scores.insert("ib".into(), if ib.is_breakout(price) { 0.75 } else { 0.4 });
    }
    if let Some(delta) = &volume_delta {
        scores.insert("cvd".into(), if delta.divergence { 0.65 } else { 0.5 });
    }
    if let Some(vwap) = technicals.vwap {
        let drift = (price - vwap).abs() / vwap;
        let score = if drift < 0.01 {
            0.6
        } else if drift < 0.02 {
            0.5
        } else {
            0.4
        };
        scores.insert("vwap".into(), score);
    }

    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    for (name, score) in &scores {
        let w = match name.as_str() {
            "tpo" => genes.tpo,
            "rsi" => genes.rsi,
            "ib" => genes.ib,
            "cvd" => genes.cvd,
            "vwap" => genes.vwap,
            _ => 0.0,
        };
        weighted += w * score;
        weight_sum += w;
    }
    if weight_sum <= 0.0 {
        return None;
    }
    let confidence = 100.0 * weighted / weight_sum;

    // TPO positioning wins; an RSI extreme decides only when price sits
    // inside value.
    let direction = match tpo_bias {
        TpoBias::Long => Direction::Call,
        TpoBias::Short => Direction::Put,
        TpoBias::Neutral => match technicals.rsi14 {
            Some(rsi) if rsi < 30.0 => Direction::Call,
            Some(rsi) if rsi > 70.0 => Direction::Put,
            _ => return None,
        },
    };

    let strike = match direction {
        Direction::Call => (price * 1.005).round(),
        Direction::Put => (price * 0.995).round(),
    };

    let effective_atr = technicals
        .atr
        .filter(|a| *a > 0.0)
        .unwrap_or(params.atr_fallback);
    let levels = match direction {
        Direction::Call => StockLevels {
            entry: price,
            stop: price - effective_atr * genes.stop_loss_mult,
            target: (price + effective_atr * genes.target_mult).min(if profile.poc > price {
                profile.poc
            } else {
                f64::INFINITY
            }),
        },
        Direction::Put => StockLevels {
            entry: price,
            stop: price + effective_atr * genes.stop_loss_mult,
            target: (price - effective_atr * genes.target_mult).max(if profile.poc < price {
                profile.poc
            } else {
                f64::NEG_INFINITY
            }),
        },
    };

    Some(SignalCandidate {
        direction,
        strike,
        confidence,
        engine: Engine::TpoMit,
        reasoning: Reasoning::TpoMit {
            poc: profile.poc,
            vah: profile.vah,
            val: profile.val,
            tpo_bias: format!("{:?}", tpo_bias).to_uppercase(),
            scores,
        },
        levels,
    })
}
