//! Indicator kernel - pure numerical functions over candle windows
//!
//! Computes the technical indicators the fuser scores against:
//! - RSI (Wilder's smoothing)
//! - SMA / EMA
//! - VWAP (Volume Weighted Average Price)
//! - ATR (Average True Range, Wilder)
//! - Bollinger Bands
//!
//! Auction-market structure lives in the submodules: TPO profiles in
//! [`tpo`], initial balance and opening-range levels in [`session_range`],
//! volume delta in [`cvd`], and option pricing in [`black_scholes`].
//!
//! Everything here is stateless and deterministic. Insufficient history is
//! not an error: it surfaces as `None` fields which the fuser treats as
//! absent signals.

pub mod black_scholes;
pub mod cvd;
pub mod session_range;
pub mod tpo;

use crate::types::Candle;

/// Nullable bundle of standard technicals for one candle window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TechnicalSnapshot {
    pub rsi14: Option<f64>,
    pub rsi5: Option<f64>,
    pub sma9: Option<f64>,
    pub sma20: Option<f64>,
    pub vwap: Option<f64>,
    pub boll_upper: Option<f64>,
    pub boll_lower: Option<f64>,
    pub atr: Option<f64>,
}

impl TechnicalSnapshot {
    /// Compute the full bundle over a chronological candle window
    pub fn compute(candles: &[Candle]) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let (boll_upper, boll_lower) = match bollinger(&closes, 20, 2.0) {
            Some((u, l)) => (Some(u), Some(l)),
            None => (None, None),
        };
        Self {
            rsi14: rsi(&closes, 14),
            rsi5: rsi(&closes, 5),
            sma9: sma(&closes, 9),
            sma20: sma(&closes, 20),
            vwap: vwap(candles),
            boll_upper,
            boll_lower,
            atr: atr(candles, 14),
        }
    }
}

/// RSI with Wilder's smoothing. Needs `period + 1` closes.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for w in closes[..period + 1].windows(2) {
        let delta = w[1] - w[0];
        if delta > 0.0 {
            avg_gain += delta;
        } else {
            avg_loss += -delta;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    for w in closes[period..].windows(2) {
        let delta = w[1] - w[0];
        let (gain, loss) = if delta > 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Simple moving average over the trailing `period` values
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// Exponential moving average seeded with the SMA of the first `period` values
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut e = values[..period].iter().sum::<f64>() / period as f64;
    for v in &values[period..] {
        e = v * k + e * (1.0 - k);
    }
    Some(e)
}

/// Volume-weighted average price over the window. None if no volume traded.
pub fn vwap(candles: &[Candle]) -> Option<f64> {
    let total_volume: f64 = candles.iter().map(|c| c.volume).sum();
    if total_volume <= 0.0 {
        return None;
    }
    let weighted: f64 = candles.iter().map(|c| c.typical_price() * c.volume).sum();
    Some(weighted / total_volume)
}

/// ATR with Wilder's smoothing. Needs `period + 1` candles.
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let trs: Vec<f64> = candles
        .windows(2)
        .map(|w| w[1].true_range(w[0].close))
        .collect();

    let mut a = trs[..period].iter().sum::<f64>() / period as f64;
    for tr in &trs[period..] {
        a = (a * (period as f64 - 1.0) + tr) / period as f64;
    }
    Some(a)
}

/// VWAP anchored to an arbitrary instant: only candles at or after the
/// anchor contribute. Used to track value from a session event (open,
/// breakout) rather than the whole window.
pub fn anchored_vwap(candles: &[Candle], anchor: chrono::DateTime<chrono::Utc>) -> Option<f64> {
    let anchored: Vec<Candle> = candles.iter().filter(|c| c.ts >= anchor).cloned().collect();
    vwap(&anchored)
}

/// Bollinger Bands: SMA(period) +/- mult * stddev. Returns (upper, lower).
pub fn bollinger(closes: &[f64], period: usize, mult: f64) -> Option<(f64, f64)> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let tail = &closes[closes.len() - period..];
    let mean = tail.iter().sum::<f64>() / period as f64;
    let variance = tail.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / period as f64;
    let sd = variance.sqrt();
    Some((mean + mult * sd, mean - mult * sd))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    use crate::types::Interval;

    /// One-minute candle helper for kernel tests
    pub fn make_candle(i: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            ticker: "SPY".into(),
            ts: Utc.with_ymd_and_hms(2025, 6, 4, 13, 30, 0).unwrap() + Duration::minutes(i),
            interval: Interval::Min1,
            open,
            high,
            low,
            close,
            volume,
            is_complete: true,
        }
    }

    /// Flat series at `price` with unit volume
    pub fn flat_candles(n: usize, price: f64) -> Vec<Candle> {
        (0..n as i64)
            .map(|i| make_candle(i, price, price, price, price, 1.0))
            .collect()
    }
}
