//! Cumulative volume delta
//!
//! Signed per-bar volume weighted by body-to-range ratio; a running sum
//! that diverges from price flags exhaustion.

use crate::types::Candle;

/// Window-level CVD summary
#[derive(Debug, Clone, Copy)]
pub struct CvdSummary {
    pub cumulative: f64,
    /// Price direction over the window disagrees with CVD direction
    pub divergence: bool,
}

/// Signed delta contribution of one candle
pub fn candle_delta(c: &Candle) -> f64 {
    let range = c.high - c.low;
    if range <= 0.0 {
        return 0.0;
    }
    let body = c.close - c.open;
    body.signum() * c.volume * body.abs() / range
}

/// Cumulative delta with divergence flag over a chronological window
pub fn cumulative(candles: &[Candle]) -> Option<CvdSummary> {
    let first = candles.first()?;
    let last = candles.last()?;

    let cumulative: f64 = candles.iter().map(candle_delta).sum();
    let price_move = last.close - first.open;
    let divergence = price_move != 0.0 && cumulative != 0.0 && price_move.signum() != cumulative.signum();

    Some(CvdSummary {
        cumulative,
        divergence,
    })
}
