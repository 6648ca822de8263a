//! Initial balance and opening-range levels
//!
//! The initial balance is the range set by the first hour of regular
//! trading; the opening-range breakout levels come from the first thirty
//! one-minute candles.

use chrono::Duration;

use crate::types::Candle;

/// How the auction opened relative to the initial-balance extremes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpeningType {
    /// One-way move from one extreme to the other
    Drive,
    /// Probed both extremes and settled near the open
    TestDrive,
    /// Opened at an extreme and stayed there
    RejectionReverse,
    /// Two-sided rotation
    Auction,
}

impl std::fmt::Display for OpeningType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OpeningType::Drive => "DRIVE",
            OpeningType::TestDrive => "TEST_DRIVE",
            OpeningType::RejectionReverse => "REJECTION_REVERSE",
            OpeningType::Auction => "AUCTION",
        };
        write!(f, "{}", s)
    }
}

/// First-hour range with its opening classification
#[derive(Debug, Clone, Copy)]
pub struct InitialBalance {
    pub ib_high: f64,
    pub ib_low: f64,
    pub opening_type: OpeningType,
}

impl InitialBalance {
    /// Derive from a chronological window of regular-hours candles.
    /// Only candles within the first `duration_minutes` of the window count.
    pub fn derive(candles: &[Candle], duration_minutes: usize) -> Option<Self> {
        let first = candles.first()?;
        let cutoff = first.ts + Duration::minutes(duration_minutes as i64);
        let window: Vec<&Candle> = candles.iter().take_while(|c| c.ts < cutoff).collect();
        if window.is_empty() {
            return None;
        }

        let ib_high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let ib_low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let width = ib_high - ib_low;
        if width <= 0.0 {
            return Some(Self {
                ib_high,
                ib_low,
                opening_type: OpeningType::Auction,
            });
        }

        let open = window.first().map(|c| c.open)?;
        let close = window.last().map(|c| c.close)?;
        let near = |x: f64, level: f64| (x - level).abs() <= 0.2 * width;

        let opening_type = if (near(open, ib_low) && near(close, ib_high))
            || (near(open, ib_high) && near(close, ib_low))
        {
            OpeningType::Drive
        } else if (near(open, ib_low) && near(close, ib_low))
            || (near(open, ib_high) && near(close, ib_high))
        {
            OpeningType::RejectionReverse
        } else if (close - open).abs() <= 0.2 * width {
            OpeningType::TestDrive
        } else {
            OpeningType::Auction
        };

        Some(Self {
            ib_high,
            ib_low,
            opening_type,
        })
    }

    /// True when a price has broken outside the balance
    pub fn is_breakout(&self, price: f64) -> bool {
        price > self.ib_high || price < self.ib_low
    }
}

/// Opening-range breakout levels from the first thirty one-minute candles
#[derive(Debug, Clone, Copy)]
pub struct OrbLevels {
    pub high: f64,
    pub low: f64,
    pub mid: f64,
    pub range_size: f64,
    pub bull_target1: f64,
    pub bull_target2: f64,
    pub bear_target1: f64,
    pub bear_target2: f64,
    pub long_stop: f64,
    pub short_stop: f64,
}

impl OrbLevels {
    /// Needs at least `duration_minutes` one-minute candles.
    pub fn derive(candles: &[Candle], duration_minutes: usize) -> Option<Self> {
        if candles.len() < duration_minutes {
            return None;
        }
        let window = &candles[..duration_minutes];
        let high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        if low >= high {
            return None;
        }
        let range_size = high - low;
        let mid = (high + low) / 2.0;
        Some(Self {
            high,
            low,
            mid,
            range_size,
            bull_target1: high + range_size,
            bull_target2: high + 2.0 * range_size,
            bear_target1: low - range_size,
            bear_target2: low - 2.0 * range_size,
            long_stop: mid,
            short_stop: mid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::make_candle;

    #[test]
    fn test_orb_needs_thirty_candles() {
        let candles: Vec<Candle> = (0..29)
            .map(|i| make_candle(i, 100.0, 101.0, 99.0, 100.0, 10.0))
            .collect();
        assert!(OrbLevels::derive(&candles, 30).is_none());
    }

    #[test]
    fn test_orb_level_arithmetic() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| make_candle(i, 100.0, 102.0, 98.0, 100.0, 10.0))
            .collect();
        let orb = OrbLevels::derive(&candles, 30).unwrap();
        assert_eq!(orb.high, 102.0);
        assert_eq!(orb.low, 98.0);
        assert_eq!(orb.range_size, 4.0);
        assert_eq!(orb.mid, 100.0);
        assert_eq!(orb.bull_target1, 106.0);
        assert_eq!(orb.bull_target2, 110.0);
        assert_eq!(orb.bear_target1, 94.0);
        assert_eq!(orb.long_stop, 100.0);
        assert_eq!(orb.short_stop, 100.0);
    }

    #[test]
    fn test_ib_drive_up() {
        // Opens at the low, closes at the high
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let p = 100.0 + i as f64 * 0.1;
                make_candle(i, p, p + 0.1, p - 0.05, p + 0.1, 10.0)
            })
            .collect();
        let ib = InitialBalance::derive(&candles, 60).unwrap();
        assert_eq!(ib.opening_type, OpeningType::Drive);
    }

    #[test]
    fn test_ib_rejection_reverse() {
        // Opens at the high, probes lower, closes back at the high
        let mut candles = vec![make_candle(0, 106.0, 106.0, 105.0, 105.5, 10.0)];
        for i in 1..30 {
            candles.push(make_candle(i, 105.0, 105.5, 100.0, 101.0, 10.0));
        }
        for i in 30..60 {
            candles.push(make_candle(i, 101.0, 106.0, 101.0, 105.8, 10.0));
        }
        let ib = InitialBalance::derive(&candles, 60).unwrap();
        assert_eq!(ib.opening_type, OpeningType::RejectionReverse);
    }

    #[test]
    fn test_ib_auction_when_mid_open_directional_close() {
        // Opens mid-range, closes near an extreme without starting there
        let mut candles = vec![make_candle(0, 103.0, 103.5, 102.5, 103.0, 10.0)];
        for i in 1..30 {
            candles.push(make_candle(i, 103.0, 106.0, 100.0, 103.0, 10.0));
        }
        for i in 30..60 {
            candles.push(make_candle(i, 103.0, 105.9, 103.0, 105.5, 10.0));
        }
        let ib = InitialBalance::derive(&candles, 60).unwrap();
        assert_eq!(ib.opening_type, OpeningType::Auction);
    }

    #[test]
    fn test_ib_breakout_flag() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| make_candle(i, 100.0, 102.0, 98.0, 100.0, 10.0))
            .collect();
        let ib = InitialBalance::derive(&candles, 60).unwrap();
        assert!(ib.is_breakout(102.5));
        assert!(ib.is_breakout(97.5));
        assert!(!ib.is_breakout(100.0));
    }
}
