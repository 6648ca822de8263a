//! TPO profile construction (POC / VAH / VAL)
//!
//! Bins each candle's volume uniformly across the price ticks it spans,
//! then grows the value area outward from the point of control until it
//! holds the configured fraction of total mass.

use std::collections::BTreeMap;

use crate::types::Candle;

/// Session impulse read from the window's net move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impulse {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Impulse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Impulse::Bullish => "BULLISH",
            Impulse::Bearish => "BEARISH",
            Impulse::Neutral => "NEUTRAL",
        };
        write!(f, "{}", s)
    }
}

/// Positional bias of a price relative to the value area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpoBias {
    /// Price below value: responsive buying expected
    Long,
    /// Price above value: responsive selling expected
    Short,
    Neutral,
}

/// Volume-at-price profile for one candle window
#[derive(Debug, Clone)]
pub struct TpoProfile {
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub impulse: Impulse,
    /// Mass per tick index; price = index * tick_size
    pub histogram: BTreeMap<i64, f64>,
    pub total_mass: f64,
    /// (session low, session high)
    pub range: (f64, f64),
    pub tick_size: f64,
}

impl TpoProfile {
    /// Build a profile from a chronological candle window.
    /// Returns None on an empty window or a non-positive tick size.
    pub fn build(candles: &[Candle], tick_size: f64, value_area_fraction: f64) -> Option<Self> {
        if candles.is_empty() || tick_size <= 0.0 {
            return None;
        }

        let mut histogram: BTreeMap<i64, f64> = BTreeMap::new();
        let mut total_mass = 0.0;

        for c in candles {
            let lo = (c.low / tick_size).round() as i64;
            let hi = (c.high / tick_size).round() as i64;
            let hi = hi.max(lo);
            let per_tick = c.volume / (hi - lo + 1) as f64;
            for idx in lo..=hi {
                *histogram.entry(idx).or_insert(0.0) += per_tick;
            }
            total_mass += c.volume;
        }

        // POC: maximum mass, lowest tick on ties
        let poc_idx = histogram
            .iter()
            .fold(None::<(i64, f64)>, |best, (&idx, &mass)| match best {
                Some((_, best_mass)) if mass <= best_mass => best,
                _ => Some((idx, mass)),
            })
            .map(|(idx, _)| idx)?;

        let (val_idx, vah_idx) =
            expand_value_area(&histogram, poc_idx, total_mass * value_area_fraction);

        let session_low = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let session_high = candles
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max);

        let first = candles.first()?;
        let last = candles.last()?;
        let range = session_high - session_low;
        let net = last.close - first.open;
        let impulse = if range <= 0.0 || net.abs() / range < 0.1 {
            Impulse::Neutral
        } else if net > 0.0 {
            Impulse::Bullish
        } else {
            Impulse::Bearish
        };

        Some(Self {
            poc: poc_idx as f64 * tick_size,
            vah: vah_idx as f64 * tick_size,
            val: val_idx as f64 * tick_size,
            impulse,
            histogram,
            total_mass,
            range: (session_low, session_high),
            tick_size,
        })
    }

    /// Mass captured inside [VAL, VAH]
    pub fn value_area_mass(&self) -> f64 {
        let val_idx = (self.val / self.tick_size).round() as i64;
        let vah_idx = (self.vah / self.tick_size).round() as i64;
        self.histogram
            .range(val_idx..=vah_idx)
            .map(|(_, &m)| m)
            .sum()
    }

    /// Directional bias of a price against the value area
    pub fn bias(&self, price: f64) -> TpoBias {
        if price > self.vah {
            TpoBias::Short
        } else if price < self.val {
            TpoBias::Long
        } else {
            TpoBias::Neutral
        }
    }
}

/// Grow [val, vah] outward from the POC, taking the richer adjacent
/// occupied tick each step (downward on ties), until the captured mass
/// reaches the target.
fn expand_value_area(histogram: &BTreeMap<i64, f64>, poc_idx: i64, target: f64) -> (i64, i64) {
    let mut val = poc_idx;
    let mut vah = poc_idx;
    let mut captured = histogram.get(&poc_idx).copied().unwrap_or(0.0);

    loop {
        if captured >= target {
            break;
        }
        let below = histogram.range(..val).next_back().map(|(&i, &m)| (i, m));
        let above = histogram.range(vah + 1..).next().map(|(&i, &m)| (i, m));

        match (below, above) {
            (None, None) => break,
            (Some((i, m)), None) => {
                val = i;
                captured += m;
            }
            (None, Some((i, m))) => {
                vah = i;
                captured += m;
            }
            (Some((bi, bm)), Some((ai, am))) => {
                if bm >= am {
                    val = bi;
                    captured += bm;
                } else {
                    vah = ai;
                    captured += am;
                }
            }
        }
    }

    (val, vah)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::make_candle;

    /// Symmetric bell of one-minute candles around `center`
    fn bell_candles(n: usize, center: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                // Distance from the middle of the window drives volume
                let t = i as f64 / (n - 1) as f64;
                let weight = (-(t - 0.5).powi(2) / 0.02).exp();
                let offset = (t - 0.5) * 4.0;
                let price = center + offset * (1.0 - weight);
                make_candle(
                    i as i64,
                    price,
                    price + 0.25,
                    price - 0.25,
                    price,
                    100.0 + 900.0 * weight,
                )
            })
            .collect()
    }

    #[test]
    fn test_bell_profile_poc_near_center() {
        let candles = bell_candles(60, 450.0);
        let profile = TpoProfile::build(&candles, 0.25, 0.70).unwrap();
        assert!((profile.poc - 450.0).abs() <= 0.5, "poc {}", profile.poc);
        assert!(profile.vah - profile.val <= 2.0);
        assert!(profile.val <= profile.poc && profile.poc <= profile.vah);
    }

    #[test]
    fn test_value_area_coverage() {
        let candles = bell_candles(60, 450.0);
        let profile = TpoProfile::build(&candles, 0.25, 0.70).unwrap();
        assert!(profile.value_area_mass() >= 0.70 * profile.total_mass);
    }

    #[test]
    fn test_value_area_ordering_holds_on_skewed_window() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let p = 100.0 + i as f64 * 0.1;
                make_candle(i, p, p + 0.3, p - 0.3, p + 0.1, 50.0 + i as f64 * 10.0)
            })
            .collect();
        let profile = TpoProfile::build(&candles, 0.25, 0.70).unwrap();
        assert!(profile.val <= profile.poc && profile.poc <= profile.vah);
        assert!(profile.value_area_mass() >= 0.70 * profile.total_mass);
    }

    #[test]
    fn test_poc_lowest_tick_tiebreak() {
        // Two candles with identical mass at two distinct prices
        let candles = vec![
            make_candle(0, 100.0, 100.0, 100.0, 100.0, 500.0),
            make_candle(1, 101.0, 101.0, 101.0, 101.0, 500.0),
        ];
        let profile = TpoProfile::build(&candles, 0.25, 0.70).unwrap();
        assert_eq!(profile.poc, 100.0);
    }

    #[test]
    fn test_empty_window_is_none() {
        assert!(TpoProfile::build(&[], 0.25, 0.70).is_none());
    }

    #[test]
    fn test_bias_against_value_area() {
        let candles = bell_candles(60, 450.0);
        let profile = TpoProfile::build(&candles, 0.25, 0.70).unwrap();
        assert_eq!(profile.bias(profile.vah + 1.0), TpoBias::Short);
        assert_eq!(profile.bias(profile.val - 1.0), TpoBias::Long);
        assert_eq!(profile.bias(profile.poc), TpoBias::Neutral);
    }

    #[test]
    fn test_impulse_classification() {
        // Strong one-way drive
        let up: Vec<Candle> = (0..30)
            .map(|i| {
                let p = 100.0 + i as f64 * 0.5;
                make_candle(i, p, p + 0.6, p - 0.1, p + 0.5, 100.0)
            })
            .collect();
        let profile = TpoProfile::build(&up, 0.25, 0.70).unwrap();
        assert_eq!(profile.impulse, Impulse::Bullish);

        // Round trip ends where it started
        let flat: Vec<Candle> = (0..30)
            .map(|i| {
                let p = 100.0 + (i as f64 * std::f64::consts::TAU / 29.0).sin() * 2.0;
                make_candle(i, p, p + 0.3, p - 0.3, p, 100.0)
            })
            .collect();
        let profile = TpoProfile::build(&flat, 0.25, 0.70).unwrap();
        assert_eq!(profile.impulse, Impulse::Neutral);
    }
}
