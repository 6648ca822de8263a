//! Black-Scholes pricing, greeks, and implied volatility
//!
//! Closed-form European pricing with the normal CDF approximated via the
//! Abramowitz & Stegun error function. Implied volatility is solved by
//! bisection on [0.01, 5.0].

use crate::types::Direction;

/// Theoretical price with first-order sensitivities
#[derive(Debug, Clone, Copy)]
pub struct OptionGreeks {
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
    /// Per calendar day
    pub theta: f64,
    /// Per 1% volatility move
    pub vega: f64,
    /// Per 1% rate move
    pub rho: f64,
}

/// Abramowitz & Stegun 7.1.26 error-function approximation
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

/// Standard normal CDF
fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal PDF
fn norm_pdf(x: f64) -> f64 {
    (-(x * x) / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

fn d1_d2(spot: f64, strike: f64, time: f64, rate: f64, vol: f64) -> (f64, f64) {
    let d1 = ((spot / strike).ln() + (rate + vol * vol / 2.0) * time) / (vol * time.sqrt());
    (d1, d1 - vol * time.sqrt())
}

/// Full pricing with greeks. Returns intrinsic value (zero greeks) at
/// expiry or for degenerate volatility.
pub fn price(
    direction: Direction,
    spot: f64,
    strike: f64,
    time: f64,
    rate: f64,
    vol: f64,
) -> OptionGreeks {
    if time <= 0.0 || vol <= 0.0 {
        let intrinsic = match direction {
            Direction::Call => (spot - strike).max(0.0),
            Direction::Put => (strike - spot).max(0.0),
        };
        return OptionGreeks {
            price: intrinsic,
            delta: 0.0,
            gamma: 0.0,
            theta: 0.0,
            vega: 0.0,
            rho: 0.0,
        };
    }

    let (d1, d2) = d1_d2(spot, strike, time, rate, vol);
    let discount = (-rate * time).exp();
    let pdf_d1 = norm_pdf(d1);
    let gamma = pdf_d1 / (spot * vol * time.sqrt());
    let vega = spot * pdf_d1 * time.sqrt() / 100.0;
    let decay = -spot * pdf_d1 * vol / (2.0 * time.sqrt());

    match direction {
        Direction::Call => OptionGreeks {
            price: spot * norm_cdf(d1) - strike * discount * norm_cdf(d2),
            delta: norm_cdf(d1),
            gamma,
            theta: (decay - rate * strike * discount * norm_cdf(d2)) / 365.0,
            vega,
            rho: strike * time * discount * norm_cdf(d2) / 100.0,
        },
        Direction::Put => OptionGreeks {
            price: strike * discount * norm_cdf(-d2) - spot * norm_cdf(-d1),
            delta: norm_cdf(d1) - 1.0,
            gamma,
            theta: (decay + rate * strike * discount * norm_cdf(-d2)) / 365.0,
            vega,
            rho: -strike * time * discount * norm_cdf(-d2) / 100.0,
        },
    }
}

/// Implied volatility by bisection. Tolerance 1e-4 on price, at most 100
/// iterations, bracket [0.01, 5.0]. None when the market price falls
/// outside the bracketed range.
pub fn implied_volatility(
    market_price: f64,
    direction: Direction,
    spot: f64,
    strike: f64,
    time: f64,
    rate: f64,
) -> Option<f64> {
    const TOLERANCE: f64 = 1e-4;
    const MAX_ITERATIONS: usize = 100;

    if market_price <= 0.0 || spot <= 0.0 || strike <= 0.0 || time <= 0.0 {
        return None;
    }

    let mut lo = 0.01;
    let mut hi = 5.0;
    let price_at = |vol: f64| price(direction, spot, strike, time, rate, vol).price;

    if market_price < price_at(lo) || market_price > price_at(hi) {
        return None;
    }

    for _ in 0..MAX_ITERATIONS {
        let mid = (lo + hi) / 2.0;
        let diff = price_at(mid) - market_price;
        if diff.abs() < TOLERANCE {
            return Some(mid);
        }
        if diff > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    Some((lo + hi) / 2.0)
}

/// One-standard-deviation expected move at horizon `time` (years)
pub fn expected_move(spot: f64, vol: f64, time: f64) -> f64 {
    spot * vol * time.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_call_parity() {
        // C - P = S - K*e^(-rT)
        for (spot, strike, time, rate, vol) in [
            (450.0, 450.0, 30.0 / 365.0, 0.05, 0.18),
            (450.0, 460.0, 7.0 / 365.0, 0.05, 0.35),
            (100.0, 80.0, 1.0, 0.02, 0.6),
        ] {
            let call = price(Direction::Call, spot, strike, time, rate, vol).price;
            let put = price(Direction::Put, spot, strike, time, rate, vol).price;
            let expected = spot - strike * (-rate * time).exp();
            assert!(
                (call - put - expected).abs() < 1e-3,
                "parity violated: {} vs {}",
                call - put,
                expected
            );
        }
    }

    #[test]
    fn test_delta_bounds() {
        let call = price(Direction::Call, 450.0, 450.0, 0.1, 0.05, 0.2);
        assert!(call.delta > 0.0 && call.delta < 1.0);
        let put = price(Direction::Put, 450.0, 450.0, 0.1, 0.05, 0.2);
        assert!(put.delta < 0.0 && put.delta > -1.0);
        // ATM deltas straddle +/- 0.5
        assert!((call.delta - 0.5).abs() < 0.1);
        assert!((put.delta + 0.5).abs() < 0.1);
    }

    #[test]
    fn test_intrinsic_at_expiry() {
        let g = price(Direction::Call, 455.0, 450.0, 0.0, 0.05, 0.2);
        assert_eq!(g.price, 5.0);
        assert_eq!(g.delta, 0.0);
        let g = price(Direction::Put, 445.0, 450.0, 0.0, 0.05, 0.2);
        assert_eq!(g.price, 5.0);
    }

    #[test]
    fn test_implied_volatility_roundtrip() {
        let vol = 0.24;
        let premium = price(Direction::Call, 450.0, 452.0, 14.0 / 365.0, 0.05, vol).price;
        let iv = implied_volatility(premium, Direction::Call, 450.0, 452.0, 14.0 / 365.0, 0.05)
            .unwrap();
        assert!((iv - vol).abs() < 0.01, "iv {} vs {}", iv, vol);
    }

    #[test]
    fn test_implied_volatility_out_of_bracket() {
        // Premium above any price the bracket can produce
        assert!(
            implied_volatility(449.0, Direction::Call, 450.0, 450.0, 7.0 / 365.0, 0.05).is_none()
        );
    }

    #[test]
    fn test_expected_move_scales_with_sqrt_time() {
        let one_day = expected_move(450.0, 0.2, 1.0 / 365.0);
        let four_days = expected_move(450.0, 0.2, 4.0 / 365.0);
        assert!((four_days / one_day - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_theta_is_decay() {
        let g = price(Direction::Call, 450.0, 450.0, 30.0 / 365.0, 0.05, 0.2);
        assert!(g.theta < 0.0);
        assert!(g.vega > 0.0);
        assert!(g.gamma > 0.0);
    }
}
