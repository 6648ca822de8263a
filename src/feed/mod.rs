//! Market feed adapter
//!
//! Wraps the market-data vendor behind the [`MarketFeed`] trait and
//! normalizes vendor JSON into internal shapes. Transient vendor failures
//! surface as empty results so a bad cycle degrades instead of aborting.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::calendar::MarketCalendar;
use crate::types::{Candle, Direction, Interval, OptionContract, Quote};

/// Read-only market data source
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn quote(&self, ticker: &str) -> Option<Quote>;

    /// Batched quotes; tickers that fail are simply absent from the result
    async fn quotes(&self, tickers: &[String]) -> Vec<Quote>;

    /// Today's intraday candles, filtered to regular trading hours
    async fn intraday_candles(&self, ticker: &str, interval: Interval) -> Vec<Candle>;

    async fn historical_candles(
        &self,
        ticker: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Candle>;

    async fn option_expirations(&self, ticker: &str) -> Vec<NaiveDate>;

    async fn option_chain(&self, ticker: &str, expiration: NaiveDate) -> Vec<OptionContract>;
}

// ─────────────────────────────────────────────────────────────────
// Vendor wire shapes
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct VendorQuote {
    symbol: String,
    bid: f64,
    ask: f64,
    last: f64,
    #[serde(default)]
    size: f64,
    /// Milliseconds since epoch
    ts: i64,
}

#[derive(Debug, Deserialize)]
struct VendorCandle {
    /// Bar open, milliseconds since epoch
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

#[derive(Debug, Deserialize)]
struct VendorCandleResponse {
    #[serde(default)]
    candles: Vec<VendorCandle>,
}

#[derive(Debug, Deserialize)]
struct VendorQuoteResponse {
    #[serde(default)]
    quotes: Vec<VendorQuote>,
}

#[derive(Debug, Deserialize)]
struct VendorExpirationResponse {
    #[serde(default)]
    expirations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VendorOptionRow {
    strike: f64,
    #[serde(rename = "type")]
    option_type: String,
    bid: f64,
    ask: f64,
    #[serde(default)]
    iv: Option<f64>,
    #[serde(default)]
    delta: Option<f64>,
    #[serde(default)]
    gamma: Option<f64>,
    #[serde(default)]
    open_interest: f64,
    #[serde(default)]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct VendorChainResponse {
    #[serde(default)]
    contracts: Vec<VendorOptionRow>,
}

fn parse_quote(raw: VendorQuote) -> Option<Quote> {
    if !raw.last.is_finite() || raw.last < 0.0 {
        return None;
    }
    let ts = Utc.timestamp_millis_opt(raw.ts).single()?;
    Some(Quote {
        ticker: raw.symbol,
        ts,
        bid: raw.bid,
        ask: raw.ask,
        last: raw.last,
        size: raw.size,
    })
}

fn parse_candle(ticker: &str, interval: Interval, raw: &VendorCandle) -> Option<Candle> {
    let ts = Utc.timestamp_millis_opt(raw.t).single()?;
    let (lo, hi) = (raw.l, raw.h);
    if !(lo <= raw.o.min(raw.c) && raw.o.max(raw.c) <= hi) || raw.v < 0.0 {
        return None;
    }
    Some(Candle {
        ticker: ticker.to_string(),
        ts,
        interval,
        open: raw.o,
        high: hi,
        low: lo,
        close: raw.c,
        volume: raw.v,
        is_complete: true,
    })
}

// ─────────────────────────────────────────────────────────────────
// HTTP implementation
// ─────────────────────────────────────────────────────────────────

/// HTTP client for the market-data vendor
pub struct VendorFeed {
    client: Client,
    base_url: String,
    calendar: MarketCalendar,
}

impl VendorFeed {
    pub fn new(base_url: &str, token: &str, timeout_secs: u64, calendar: MarketCalendar) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(auth) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            headers.insert(AUTHORIZATION, auth);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            calendar,
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()
            .with_context(|| format!("GET {}", url))?;
        response.json::<T>().await.context("decode vendor response")
    }

    async fn fetch_candles(&self, ticker: &str, interval: Interval, path: String) -> Vec<Candle> {
        match self.get_json::<VendorCandleResponse>(&path).await {
            Ok(body) => body
                .candles
                .iter()
                .filter_map(|raw| parse_candle(ticker, interval, raw))
                .collect(),
            Err(e) => {
                warn!("candle fetch failed for {}: {:#}", ticker, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl MarketFeed for VendorFeed {
    async fn quote(&self, ticker: &str) -> Option<Quote> {
        self.quotes(&[ticker.to_string()]).await.into_iter().next()
    }

    async fn quotes(&self, tickers: &[String]) -> Vec<Quote> {
        if tickers.is_empty() {
            return Vec::new();
        }
        let path = format!("/v1/quotes?symbols={}", tickers.join(","));
        match self.get_json::<VendorQuoteResponse>(&path).await {
            Ok(body) => body.quotes.into_iter().filter_map(parse_quote).collect(),
            Err(e) => {
                warn!("quote fetch failed for {:?}: {:#}", tickers, e);
                Vec::new()
            }
        }
    }

    async fn intraday_candles(&self, ticker: &str, interval: Interval) -> Vec<Candle> {
        let path = format!("/v1/candles?symbol={}&interval={}&range=today", ticker, interval);
        let candles = self.fetch_candles(ticker, interval, path).await;
        // Vendor feeds include pre/post prints; the kernel only wants RTH
        candles
            .into_iter()
            .filter(|c| self.calendar.session_at(c.ts).is_trading())
            .collect()
    }

    async fn historical_candles(
        &self,
        ticker: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Candle> {
        let path = format!(
            "/v1/candles?symbol={}&interval={}&start={}&end={}",
            ticker,
            interval,
            start.timestamp_millis(),
            end.timestamp_millis()
        );
        self.fetch_candles(ticker, interval, path).await
    }

    async fn option_expirations(&self, ticker: &str) -> Vec<NaiveDate> {
        let path = format!("/v1/options/expirations?symbol={}", ticker);
        match self.get_json::<VendorExpirationResponse>(&path).await {
            Ok(body) => body
                .expirations
                .iter()
                .filter_map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .collect(),
            Err(e) => {
                warn!("expiration fetch failed for {}: {:#}", ticker, e);
                Vec::new()
            }
        }
    }

    async fn option_chain(&self, ticker: &str, expiration: NaiveDate) -> Vec<OptionContract> {
        let path = format!(
            "/v1/options/chain?symbol={}&expiration={}",
            ticker,
            expiration.format("%Y-%m-%d")
        );
        match self.get_json::<VendorChainResponse>(&path).await {
            Ok(body) => body
                .contracts
                .into_iter()
                .filter_map(|row| {
                    let direction = Direction::parse(&row.option_type)?;
                    if row.strike <= 0.0 {
                        return None;
                    }
                    Some(OptionContract {
                        ticker: ticker.to_string(),
                        expiration,
                        strike: row.strike,
                        direction,
                        bid: row.bid,
                        ask: row.ask,
                        iv: row.iv,
                        delta: row.delta,
                        gamma: row.gamma,
                        open_interest: row.open_interest,
                        volume: row.volume,
                    })
                })
                .collect(),
            Err(e) => {
                warn!("chain fetch failed for {} {}: {:#}", ticker, expiration, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_candle_rejects_inverted_range() {
        let raw = VendorCandle {
            t: 1_749_044_400_000,
            o: 100.0,
            h: 99.0,
            l: 101.0,
            c: 100.0,
            v: 10.0,
        };
        assert!(parse_candle("SPY", Interval::Min1, &raw).is_none());
    }

    #[test]
    fn test_parse_candle_accepts_well_formed_bar() {
        let raw = VendorCandle {
            t: 1_749_044_400_000,
            o: 100.0,
            h: 101.0,
            l: 99.5,
            c: 100.5,
            v: 1200.0,
        };
        let candle = parse_candle("SPY", Interval::Min1, &raw).unwrap();
        assert_eq!(candle.ticker, "SPY");
        assert!(candle.low <= candle.open.min(candle.close));
    }

    #[test]
    fn test_parse_quote_rejects_negative_last() {
        let raw = VendorQuote {
            symbol: "SPY".into(),
            bid: 449.0,
            ask: 449.1,
            last: -1.0,
            size: 0.0,
            ts: 1_749_044_400_000,
        };
        assert!(parse_quote(raw).is_none());
    }
}
