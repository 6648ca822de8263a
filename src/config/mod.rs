//! Configuration management for Aurora
//!
//! Loads from YAML files + environment variables via .env

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub vendor: VendorConfig,
    pub indicators: IndicatorConfig,
    pub fuser: FuserConfig,
    pub risk: RiskConfig,
    pub grading: GradingConfig,
    pub evolution: EvolutionConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Version tag for logging
    pub tag: String,
    /// Primary underlier tracked every trading day
    pub primary_ticker: String,
    /// Additional underliers, scanned on Fridays only
    pub friday_tickers: Vec<String>,
    /// Scheduler tick cadence in seconds
    pub tick_secs: u64,
    /// Grader cadence in seconds (aligned to tick multiples)
    pub grade_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VendorConfig {
    /// Market-data vendor API base URL
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Quote staleness threshold in milliseconds
    pub staleness_ms: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorConfig {
    /// TPO bin size
    pub tick_size: f64,
    /// Value-area mass fraction
    pub value_area_fraction: f64,
    /// Initial-balance duration in minutes
    pub ib_duration_minutes: usize,
    /// Opening-range duration in minutes
    pub orb_duration_minutes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FuserConfig {
    /// Minimum confidence to persist a prediction
    pub confidence_floor: f64,
    /// Weight-cache TTL in seconds
    pub weights_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Fallback stop as a fraction of current premium
    pub stop_loss_pct: f64,
    /// Fallback target as a multiple of current premium
    pub target_multiple: f64,
    /// ATR multiplier for stock-level stops when ATR is present
    pub atr_fallback: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GradingConfig {
    /// Win-rate floor below which retraining triggers
    pub win_rate_floor: f64,
    /// Rolling statistics window in days
    pub rolling_window_days: i64,
    /// Win-rate drop between adjacent weeks that raises an alert
    pub degradation_alert_threshold: f64,
    /// Minimum graded predictions before the alert can fire
    pub min_graded_for_alert: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub elite_count: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub generations: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory for CSV tables
    pub data_dir: String,
    /// Trailing intraday candles persisted per tick
    pub candle_tail: usize,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("pipeline.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("pipeline.primary_ticker", "SPY")?
            .set_default("pipeline.friday_tickers", vec!["QQQ", "IWM"])?
            .set_default("pipeline.tick_secs", 30)?
            .set_default("pipeline.grade_secs", 60)?
            // Vendor defaults
            .set_default("vendor.base_url", "")?
            .set_default("vendor.timeout_secs", 10)?
            .set_default("vendor.staleness_ms", 20000)?
            // Indicator defaults
            .set_default("indicators.tick_size", 0.25)?
            .set_default("indicators.value_area_fraction", 0.70)?
            .set_default("indicators.ib_duration_minutes", 60)?
            .set_default("indicators.orb_duration_minutes", 30)?
            // Fuser defaults
            .set_default("fuser.confidence_floor", 60.0)?
            .set_default("fuser.weights_ttl_secs", 60)?
            // Risk defaults
            .set_default("risk.stop_loss_pct", 0.5)?
            .set_default("risk.target_multiple", 2.0)?
            .set_default("risk.atr_fallback", 2.0)?
            // Grading defaults
            .set_default("grading.win_rate_floor", 0.60)?
            .set_default("grading.rolling_window_days", 7)?
            .set_default("grading.degradation_alert_threshold", 0.10)?
            .set_default("grading.min_graded_for_alert", 10)?
            // Evolution defaults
            .set_default("evolution.population_size", 50)?
            .set_default("evolution.elite_count", 5)?
            .set_default("evolution.mutation_rate", 0.15)?
            .set_default("evolution.crossover_rate", 0.7)?
            .set_default("evolution.generations", 1)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.candle_tail", 5)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (AURORA_*)
            .add_source(Environment::with_prefix("AURORA").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "aurora={} ticker={} friday={:?} tick={}s floor={:.0} data_dir={}",
            self.pipeline.tag,
            self.pipeline.primary_ticker,
            self.pipeline.friday_tickers,
            self.pipeline.tick_secs,
            self.fuser.confidence_floor,
            self.persistence.data_dir
        )
    }

    /// Validate required environment variables for a real run
    pub fn validate_env(&self) -> Result<()> {
        if self.vendor.base_url.is_empty() {
            bail!("vendor.base_url is not configured (set AURORA__VENDOR__BASE_URL)");
        }
        if std::env::var("AURORA_VENDOR_TOKEN").is_err() {
            bail!("Required environment variable AURORA_VENDOR_TOKEN is not set");
        }
        Ok(())
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load() {
        let cfg = AppConfig::load().expect("default config should load");
        assert_eq!(cfg.indicators.tick_size, 0.25);
        assert_eq!(cfg.indicators.value_area_fraction, 0.70);
        assert_eq!(cfg.fuser.confidence_floor, 60.0);
        assert_eq!(cfg.grading.win_rate_floor, 0.60);
        assert_eq!(cfg.evolution.population_size, 50);
    }

    #[test]
    fn test_digest_mentions_ticker() {
        let cfg = AppConfig::load().unwrap();
        assert!(cfg.digest().contains(&cfg.pipeline.primary_ticker));
    }
}
