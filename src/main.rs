//! Aurora daemon entry point

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use aurora::calendar::MarketCalendar;
use aurora::config::AppConfig;
use aurora::evolution::EvolutionEngine;
use aurora::feed::VendorFeed;
use aurora::grader::Grader;
use aurora::parallax::weights::WeightStore;
use aurora::parallax::{EngineParams, SignalFuser};
use aurora::persistence::Repository;
use aurora::risk::RiskProjector;
use aurora::scheduler::{Pipeline, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load().context("load configuration")?;
    info!("starting {}", config.digest());
    config.validate_env().context("validate environment")?;
    let token = std::env::var("AURORA_VENDOR_TOKEN").unwrap_or_default();

    let calendar = MarketCalendar::default();
    let repo = Arc::new(Repository::new(&config.persistence.data_dir)?);
    let feed = Arc::new(VendorFeed::new(
        &config.vendor.base_url,
        &token,
        config.vendor.timeout_secs,
        calendar.clone(),
    ));

    let params = EngineParams {
        tick_size: config.indicators.tick_size,
        value_area_fraction: config.indicators.value_area_fraction,
        ib_duration_minutes: config.indicators.ib_duration_minutes,
        orb_duration_minutes: config.indicators.orb_duration_minutes,
        atr_fallback: config.risk.atr_fallback,
    };
    let weight_store = Arc::new(WeightStore::new(
        repo.clone(),
        Duration::from_secs(config.fuser.weights_ttl_secs),
    ));
    let fuser = SignalFuser::new(weight_store.clone(), params);
    let projector = RiskProjector::new(config.risk.stop_loss_pct, config.risk.target_multiple);

    let optimizer = Arc::new(
        EvolutionEngine::new(
            repo.clone(),
            config.evolution.clone(),
            config.grading.win_rate_floor,
        )
        .with_weight_store(weight_store),
    );
    let grader = Grader::new(
        repo.clone(),
        calendar.clone(),
        optimizer,
        config.grading.rolling_window_days,
        config.grading.degradation_alert_threshold,
        config.grading.min_graded_for_alert,
    );

    let pipeline = Pipeline {
        calendar,
        feed,
        repo,
        fuser,
        grader,
        projector,
        primary_ticker: config.pipeline.primary_ticker.clone(),
        friday_tickers: config.pipeline.friday_tickers.clone(),
        staleness_ms: config.vendor.staleness_ms,
        candle_tail: config.persistence.candle_tail,
        rolling_window_days: config.grading.rolling_window_days,
    };

    let scheduler = Scheduler::new(pipeline, &config, !config.vendor.base_url.is_empty());
    scheduler.start()?;

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutdown requested");
    scheduler.stop().await;
    Ok(())
}
