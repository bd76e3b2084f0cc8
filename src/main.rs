use std::sync::Arc;

use anyhow::{Context, Result};
use aqi_forecaster::{
    api::OpenMeteoClient,
    config::AppConfig,
    data::OpenMeteoSource,
    ml::{ModelArtifact, Regressor, Trainer, TrainingConfig},
    server,
    service::ForecastContext,
    store::HistoryStore,
    traits::SystemClock,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "aqi-forecaster")]
#[command(about = "Daily AQI collector, trainer and multi-day forecaster")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch past days from Open-Meteo and merge them into the history file
    Backfill {
        /// Number of complete days before today to fetch
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Aggregate today's measured hours and merge them into the history file
    Update,
    /// Train a model on the history file and save it
    Train,
    /// Print a forecast as JSON
    Forecast,
    /// Serve the HTTP API
    Serve,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("aqi_forecaster=debug");

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    match args.command {
        Command::Backfill { days } => rt.block_on(async {
            let source = open_meteo_source(&config)?;
            let summary = source.backfill(days).await?;
            tracing::info!(
                "History now holds {} days ({} before)",
                summary.total,
                summary.before
            );
            Ok::<(), anyhow::Error>(())
        }),
        Command::Update => rt.block_on(async {
            let source = open_meteo_source(&config)?;
            if let Some(summary) = source.update_today().await? {
                tracing::info!("History now holds {} days", summary.total);
            }
            Ok::<(), anyhow::Error>(())
        }),
        Command::Train => rt.block_on(run_train(&config)),
        Command::Forecast => rt.block_on(async {
            let context = forecast_context(&config)?;
            let response = context.generate_response().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&response).context("Failed to encode forecast")?
            );
            Ok::<(), anyhow::Error>(())
        }),
        Command::Serve => rt.block_on(async {
            let context = forecast_context(&config)?;
            server::run_server(context, &config.server).await?;
            Ok::<(), anyhow::Error>(())
        }),
    }
}

fn open_meteo_source(config: &AppConfig) -> Result<OpenMeteoSource> {
    let client = OpenMeteoClient::new(
        config.open_meteo.clone(),
        config.location.clone(),
        &config.network,
    )?;
    Ok(OpenMeteoSource::new(
        HistoryStore::new(&config.data.historical_csv),
        client,
    ))
}

/// Load the model once and wire it to the live data source.
fn forecast_context(config: &AppConfig) -> Result<ForecastContext<OpenMeteoSource>> {
    let artifact = ModelArtifact::load(&config.data.model_path).with_context(|| {
        format!(
            "Failed to load model from {}",
            config.data.model_path.display()
        )
    })?;
    tracing::info!("{}", artifact.summary_line());

    let model: Arc<dyn Regressor> = Arc::new(artifact.model);
    Ok(ForecastContext::new(
        model,
        Arc::new(open_meteo_source(config)?),
        config.forecast.clone(),
        config.data.model_path.clone(),
    ))
}

async fn run_train(config: &AppConfig) -> Result<()> {
    let source = open_meteo_source(config)?;
    let trainer = Trainer::new(TrainingConfig::from(&config.training));
    let artifact = trainer.train_from(&source, &SystemClock).await?;
    artifact.save(&config.data.model_path)?;
    tracing::info!("Model saved to {}", config.data.model_path.display());
    Ok(())
}
