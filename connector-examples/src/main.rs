/*

Memory Stream Example

This example wires an in-memory destination through the rate limit and batch
middlewares and streams generated records into it.

Usage:
    cargo run -p connector-examples -- \
        --records 500 \
        --batch-size 50 \
        --batch-delay-ms 200 \
        --rate-per-second 20 \
        --burst 5

    # Print the parameters understood by the wrapped destination.
    cargo run -p connector-examples -- --describe

    # Read the settings from configuration/base.yaml, configuration/{env}.yaml and
    # APP_SETTINGS__* environment variables instead.
    APP_ENVIRONMENT=dev cargo run -p connector-examples -- --from-config

Set RUST_LOG=debug to see every batch resolved by the middlewares.

*/

use anyhow::Context as _;
use clap::Parser;
use connector_config::{ConnectorSettings, Environment, load_connector_settings};
use connector_sdk::config::{ConfigMap, format_duration};
use connector_sdk::context::Context;
use connector_sdk::destination::memory::{MemoryDestination, NAME_KEY};
use connector_sdk::destination::{Destination, Record};
use connector_sdk::middleware::{
    BATCH_DELAY_KEY, BATCH_SIZE_KEY, DestinationExt, DestinationWithBatch,
    DestinationWithRateLimit, RATE_BURST_KEY, RATE_PER_SECOND_KEY,
};
use connector_sdk::parameter::validate_config;
use connector_telemetry::{LogFlusher, TracingOptions, init_tracing_with_options};
use futures::stream;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "memory-stream", version, about)]
struct AppArgs {
    /// Number of records to generate
    #[arg(long, default_value = "100")]
    records: usize,
    /// Maximum number of records per batch (0 disables the size limit)
    #[arg(long)]
    batch_size: Option<usize>,
    /// Maximum time a batch waits to fill in milliseconds (0 disables the time limit)
    #[arg(long)]
    batch_delay_ms: Option<u64>,
    /// Maximum writes per second (0 disables rate limiting)
    #[arg(long)]
    rate_per_second: Option<f64>,
    /// Number of writes allowed to go through at once
    #[arg(long)]
    burst: Option<i64>,
    /// Stop writing after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Load the destination settings from the configuration directory
    #[arg(long)]
    from_config: bool,
    /// Print the parameters of the destination and exit
    #[arg(long)]
    describe: bool,
}

impl AppArgs {
    /// Returns the raw configuration described by the command line arguments.
    fn to_config(&self) -> ConfigMap {
        let mut config = ConfigMap::new();
        if let Some(size) = self.batch_size {
            config.insert(BATCH_SIZE_KEY.to_string(), size.to_string());
        }
        if let Some(delay) = self.batch_delay_ms {
            config.insert(
                BATCH_DELAY_KEY.to_string(),
                format_duration(Duration::from_millis(delay)),
            );
        }
        if let Some(rate) = self.rate_per_second {
            config.insert(RATE_PER_SECOND_KEY.to_string(), rate.to_string());
        }
        if let Some(burst) = self.burst {
            config.insert(RATE_BURST_KEY.to_string(), burst.to_string());
        }

        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = AppArgs::parse();

    if std::env::var(connector_config::APP_ENVIRONMENT_ENV_NAME).is_err() {
        Environment::Dev.set();
    }

    let settings = if args.from_config {
        load_connector_settings().context("failed to load the connector settings")?
    } else {
        ConnectorSettings {
            name: "memory-example".to_string(),
            settings: args.to_config(),
        }
    };

    let _log_flusher: LogFlusher = init_tracing_with_options(
        TracingOptions::new("memory_example").with_connector(settings.name.clone()),
    )?;

    if let Err(err) = main_impl(args, settings).await {
        error!("{err:#}");
        std::process::exit(1);
    }

    Ok(())
}

async fn main_impl(args: AppArgs, settings: ConnectorSettings) -> anyhow::Result<()> {
    let memory = MemoryDestination::new();
    let mut destination = memory
        .clone()
        .with(DestinationWithRateLimit::new(10.0, 1))
        .with(DestinationWithBatch::new(25, Duration::from_millis(500)));

    let parameters = destination.parameters();
    if args.describe {
        let mut names: Vec<_> = parameters.keys().collect();
        names.sort();
        for name in names {
            let parameter = &parameters[name];
            println!(
                "{name} ({}, default {:?}): {}",
                parameter.kind, parameter.default, parameter.description
            );
        }

        return Ok(());
    }

    let mut config = settings.settings;
    config
        .entry(NAME_KEY.to_string())
        .or_insert_with(|| settings.name.clone());
    validate_config(&parameters, &config).context("invalid destination configuration")?;

    let (ctx, cancel_handle) = Context::background().with_cancel();
    let ctx = match args.timeout_secs {
        Some(secs) => ctx.with_timeout(Duration::from_secs(secs)),
        None => ctx,
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("ctrl-c received, cancelling the writes");
            cancel_handle.cancel();
        }
    });

    destination
        .configure(&ctx, &mut config)
        .await
        .context("failed to configure the destination")?;
    info!(
        batch_size = destination.settings().size,
        batch_delay = %format_duration(destination.settings().delay),
        rate_limited = destination.inner().limiter().is_some(),
        "destination configured"
    );

    destination.open(&ctx).await?;

    let records = stream::iter(
        (0..args.records).map(|i| Record::with_key(format!("{i}"), format!("record number {i}"))),
    );
    let result = destination.write_stream(&ctx, records).await;

    // Teardown runs even when the stream was interrupted.
    destination.teardown(&Context::background()).await?;

    let written = result.context("failed to write the records")?;
    info!(
        written,
        batches = memory.batches().await.len(),
        "finished writing records"
    );

    Ok(())
}
