mod api;
mod config;
mod domain;
mod infra;

use crate::{config::PgConfig, infra::PgAccountRepository};
use anyhow::{Context, Result};
use configured::Configured;
use error_ext::StdErrorExt;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{propagation::TraceContextPropagator, runtime, trace, Resource};
use serde::Deserialize;
use serde_json::json;
use std::{fmt::Display, panic};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, error, info, Subscriber};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Variables from a local `.env` file are visible to both configuration sources below.
    let dotenv = dotenvy::dotenv();

    let config = Config::load()
        .context("load configuration")
        .inspect_err(log_error)?;

    init_tracing(config.tracing.clone()).inspect_err(log_error)?;

    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env file"),
        Err(error) => debug!(error = error.as_chain(), "no .env file loaded"),
    }

    // Replace the default panic hook with one that uses structured logging at ERROR level.
    panic::set_hook(Box::new(|panic| error!(%panic, "process panicked")));

    run(config).await.inspect_err(|error| {
        error!(
            error = format!("{error:#}"),
            backtrace = %error.backtrace(),
            "process exited with ERROR"
        )
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Config {
    api: api::Config,
    tracing: TracingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TracingConfig {
    service_name: String,
    otlp_exporter_endpoint: Option<String>,
}

/// Initialize tracing: apply an `EnvFilter` using the `RUST_LOG` environment variable to define the
/// log levels, add a formatter layer logging trace events as JSON and, if an endpoint is
/// configured, an OpenTelemetry layer exporting trace data.
fn init_tracing(config: TracingConfig) -> Result<()> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    global::set_error_handler(|error| error!(error = error.as_chain(), "otel error"))
        .context("set error handler")?;

    let TracingConfig {
        service_name,
        otlp_exporter_endpoint,
    } = config;
    let otlp_layer = otlp_exporter_endpoint
        .map(|endpoint| otlp_layer(service_name, endpoint))
        .transpose()?;

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().json().flatten_event(true))
        .with(otlp_layer)
        .try_init()
        .context("initialize tracing subscriber")
}

/// Create an OTLP layer exporting tracing data.
fn otlp_layer<S>(service_name: String, endpoint: String) -> Result<impl Layer<S>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint);

    let trace_config = trace::config().with_resource(Resource::new(vec![KeyValue::new(
        "service.name",
        service_name,
    )]));

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(trace_config)
        .install_batch(runtime::Tokio)
        .context("install tracer")?;

    Ok(tracing_opentelemetry::layer().with_tracer(tracer))
}

/// Log errors happening before tracing is initialized as a JSON line like the tracing formatter.
fn log_error(error: &impl Display) {
    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string());
    let error = json!({
        "timestamp": now,
        "level": "ERROR",
        "message": "process exited with ERROR",
        "error": format!("{error:#}")
    });
    // Not using `eprintln!`, because `tracing_subscriber::fmt` uses stdout by default.
    println!("{error}");
}

async fn run(config: Config) -> Result<()> {
    info!(?config, "starting");

    let pg_config = PgConfig::from_env().context("load database configuration")?;

    let account_repository = PgAccountRepository::connect(pg_config)
        .await
        .context("connect to database")?;

    account_repository
        .init()
        .await
        .context("initialize accounts table")?;

    api::serve(config.api, account_repository).await
}
