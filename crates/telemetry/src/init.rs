// Path: crates/telemetry/src/init.rs
//! Global structured logging initialization (§10.1).

use tracing_subscriber::{fmt, layer::Layered, layer::SubscriberExt, EnvFilter, Layer, Registry};

/// Initializes the global `tracing` subscriber. Output format is selected by
/// `POP_LOG_FORMAT` (`json` or `pretty`, default `json`); level is
/// controlled by `RUST_LOG` via [`EnvFilter`], defaulting to `info`.
pub fn init_tracing() -> Result<(), anyhow::Error> {
    let fmt_layer: Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync> =
        match std::env::var("POP_LOG_FORMAT").as_deref() {
            Ok("pretty") => Box::new(fmt::layer().pretty().with_writer(std::io::stderr).with_target(true)),
            _ => Box::new(
                fmt::layer().json().with_writer(std::io::stderr).with_target(true).with_timer(fmt::time::UtcTime::rfc_3339()),
            ),
        };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing_log::LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
