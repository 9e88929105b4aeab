use anyhow::Result;
use tracing_subscriber::{
    fmt::{format::FmtSpan, Layer as FmtLayer},
    layer::SubscriberExt as _,
    EnvFilter, Registry,
};

/// The environment variable holding the log filter, e.g. `debug` or
/// `graphops_resources_msgraph::rest=trace`.
pub const LOG_ENV: &str = "GRAPHOPS_LOG";

/// Log to stderr; stdout belongs to the provider protocol.
pub fn set_up() -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    // announce what we do and when we're done
    let fmt_layer = FmtLayer::new()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_ansi(false);
    let subscriber = Registry::default().with(filter).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("failed to set up tracing: {}", e))?;

    Ok(())
}
