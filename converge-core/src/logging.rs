use tracing_subscriber::{EnvFilter, fmt};

/// Output shape for the installed tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for local development.
    Pretty,
    /// Line-delimited JSON, for production hosting.
    Json,
}

/// Install a global `tracing` subscriber driven by `RUST_LOG` (defaulting to
/// `info`), in either pretty or JSON form. Intended to be called once, early
/// in process startup, by the embedding application — the core crates never
/// call this themselves, only emit events.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Pretty => subscriber.try_init(),
        LogFormat::Json => subscriber.json().try_init(),
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
}
