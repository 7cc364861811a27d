use crate::config::LoggingConfig;
use sentry::types::Dsn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global tracing subscriber. Events go to stderr so that the
/// `invoke` command can keep stdout for the response body. When a Sentry DSN
/// is configured, error events are also reported to Sentry; the returned
/// guard flushes them on drop.
pub fn init(config: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let dsn = config.map(|c| c.sentry_dsn.parse::<Dsn>());

    let guard = match &dsn {
        Some(Ok(dsn)) => Some(sentry::init(sentry::ClientOptions {
            dsn: Some(dsn.clone()),
            release: sentry::release_name!(),
            ..Default::default()
        })),
        _ => None,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(sentry_layer)
        .init();

    if let Some(Err(e)) = dsn {
        tracing::warn!(error = %e, "Invalid Sentry DSN, error reporting disabled");
    }

    guard
}
