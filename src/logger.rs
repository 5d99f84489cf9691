use snafu::ResultExt as _;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::Config;
use crate::error::{ApplicationError, InitializeLoggerSnafu, LogFilterSnafu};

const LOG_FILE_PREFIX: &str = "viewtally.log";

/// Installs the global subscriber: pretty output on stdout plus one JSON file per day
/// under `LOG_DIR`. The guard must live as long as the process or file lines are lost.
pub fn init(config: &Config) -> Result<WorkerGuard, ApplicationError> {
    let env_filter = filter(std::env::var("RUST_LOG").ok(), &config.log_filter)?;
    let (daily_file, guard) = daily_file(config);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().pretty().with_writer(std::io::stdout))
        .with(daily_file);
    tracing::subscriber::set_global_default(subscriber).context(InitializeLoggerSnafu)?;

    tracing::debug!(directory = %config.log_dir.display(), "logging to daily files");
    Ok(guard)
}

/// `RUST_LOG` wins over the configured directives when it is set.
fn filter(env: Option<String>, configured: &str) -> Result<EnvFilter, ApplicationError> {
    let directives = env.filter(|value| !value.trim().is_empty());
    let directives = directives.as_deref().unwrap_or(configured);

    EnvFilter::try_new(directives).context(LogFilterSnafu { directives })
}

fn daily_file<S>(config: &Config) -> (impl Layer<S>, WorkerGuard)
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = fmt::layer().with_ansi(false).json().with_writer(writer);
    (layer, guard)
}
