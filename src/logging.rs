use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::Config;

const FALLBACK_FILTER: &str = "info";
const LOG_FILE_PREFIX: &str = "almodon-backend";
const MAX_LOG_FILES: usize = 30;

/// Installs the global subscriber from `config`.
///
/// `config.log_level` is the `RUST_LOG`-style directive string. With
/// `enable_file_logs` set, JSON lines also go to a daily file under `log_dir`; keep the
/// returned guard alive for as long as those should be flushed. A subscriber that is
/// already installed (tests) is left in place.
pub fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let stdout_layer = fmt::layer().with_target(true).with_thread_ids(false);

    let (file_layer, guard) = if config.enable_file_logs {
        match file_writer(Path::new(&config.log_dir)) {
            Ok((writer, guard)) => {
                let layer = fmt::layer().with_writer(writer).with_ansi(false).json();
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!("file logging disabled, cannot open {}: {e}", config.log_dir);
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let result = Registry::default()
        .with(env_filter(&config.log_level))
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
    if let Err(e) = result {
        if !e.to_string().contains("already been set") {
            eprintln!("failed to initialize tracing: {e}");
        }
        return None;
    }

    tracing::debug!(
        log_level = %config.log_level,
        file_logs = config.enable_file_logs,
        log_dir = %config.log_dir,
        "Tracing initialized"
    );
    guard
}

/// Parses `directives`, falling back to `info` when they are malformed.
pub fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|e| {
        eprintln!("invalid log filter {directives:?} ({e}), using {FALLBACK_FILTER}");
        EnvFilter::new(FALLBACK_FILTER)
    })
}

fn file_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard), InitError> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}
