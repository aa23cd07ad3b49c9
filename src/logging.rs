use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Install the global subscriber: compact stderr output, plus plain-text
/// output to `cfg.file` when one is configured.
///
/// `RUST_LOG` takes precedence over the configured level. Stdout is left
/// alone because the terminal display draws there.
pub fn init(cfg: &LoggingConfig) -> Result<()> {
    let filter = build_filter(cfg)?;

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact();

    let file_layer = match &cfg.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .ok();
    Ok(())
}

fn build_filter(cfg: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&cfg.level)
            .with_context(|| format!("invalid log level '{}'", cfg.level)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let cfg = LoggingConfig {
            level: "paper_clock_lib=loud".to_string(),
            file: None,
        };
        assert!(build_filter(&cfg).is_err());
        assert!(build_filter(&LoggingConfig::default()).is_ok());
    }

    #[test]
    fn creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clock.log");
        let cfg = LoggingConfig {
            level: "debug".to_string(),
            file: Some(path.clone()),
        };
        init(&cfg).unwrap();
        assert!(path.exists());
    }
}
