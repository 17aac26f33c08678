//! Process-wide `tracing` subscriber setup for hosts embedding the engine.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Install the global subscriber described by `logging`.
///
/// `RUST_LOG`, when set, takes precedence over the configured level. Calling
/// this twice fails because the global subscriber can only be set once.
pub fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    if !logging.enabled {
        return Ok(());
    }
    if !logging.console && !logging.file {
        anyhow::bail!("logging enabled but both console and file output are off");
    }

    let filter = build_filter(logging, std::env::var("RUST_LOG").ok())?;

    let mut maybe_writer = None;
    if logging.file {
        let dir = log_dir(logging);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create log dir failed: {}", dir.display()))?;

        let file_name = format!("taskweave.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("global tracing subscriber already installed")?;

    Ok(())
}

fn build_filter(logging: &LoggingConfig, rust_log: Option<String>) -> anyhow::Result<EnvFilter> {
    let directives = match rust_log {
        Some(v) if !v.trim().is_empty() => v,
        _ => logging.level.clone(),
    };
    EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid log filter: {directives}"))
}

fn log_dir(logging: &LoggingConfig) -> PathBuf {
    match logging
        .directory
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(d) => PathBuf::from(d),
        None => std::env::temp_dir().join("taskweave"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_overrides_configured_level() {
        let logging = LoggingConfig {
            level: "warn".to_string(),
            ..LoggingConfig::default()
        };

        let configured = build_filter(&logging, None).unwrap();
        assert_eq!(configured.to_string(), "warn");

        let overridden = build_filter(&logging, Some("taskweave_core=debug".into())).unwrap();
        assert_eq!(overridden.to_string(), "taskweave_core=debug");

        let blank = build_filter(&logging, Some("  ".into())).unwrap();
        assert_eq!(blank.to_string(), "warn");
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let logging = LoggingConfig {
            level: "taskweave_core=loud".to_string(),
            ..LoggingConfig::default()
        };
        assert!(build_filter(&logging, None).is_err());
    }

    #[test]
    fn test_disabled_logging_is_a_no_op() {
        let disabled = LoggingConfig {
            enabled: false,
            ..LoggingConfig::default()
        };
        assert!(init_tracing(&disabled).is_ok());

        let silent = LoggingConfig {
            console: false,
            file: false,
            ..LoggingConfig::default()
        };
        assert!(init_tracing(&silent).is_err());
    }

    #[test]
    fn test_log_dir_falls_back_to_temp() {
        let unset = LoggingConfig {
            directory: Some("  ".into()),
            ..LoggingConfig::default()
        };
        assert_eq!(log_dir(&unset), std::env::temp_dir().join("taskweave"));

        let set = LoggingConfig {
            directory: Some("/var/log/taskweave".into()),
            ..LoggingConfig::default()
        };
        assert_eq!(log_dir(&set), PathBuf::from("/var/log/taskweave"));
    }
}
