//! Logging and tracing setup.
//!
//! The library only emits `tracing` events; applications that want them
//! printed call [`init_tracing`] once. The filter comes from
//! `MODEL_RUNTIME_LOG`, then `RUST_LOG`, then the configured level.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::LlmError;

pub const LOG_ENV_VAR: &str = "MODEL_RUNTIME_LOG";

#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default filter directive when no env filter is set
    pub level: String,
    /// One JSON object per line
    pub json: bool,
    /// Log to a daily-rolling file in this directory instead of stderr
    pub log_dir: Option<PathBuf>,
    pub with_target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "model_runtime=info".to_string(),
            json: false,
            log_dir: None,
            with_target: true,
        }
    }
}

impl TracingConfig {
    pub fn development() -> Self {
        Self {
            level: "model_runtime=debug".to_string(),
            ..Self::default()
        }
    }

    pub fn minimal() -> Self {
        Self {
            level: "model_runtime=warn".to_string(),
            with_target: false,
            ..Self::default()
        }
    }

    pub fn json_production() -> Self {
        Self {
            json: true,
            ..Self::default()
        }
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV_VAR)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Install a global subscriber. Keep the returned guard alive for the life
/// of the program when logging to a file, or buffered lines are lost.
pub fn init_tracing(config: &TracingConfig) -> Result<Option<WorkerGuard>, LlmError> {
    let (writer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "model-runtime.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(writer), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(config.with_target)
        .with_writer(writer);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| LlmError::ConfigurationError(format!("Failed to install tracing: {e}")))?;
    Ok(guard)
}

/// Mask a secret for logs: first and last four characters kept when the
/// value is long enough, fully masked otherwise.
pub fn mask_sensitive_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_keys() {
        assert_eq!(mask_sensitive_value("sk-1234567890abcdef"), "sk-1...cdef");
        assert_eq!(mask_sensitive_value("short"), "***");
    }

    #[test]
    fn presets_differ() {
        assert!(TracingConfig::json_production().json);
        assert_eq!(TracingConfig::development().level, "model_runtime=debug");
        let with_dir = TracingConfig::default().with_log_dir("/tmp/logs");
        assert!(with_dir.log_dir.is_some());
    }
}
