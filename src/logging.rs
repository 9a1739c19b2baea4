// Logging setup for devboot
use std::io::{self, IsTerminal};
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{CliError, DevbootError, Result};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Level,
    /// Output format (pretty for terminals, json for programmatic use)
    pub format: LogFormat,
    /// Color output configuration
    pub color: ColorConfig,
    /// Whether to show targets (module names)
    pub show_targets: bool,
}

/// Log output format options
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

/// Color output configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ColorConfig {
    Auto,
    Always,
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            color: ColorConfig::Auto,
            show_targets: false,
        }
    }
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }
}

impl LogConfig {
    /// Create logging configuration from CLI arguments
    pub fn from_cli(verbose: bool, quiet: bool, color: Option<String>) -> Self {
        let level = if quiet {
            Level::ERROR
        } else if verbose {
            Level::DEBUG
        } else {
            Level::INFO
        };

        let color_config = match color.as_deref() {
            Some("always") => ColorConfig::Always,
            Some("never") => ColorConfig::Never,
            _ => ColorConfig::Auto,
        };

        Self {
            level,
            format: LogFormat::Pretty,
            color: color_config,
            show_targets: verbose,
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Check if colors should be used based on configuration and terminal
    pub fn should_use_colors(&self) -> bool {
        match self.color {
            ColorConfig::Always => true,
            ColorConfig::Never => false,
            ColorConfig::Auto => {
                io::stderr().is_terminal()
                    && std::env::var("TERM").map_or(true, |term| term != "dumb")
                    && std::env::var("NO_COLOR").is_err()
            }
        }
    }

    /// Filter used when RUST_LOG is not set
    pub fn default_directive(&self) -> String {
        format!("devboot={}", self.level)
    }
}

/// Initialize the logging system with the given configuration
pub fn init_logging(config: LogConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));
    let use_colors = config.should_use_colors();

    let installed = match config.format {
        LogFormat::Pretty => fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .with_ansi(use_colors)
            .with_target(config.show_targets)
            .without_time()
            .try_init(),
        LogFormat::Json => fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .json()
            .try_init(),
        LogFormat::Compact => fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .with_ansi(use_colors)
            .compact()
            .with_target(config.show_targets)
            .try_init(),
    };

    installed.map_err(|e| {
        DevbootError::Cli(Box::new(CliError::RuntimeError {
            message: format!("Failed to initialize logging: {e}"),
        }))
    })
}

/// Spans shared by the resolution flows
pub mod utils {
    use tracing::{span, Level, Span};

    /// Span covering one descriptor's resolution on one platform
    pub fn resolution_span(language: &str, descriptor: &str, platform: &str) -> Span {
        span!(
            Level::INFO,
            "resolution",
            language = %language,
            descriptor = %descriptor,
            platform = %platform
        )
    }

    /// Span covering one provider attempt
    pub fn provider_span(provider: &str) -> Span {
        span!(Level::DEBUG, "provider", provider = %provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.color, ColorConfig::Auto);
        assert!(!config.show_targets);
    }

    #[test]
    fn test_log_config_from_cli_verbose() {
        let config = LogConfig::from_cli(true, false, None);
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.default_directive(), "devboot=DEBUG");
    }

    #[test]
    fn test_log_config_from_cli_quiet() {
        let config = LogConfig::from_cli(false, true, None);
        assert_eq!(config.level, Level::ERROR);
    }

    #[test]
    fn test_log_config_color_options() {
        let always = LogConfig::from_cli(false, false, Some("always".to_string()));
        assert!(always.should_use_colors());

        let never = LogConfig::from_cli(false, false, Some("never".to_string()));
        assert!(!never.should_use_colors());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("compact"), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse("xml"), None);
    }
}
