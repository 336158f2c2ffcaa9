//! Command-line interface of the sentinel daemon.

use camino::Utf8PathBuf;
use clap::Parser;
use sentinel_config::{Config, LogFormat};

/// Supervises the worker groups declared in a configuration file.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "sentineld", version)]
pub struct Cli {
    /// Path to the JSON configuration document.
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Utf8PathBuf,
    /// Overrides the configured `tracing` filter expression.
    #[arg(long, value_name = "FILTER")]
    pub log_filter: Option<String>,
    /// Overrides the configured log format (`json` or `compact`).
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded settings.
    pub fn apply(&self, config: &mut Config) {
        if let Some(filter) = &self.log_filter {
            config.log_filter.clone_from(filter);
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;
    use rstest::rstest;

    use super::*;

    #[test]
    fn config_path_is_required() {
        let error = Cli::try_parse_from(["sentineld"]).expect_err("missing --config");
        assert_eq!(error.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[rstest]
    #[case(&["sentineld", "--config", "/etc/sentinel.json"])]
    #[case(&["sentineld", "-c", "/etc/sentinel.json"])]
    fn parses_config_path(#[case] args: &[&str]) {
        let cli = Cli::try_parse_from(args).expect("parse");
        assert_eq!(cli.config, Utf8PathBuf::from("/etc/sentinel.json"));
        assert_eq!(cli.log_filter, None);
        assert_eq!(cli.log_format, None);
    }

    #[test]
    fn overrides_replace_configured_logging() {
        let cli = Cli::try_parse_from([
            "sentineld",
            "--config",
            "sentinel.json",
            "--log-filter",
            "sentinel=debug",
            "--log-format",
            "compact",
        ])
        .expect("parse");
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.log_filter(), "sentinel=debug");
        assert_eq!(config.log_format(), LogFormat::Compact);
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let result = Cli::try_parse_from([
            "sentineld",
            "--config",
            "sentinel.json",
            "--log-format",
            "pretty",
        ]);
        assert!(result.is_err());
    }
}
