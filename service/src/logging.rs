use crate::config::Config;
use log::{LevelFilter, SetLoggerError};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Modules to filter out from logging when not in Trace mode.
/// The HTTP and WebSocket stacks log every connection and frame.
const FILTERED_MODULES: &[&str] = &[
    "reqwest",
    "hyper",
    "hyper_util",
    "tungstenite",
    "tokio_tungstenite",
    "rustls",
];

pub struct Logger {}

impl Logger {
    /// Installs the global terminal logger.
    ///
    /// Trace shows everything including transport crates; every other level hides them.
    /// Production output is uncolored so log collectors don't see escape codes.
    pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
        let level = config.log_level_filter;
        let log_config = Self::build_log_config(Self::should_filter_dependencies(level));

        TermLogger::init(
            level,
            log_config,
            TerminalMode::Mixed,
            Self::color_choice(config.is_production()),
        )
    }

    fn should_filter_dependencies(level: LevelFilter) -> bool {
        level != LevelFilter::Trace
    }

    fn color_choice(is_production: bool) -> ColorChoice {
        if is_production {
            ColorChoice::Never
        } else {
            ColorChoice::Auto
        }
    }

    fn build_log_config(apply_filters: bool) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();

        if apply_filters {
            for module in FILTERED_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_filtered_modules_cover_transport_crates() {
        for module in ["reqwest", "hyper", "tungstenite", "tokio_tungstenite"] {
            assert!(
                FILTERED_MODULES.contains(&module),
                "{module} should be filtered"
            );
        }
    }

    #[test]
    fn test_only_trace_disables_dependency_filtering() {
        assert!(!Logger::should_filter_dependencies(LevelFilter::Trace));
        for level in [
            LevelFilter::Off,
            LevelFilter::Error,
            LevelFilter::Warn,
            LevelFilter::Info,
            LevelFilter::Debug,
        ] {
            assert!(Logger::should_filter_dependencies(level), "{level} should filter");
        }
    }

    #[test]
    fn test_production_logs_without_color() {
        let production =
            Config::try_parse_from(["permit-client", "--runtime-env", "production"]).unwrap();
        let staging = Config::try_parse_from(["permit-client", "--runtime-env", "staging"]).unwrap();

        assert!(matches!(
            Logger::color_choice(production.is_production()),
            ColorChoice::Never
        ));
        assert!(matches!(
            Logger::color_choice(staging.is_production()),
            ColorChoice::Auto
        ));
    }

    #[test]
    fn test_build_log_config_does_not_panic() {
        let _filtered = Logger::build_log_config(true);
        let _unfiltered = Logger::build_log_config(false);
    }
}
