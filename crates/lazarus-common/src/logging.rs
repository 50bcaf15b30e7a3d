//! Logging setup for the Lazarus binaries.
//!
//! Output goes to stderr so that command output on stdout stays clean.
//! `RUST_LOG` overrides the computed filter when set.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Crates whose events follow the configured level. Everything else is
/// held at `warn`.
const LAZARUS_TARGETS: &[&str] = &[
    "lazarus_agent",
    "lazarus_core",
    "lazarus_net",
    "lazarus_sw",
];

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-field lines.
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown log format '{other}' (expected pretty, compact or json)"
            )),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level applied to the Lazarus crates.
    pub level: Level,
    pub format: LogFormat,
}

impl LogConfig {
    pub fn new(format: LogFormat) -> Self {
        Self {
            level: Level::INFO,
            format,
        }
    }

    /// Raise the Lazarus crates to `debug` and include source locations.
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.level = Level::DEBUG;
        }
        self
    }

    fn is_verbose(&self) -> bool {
        self.level >= Level::DEBUG
    }

    /// Filter directives used when `RUST_LOG` is not set.
    pub fn directives(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        std::iter::once("warn".to_string())
            .chain(LAZARUS_TARGETS.iter().map(|target| format!("{target}={level}")))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()))
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(LogFormat::default())
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(config: LogConfig) {
    let verbose = config.is_verbose();
    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_file(verbose)
        .with_line_number(verbose);

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => base.boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Json => base.json().boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(config.env_filter())
        .try_init();
}
