//! # Lazarus Common
//!
//! Common error types and logging configuration shared by the Lazarus crates.
//!
//! ## Features
//!
//! - Unified error type with error categories
//! - Logging configuration and setup
//! - `ResultExt::context` for wrapping foreign errors

use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for Lazarus.
#[derive(Error, Debug)]
pub enum LazarusError {
    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error wrapped with extra context.
    #[error("{message}: {source}")]
    Context {
        message: String,
        #[source]
        source: BoxedSource,
    },
}

impl LazarusError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error category, used as a structured log field.
    pub fn category(&self) -> &'static str {
        match self {
            LazarusError::Config { .. } => "config",
            LazarusError::Io(_) => "io",
            LazarusError::Context { .. } => "context",
        }
    }
}

/// Result type alias for Lazarus operations.
pub type Result<T> = std::result::Result<T, LazarusError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| LazarusError::Context {
            message: message.into(),
            source: Box::new(e),
        })
    }
}
