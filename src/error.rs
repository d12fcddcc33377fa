//! Error taxonomy for the harness.
//!
//! Build and environment errors abort the current attempt; a statistic
//! outside tolerance is a reported result, not an error. Cleanup failures
//! are swallowed at the point they occur and never reach this type.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the harness.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Unified error type for harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A build step exited nonzero.
    #[error("build step '{step}' failed with exit code {code}")]
    Build {
        /// Shell command line of the failing step.
        step: String,
        /// Exit code reported by the child, -1 when killed by a signal.
        code: i32,
    },

    /// An expected input file or directory is missing.
    #[error("missing expected input: {path}")]
    Environment {
        /// Path that was expected to exist.
        path: PathBuf,
    },

    /// A requested component or frame is not declared or absent.
    #[error("component '{component}' is not declared or absent")]
    NotFound {
        /// Component lookup key, e.g. "E/r".
        component: String,
    },

    /// A numeric data or reference file failed to parse as expected.
    #[error("malformed data file {path}: {detail}")]
    Malformed {
        /// Offending file path.
        path: PathBuf,
        /// What was wrong with its contents.
        detail: String,
    },

    /// A configuration template could not be rendered.
    #[error("template '{name}': {detail}")]
    Template {
        /// Template file name.
        name: String,
        /// Unresolved placeholder or read failure description.
        detail: String,
    },

    /// Invalid harness configuration.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the invalid parameter.
        message: String,
    },

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
