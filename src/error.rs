//! Error types for adaptive-select operations.
//!
//! Scan kernels validate their buffers up front, so a returned error always means
//! nothing was written past the caller's buffers.

use std::io;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running a selection.
#[derive(Debug, Error)]
pub enum Error {
    /// A strategy identifier could not be resolved to a registered strategy.
    #[error("unknown select strategy '{0}'")]
    UnknownStrategy(String),

    /// A counter name is not one of the supported hardware events.
    #[error("unknown hardware counter '{0}'")]
    UnknownCounter(String),

    /// A hardware counter cannot be configured, or a required counter is missing.
    #[error("hardware counter '{counter}' is unavailable: {message}")]
    CounterUnavailable {
        /// The counter that is unavailable.
        counter: &'static str,
        /// Error message describing the failure.
        message: String,
    },

    /// A configured hardware counter failed to read or reset.
    #[error("failed to read hardware counter '{counter}': {message}")]
    CounterReadFailed {
        /// The counter that failed.
        counter: &'static str,
        /// Error message describing the failure.
        message: String,
    },

    /// The selection buffer cannot hold one entry per input row.
    #[error("selection buffer too small: {rows} input rows, capacity {capacity}")]
    BufferTooSmall {
        /// Number of input rows.
        rows: usize,
        /// Capacity of the selection buffer.
        capacity: usize,
    },

    /// Value and filter inputs differ in length.
    #[error("input length mismatch: values has {values} rows, filter has {filter} rows")]
    InputLengthMismatch {
        /// Length of the value column.
        values: usize,
        /// Length of the filter column.
        filter: usize,
    },

    /// Row positions of the input do not fit the `i32` selection buffer.
    #[error("input of {rows} rows exceeds the maximum of {max} addressable rows")]
    InputTooLarge {
        /// Number of input rows.
        rows: usize,
        /// Maximum supported number of rows.
        max: usize,
    },

    /// A SIMD backend was requested explicitly but the CPU does not support it.
    #[error("SIMD backend '{0}' is not supported on this CPU")]
    BackendUnsupported(&'static str),

    /// Configuration parsing error with line number.
    #[error("configuration error at line {line}: {message}")]
    ConfigParse {
        /// Line number where the error occurred (1-indexed).
        line: usize,
        /// Error message describing the issue.
        message: String,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {0}")]
    ConfigNotFound(String),

    /// Invalid configuration value.
    #[error("invalid configuration value for '{key}': {message}")]
    ConfigInvalid {
        /// The configuration key with invalid value.
        key: String,
        /// Error message describing why the value is invalid.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns true for errors caused by a bad strategy or counter identifier.
    ///
    /// These indicate a configuration bug upstream and should abort the call path.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownStrategy(_)
                | Self::UnknownCounter(_)
                | Self::ConfigParse { .. }
                | Self::ConfigNotFound(_)
                | Self::ConfigInvalid { .. }
        )
    }

    /// Returns true if the error originates from the hardware counter layer.
    #[must_use]
    pub fn is_counter(&self) -> bool {
        matches!(self, Self::CounterUnavailable { .. } | Self::CounterReadFailed { .. })
    }
}
