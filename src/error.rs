//! Error types for signature synthesis.
//!
//! Pure analysis never fails: out-of-range targets and too-short byte
//! windows produce empty results. The errors here are raised by the
//! operation envelopes when an empty result has to become caller-visible,
//! and by the parser when an explicit format hint is unknown.

use thiserror::Error;

/// Primary error type for signature operations.
#[derive(Debug, Error)]
pub enum SigError {
    /// IO error reading input.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No line of the input survived parsing.
    #[error("no valid instructions found in input")]
    NoInstructions,

    /// Target selection matched nothing.
    #[error("no targets found matching selection criteria")]
    NoTargets,

    /// An explicit format hint that is not one of the accepted values.
    #[error("unknown input format: {hint}")]
    UnknownFormat { hint: String },

    /// An export format name that no emitter handles.
    #[error("unknown export format: {name}")]
    UnknownExportFormat { name: String },
}

/// Result type alias for signature operations.
pub type Result<T> = std::result::Result<T, SigError>;
