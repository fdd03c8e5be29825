use std::path::PathBuf;

use thiserror::Error;

/// Every way a validation run can go wrong.
///
/// `Parse`, `Network` and `Probe` are recoverable: they are logged and turn
/// the affected file or entry into a skip. `Configuration` and `Write` abort
/// the run.
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("{0}")]
    Configuration(String),

    #[error("Unable to parse playlist {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Quick URL check failed for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Deep probe failed for {url}: {reason}")]
    Probe { url: String, reason: String },

    #[error("Failed to write playlist to file: {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ValidatorError {
    /// Whether this error stops the whole run instead of a single file or entry
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Write { .. })
    }
}

pub type Result<T, E = ValidatorError> = std::result::Result<T, E>;
