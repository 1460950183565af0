//! Error types for the lifecycle pipeline.

use crate::model::RecordKind;

/// The result type used throughout closeout-pipeline.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The external delivery call failed before a status was obtained
    /// (connect error, timeout, malformed endpoint).
    #[error("delivery error: {message}")]
    Delivery {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Encoding an archive batch failed.
    #[error("encode error: {message}")]
    Encode {
        /// Description of the failure.
        message: String,
    },

    /// An archive delete affected an unexpected number of rows.
    ///
    /// The batch was rolled back and its artifact compensated; the rows
    /// remain in the live store, safe to retry.
    #[error("archive delete for {kind} affected {actual} rows, expected {expected}")]
    ArchiveInconsistent {
        /// The record kind being archived.
        kind: RecordKind,
        /// Rows the batch contained.
        expected: u64,
        /// Rows the delete reported.
        actual: u64,
    },

    /// Compensation itself failed: the live-store delete failed AND the
    /// just-written artifact could not be removed.
    ///
    /// The artifact named here is orphaned and needs out-of-band cleanup.
    /// This must be surfaced loudly, never swallowed.
    #[error("compensation failed, orphaned artifact at {artifact}: {message}")]
    CompensationFailed {
        /// Key of the orphaned artifact.
        artifact: String,
        /// Description of the underlying failures.
        message: String,
    },

    /// A payload could not be serialized.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An error from closeout-core (storage, lock).
    #[error("core error: {0}")]
    Core(#[from] closeout_core::Error),
}

impl Error {
    /// Creates a new delivery error.
    #[must_use]
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new delivery error with a source.
    #[must_use]
    pub fn delivery_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Delivery {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new encode error.
    #[must_use]
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Returns true for the orphaned-artifact case that requires
    /// out-of-band cleanup.
    #[must_use]
    pub fn is_compensation_failure(&self) -> bool {
        matches!(self, Self::CompensationFailed { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
