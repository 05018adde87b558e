//! Engine error types.

use thiserror::Error;

use phenomatch_loader::LoadError;

/// Errors raised by scoring, storage and job management.
#[derive(Error, Debug)]
pub enum MatchError {
    /// Caller passed arguments that can never be valid (missing patient, bad offset).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Patient id not present in the repository.
    #[error("Patient not found: {id}")]
    PatientNotFound {
        /// The id that was looked up.
        id: String,
    },

    /// Viewer lacks the access needed to see a patient.
    #[error("{viewer_id} may not view patient {patient_id}")]
    AccessDenied {
        /// Requesting user.
        viewer_id: String,
        /// Patient that was requested.
        patient_id: String,
    },

    /// Match id not present in the store.
    #[error("Match not found: {id}")]
    MatchNotFound {
        /// The id that was looked up.
        id: u64,
    },

    /// JSON serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reference data could not be loaded.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// The external exome annotator failed.
    #[error("Exome annotation failed for {patient_id}: {message}")]
    Annotation {
        /// Patient whose job failed.
        patient_id: String,
        /// Failure reported by the annotator.
        message: String,
    },

    /// The external notification channel rejected a message.
    #[error("Notification for {patient_id} failed: {message}")]
    Notification {
        /// Patient whose owners were being notified.
        patient_id: String,
        /// Failure reported by the channel.
        message: String,
    },
}

/// Result type for engine operations.
pub type MatchResult<T> = Result<T, MatchError>;
