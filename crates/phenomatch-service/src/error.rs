//! Service error types and their gRPC mapping.

use std::io;

use thiserror::Error;
use tonic::Status;

use phenomatch_engine::MatchError;
use phenomatch_loader::LoadError;

/// Errors raised while starting or running the service.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// File system error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed patient file.
    #[error("Invalid patient file: {0}")]
    Json(#[from] serde_json::Error),

    /// Reference data could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Engine operation failed.
    #[error(transparent)]
    Match(#[from] MatchError),

    /// Environment variable with an unusable value.
    #[error("Invalid value for {name}: {value}")]
    Config {
        /// Variable name.
        name: String,
        /// Rejected value.
        value: String,
    },
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Maps an engine error onto a gRPC status.
pub(crate) fn to_status(error: MatchError) -> Status {
    match &error {
        MatchError::InvalidArgument(_) => Status::invalid_argument(error.to_string()),
        MatchError::PatientNotFound { .. } | MatchError::MatchNotFound { .. } => {
            Status::not_found(error.to_string())
        }
        MatchError::AccessDenied { .. } => Status::permission_denied(error.to_string()),
        _ => Status::internal(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_status_mapping() {
        let status = to_status(MatchError::InvalidArgument("fromIndex(-1) < 0".into()));
        assert_eq!(status.code(), Code::InvalidArgument);

        let status = to_status(MatchError::MatchNotFound { id: 3 });
        assert_eq!(status.code(), Code::NotFound);

        let status = to_status(MatchError::AccessDenied {
            viewer_id: "mallory".into(),
            patient_id: "P0000001".into(),
        });
        assert_eq!(status.code(), Code::PermissionDenied);

        let status = to_status(MatchError::Annotation {
            patient_id: "P0000001".into(),
            message: "tool crashed".into(),
        });
        assert_eq!(status.code(), Code::Internal);
    }
}
