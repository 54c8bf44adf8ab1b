//! Structured errors for the imgdup server.
//!
//! None of these reach the client: a failed request is logged and produces no result message.

use imgdup_core::Error;

/// Conditions that stop a clustering request.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Request payload rejected before any work started.
    #[error("INVALID_INPUT: {0}")]
    Validation(String),

    /// Request staging directory could not be created or used.
    #[error("STAGING_FAILED: {0}")]
    Staging(#[source] Error),

    /// The connection's outbound queue is gone.
    #[error("CHANNEL_CLOSED: {0}")]
    ChannelClosed(String),
}

impl From<Error> for PipelineError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(msg) => PipelineError::Validation(msg),
            other => PipelineError::Staging(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_invalid_input_maps_to_validation() {
        let err: PipelineError = Error::InvalidInput("unknown image type".into()).into();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(err.to_string().starts_with("INVALID_INPUT"));
    }

    #[test]
    fn test_io_maps_to_staging() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: PipelineError = Error::io("/tmp/staging", io).into();
        assert!(matches!(err, PipelineError::Staging(_)));
        assert!(err.to_string().contains("STAGING_FAILED"));
    }
}
