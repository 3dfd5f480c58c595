use thiserror::Error;

/// Errors produced while fetching, classifying and writing playlists.
///
/// Page- and group-level errors are logged and skipped by the pipeline; the
/// rest end the pipeline for the playlist they occurred in.
#[derive(Error, Debug)]
pub enum SplitError {
    /// Network failure or timeout. The only class the pipeline retries.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service answered with a non-2xx status.
    #[error("Upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    /// A response body did not have the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Classification failed: {0}")]
    Classification(String),

    /// The classifier output contained no `{`.
    #[error("No JSON payload found in classifier output")]
    NoPayloadFound,

    #[error("Malformed classifier payload: {0}")]
    MalformedPayload(String),

    #[error("No pages could be fetched for playlist {playlist_id}")]
    AggregationFailed { playlist_id: String },

    /// Some windows of an append were written before one failed. Written
    /// windows stay in the playlist.
    #[error("Partial write to playlist {playlist_id}: {written}/{total} tracks written ({cause})")]
    PartialWrite {
        playlist_id: String,
        written: usize,
        total: usize,
        cause: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Credential unavailable: {0}")]
    Credential(String),
}

impl SplitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SplitError::Transport(_))
    }
}

impl From<ureq::Error> for SplitError {
    fn from(error: ureq::Error) -> Self {
        match error {
            ureq::Error::Status(status, response) => SplitError::Upstream {
                status,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => SplitError::Transport(transport.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SplitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_errors_become_upstream() {
        let response = ureq::Response::new(503, "Service Unavailable", "try later").unwrap();
        let error: SplitError = ureq::Error::Status(503, response).into();

        match error {
            SplitError::Upstream { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "try later");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[test]
    fn test_only_transport_errors_are_retryable() {
        assert!(SplitError::Transport("timed out".to_string()).is_retryable());
        assert!(
            !SplitError::Upstream {
                status: 500,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!SplitError::Decode("bad".to_string()).is_retryable());
        assert!(!SplitError::Cancelled.is_retryable());
    }
}
