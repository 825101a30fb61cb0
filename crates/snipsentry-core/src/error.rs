use thiserror::Error;

/// Errors raised while turning collaborator output into typed records.
#[derive(Error, Debug)]
pub enum SnippetError {
    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("Region sequences for {matched_file} differ in length: {lengths:?}")]
    RegionLengthMismatch {
        matched_file: String,
        lengths: [usize; 4],
    },

    #[error("Refusing unsafe repository path: {0}")]
    UnsafePath(String),

    #[error("{collaborator} call failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    #[error("{operation} timed out after {timeout_secs} seconds")]
    Timeout { operation: String, timeout_secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SnippetError {
    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        SnippetError::Collaborator {
            collaborator,
            message: message.into(),
        }
    }
}
