use atlas_types::models::DraftError;
use thiserror::Error;

/// Shown when a failed response carries no `{"message"}` body.
pub const FALLBACK_MESSAGE: &str = "Request failed";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Any non-2xx answer. Terminal for the action; nothing is retried.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Not signed in")]
    NotSignedIn,

    #[error(transparent)]
    Validation(#[from] DraftError),

    #[error("Session file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session file error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_displays_server_message() {
        let err = ClientError::Api {
            status: 403,
            message: "Forbidden".into(),
        };
        assert_eq!(err.to_string(), "Forbidden");
        assert_eq!(err.status(), Some(403));
        assert_eq!(ClientError::NotSignedIn.status(), None);
    }

    #[test]
    fn draft_errors_pass_through() {
        let err: ClientError = DraftError::EmptyName.into();
        assert_eq!(err.to_string(), DraftError::EmptyName.to_string());
    }
}
