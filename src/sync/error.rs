use crate::core::todo::{FieldValue, TodoField, TodoId};

pub type Result<T> = std::result::Result<T, SyncError>;

/// Everything that can go wrong talking to the todo server.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("io error: {0}")]
    Io(#[source] reqwest::Error),
    #[error("interrupted while waiting for the server")]
    Interrupted,
    #[error("internal server error: {0}")]
    InternalServerError(String),
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("authorization failed")]
    AuthorizationFailed,
    /// The mirror holds no item with this id; nothing was sent.
    #[error("no todo with id {0}")]
    NotFound(TodoId),
}

impl SyncError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io_error",
            Self::Interrupted => "interrupted_error",
            Self::InternalServerError(_) => "internal_server_error",
            Self::AuthenticationFailed => "authentication_error",
            Self::AuthorizationFailed => "authorization_error",
            Self::NotFound(_) => "not_found",
        }
    }

    /// Text suitable for an error dialog.
    pub fn user_message(&self) -> String {
        match self {
            Self::Io(_) => "Could not reach the server. Check your network connection and try again."
                .to_string(),
            Self::Interrupted => {
                "Communication with the server was interrupted. Please try again shortly."
                    .to_string()
            }
            Self::InternalServerError(_) => {
                "The server ran into a problem. Please contact the server administrator."
                    .to_string()
            }
            Self::AuthenticationFailed => "The username or password is incorrect.".to_string(),
            Self::AuthorizationFailed => {
                "You do not have permission to perform this operation.".to_string()
            }
            Self::NotFound(id) => format!("Todo {} is no longer in the list.", id),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        Self::Io(e)
    }
}

/// A field edit that did not reach the server.
///
/// When the edit had already been applied locally, `restored` holds the value the field
/// was reset to.
#[derive(Debug, thiserror::Error)]
#[error("updating {field} failed: {source}")]
pub struct FieldSyncError {
    pub field: TodoField,
    pub restored: Option<FieldValue>,
    #[source]
    pub source: SyncError,
}
