use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::core::todo::TodoItem;

use super::error::SyncError;

/// Body of a successful `GET /todos`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListEnvelope {
    pub todos: Vec<TodoItem>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of a successful `POST /todos`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEnvelope {
    pub todo: TodoItem,
    #[serde(default)]
    pub error: Option<String>,
}

pub(crate) trait Envelope {
    fn error(&self) -> Option<&str>;
}

impl Envelope for ListEnvelope {
    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl Envelope for CreateEnvelope {
    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Decode a success body. Anything that does not fit the envelope is a server fault.
pub(crate) fn decode<T: DeserializeOwned + Envelope>(body: &str) -> Result<T, SyncError> {
    let envelope: T = serde_json::from_str(body).map_err(|e| {
        log::error!("Failed to parse the response: {} ({})", body, e);
        SyncError::InternalServerError(format!("undecodable response body: {}", e))
    })?;
    if let Some(msg) = envelope.error().filter(|m| !m.is_empty()) {
        log::warn!("Server reported an error alongside a success status: {}", msg);
    }
    Ok(envelope)
}
