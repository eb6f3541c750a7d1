use std::fmt;
use std::sync::{PoisonError, RwLock};

/// Username and password sent with every request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    credentials: Credentials,
    last_auth_error: Option<String>,
}

/// In-memory credentials for the lifetime of the process. Never written to disk.
///
/// Only [`AuthChallengeCoordinator`](super::auth::AuthChallengeCoordinator) writes here
/// once the app is running; the client only takes snapshots.
#[derive(Debug, Default)]
pub struct CredentialStore {
    state: RwLock<StoreState>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            state: RwLock::new(StoreState {
                credentials,
                last_auth_error: None,
            }),
        }
    }

    /// Copy of the current credentials, taken fresh for every request attempt.
    pub fn snapshot(&self) -> Credentials {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .credentials
            .clone()
    }

    pub fn last_auth_error(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_auth_error
            .clone()
    }

    pub(crate) fn replace(&self, credentials: Credentials) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.credentials = credentials;
        state.last_auth_error = None;
    }

    pub(crate) fn set_last_auth_error(&self, message: &str) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .last_auth_error = Some(message.to_string());
    }

    /// Seed the username before the first request, e.g. from settings.
    pub fn set_username(&self, username: &str) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .credentials
            .username = username.to_string();
    }
}

/// Interactive source of credentials. Both methods may block.
///
/// Implementations can be a modal dialog, a console prompt, or a test double.
pub trait CredentialPrompt: Send + Sync {
    /// Show why credentials are being requested.
    fn display_error(&self, text: &str);

    /// Ask for new credentials. `None` means the user cancelled.
    fn prompt_for_credentials(&self) -> Option<Credentials>;
}
