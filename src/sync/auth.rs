use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::credentials::{CredentialPrompt, CredentialStore};

/// Why the server turned a request away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeReason {
    /// 401: credentials missing or wrong.
    Unauthenticated,
    /// 403: credentials valid but not allowed.
    Forbidden,
}

impl ChallengeReason {
    pub fn from_status(status: StatusCode) -> Option<Self> {
        match status {
            StatusCode::UNAUTHORIZED => Some(Self::Unauthenticated),
            StatusCode::FORBIDDEN => Some(Self::Forbidden),
            _ => None,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "Invalid username or password",
            Self::Forbidden => "Access denied",
        }
    }
}

/// How a credential prompt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// New credentials are in the store; retry.
    Confirmed,
    /// The user gave up.
    Cancelled,
    /// The prompt never produced an answer.
    Interrupted,
}

type PendingPrompt = Shared<BoxFuture<'static, ChallengeOutcome>>;

/// Funnels every 401/403 into at most one open credential prompt.
///
/// Requests that are challenged while a prompt is open join it and all resume with its
/// outcome. Once the prompt resolves the slot is cleared, so a later challenge opens a
/// fresh prompt.
pub struct AuthChallengeCoordinator {
    credentials: Arc<CredentialStore>,
    prompt: Arc<dyn CredentialPrompt>,
    pending: Arc<Mutex<Option<PendingPrompt>>>,
    waiting: AtomicUsize,
}

impl AuthChallengeCoordinator {
    pub fn new(credentials: Arc<CredentialStore>, prompt: Arc<dyn CredentialPrompt>) -> Self {
        Self {
            credentials,
            prompt,
            pending: Arc::new(Mutex::new(None)),
            waiting: AtomicUsize::new(0),
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Number of requests currently blocked on the open prompt.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Ask for credentials, or join the prompt that is already open.
    ///
    /// On [`ChallengeOutcome::Confirmed`] the store already holds the new credentials.
    pub async fn challenge(&self, reason: ChallengeReason) -> ChallengeOutcome {
        let pending = {
            let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(open) => {
                    log::debug!("Joining open credential prompt ({:?})", reason);
                    open.clone()
                }
                None => {
                    let open = self.open_prompt(reason);
                    *slot = Some(open.clone());
                    open
                }
            }
        };

        let _guard = WaitingGuard::enter(&self.waiting);
        pending.await
    }

    /// The prompt runs on its own task, so it finishes, updates the store and frees the
    /// slot even if every request waiting on it is dropped.
    fn open_prompt(&self, reason: ChallengeReason) -> PendingPrompt {
        let message = reason.message();
        log::info!("Server challenged request ({:?}), asking for credentials", reason);
        self.credentials.set_last_auth_error(message);

        let credentials = Arc::clone(&self.credentials);
        let prompt = Arc::clone(&self.prompt);
        let slot = Arc::clone(&self.pending);

        let task = tokio::spawn(async move {
            let answer = tokio::task::spawn_blocking(move || {
                prompt.display_error(message);
                prompt.prompt_for_credentials()
            })
            .await;

            let outcome = match answer {
                Ok(Some(new)) => {
                    log::info!("Credentials updated for user '{}'", new.username);
                    credentials.replace(new);
                    ChallengeOutcome::Confirmed
                }
                Ok(None) => {
                    log::warn!("Credential prompt cancelled");
                    ChallengeOutcome::Cancelled
                }
                Err(e) => {
                    log::error!("Credential prompt did not complete: {}", e);
                    ChallengeOutcome::Interrupted
                }
            };

            slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            outcome
        });

        task.map(|joined| joined.unwrap_or(ChallengeOutcome::Interrupted))
            .boxed()
            .shared()
    }

    #[cfg(test)]
    pub(crate) fn prompt_open(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
