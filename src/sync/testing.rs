use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::auth::AuthChallengeCoordinator;
use super::client::RemoteClient;
use super::credentials::{CredentialPrompt, CredentialStore, Credentials};

/// Answers prompts from a fixed script. Runs out → cancels.
pub(crate) struct ScriptedPrompt {
    answers: Mutex<VecDeque<Option<Credentials>>>,
    prompts: AtomicUsize,
    errors: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub(crate) fn new(answers: impl IntoIterator<Item = Option<Credentials>>) -> Arc<Self> {
        Arc::new(Self::unshared(answers))
    }

    fn unshared(answers: impl IntoIterator<Item = Option<Credentials>>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            prompts: AtomicUsize::new(0),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl CredentialPrompt for ScriptedPrompt {
    fn display_error(&self, text: &str) {
        self.errors.lock().unwrap().push(text.to_string());
    }

    fn prompt_for_credentials(&self) -> Option<Credentials> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.answers.lock().unwrap().pop_front().flatten()
    }
}

/// A [`ScriptedPrompt`] that blocks each prompt until the test sends on the release channel.
pub(crate) struct GatedPrompt {
    inner: ScriptedPrompt,
    gate: Mutex<Receiver<()>>,
}

impl GatedPrompt {
    pub(crate) fn new(
        answers: impl IntoIterator<Item = Option<Credentials>>,
    ) -> (Arc<Self>, Sender<()>) {
        let (tx, rx) = channel();
        let prompt = Arc::new(Self {
            inner: ScriptedPrompt::unshared(answers),
            gate: Mutex::new(rx),
        });
        (prompt, tx)
    }

    pub(crate) fn prompts(&self) -> usize {
        self.inner.prompts()
    }
}

impl CredentialPrompt for GatedPrompt {
    fn display_error(&self, text: &str) {
        self.inner.display_error(text);
    }

    fn prompt_for_credentials(&self) -> Option<Credentials> {
        let released = self
            .gate
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(10));
        if released.is_err() {
            return None;
        }
        self.inner.prompt_for_credentials()
    }
}

/// Poll until `n` requests are parked on the open prompt.
pub(crate) async fn wait_for_waiters(coord: &AuthChallengeCoordinator, n: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while coord.waiting() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("requests never joined the prompt");
}

/// Poll until the open prompt has resolved and freed its slot.
pub(crate) async fn wait_for_prompt_closed(coord: &AuthChallengeCoordinator) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while coord.prompt_open() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("prompt never resolved");
}

/// `Authorization` header for alice:secret.
pub(crate) const ALICE_AUTH: &str = "Basic YWxpY2U6c2VjcmV0";

impl ScriptedPrompt {
    /// A prompt that cancels every time it is asked.
    pub(crate) fn cancelling() -> Arc<Self> {
        Self::new(Vec::<Option<Credentials>>::new())
    }
}

pub(crate) fn client_for(
    server: &wiremock::MockServer,
    credentials: Credentials,
    prompt: Arc<dyn CredentialPrompt>,
) -> RemoteClient {
    let store = Arc::new(CredentialStore::with_credentials(credentials));
    let auth = Arc::new(AuthChallengeCoordinator::new(store, prompt));
    RemoteClient::new(&server.uri(), auth).unwrap()
}

pub(crate) fn todo_json(
    id: i64,
    title: &str,
    date: &str,
    priority: i64,
    completed: bool,
) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "title": title,
        "date": date,
        "priority": priority,
        "completed": completed
    })
}
