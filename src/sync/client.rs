use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use crate::core::todo::{FieldValue, NewTodo, TodoId, TodoItem};

use super::auth::{AuthChallengeCoordinator, ChallengeOutcome, ChallengeReason};
use super::error::{Result, SyncError};
use super::wire::{self, CreateEnvelope, ListEnvelope};

/// HTTP client for the `/todos` collection.
///
/// Every attempt carries Basic auth built from the current credential store, so a retry
/// after a challenge goes out with whatever the user just entered.
pub struct RemoteClient {
    root_endpoint: String,
    http: Client,
    auth: Arc<AuthChallengeCoordinator>,
}

impl RemoteClient {
    pub fn new(root_endpoint: &str, auth: Arc<AuthChallengeCoordinator>) -> Result<Self> {
        Self::build(root_endpoint, auth, Client::builder())
    }

    pub fn with_timeout(
        root_endpoint: &str,
        auth: Arc<AuthChallengeCoordinator>,
        timeout: Duration,
    ) -> Result<Self> {
        Self::build(root_endpoint, auth, Client::builder().timeout(timeout))
    }

    fn build(
        root_endpoint: &str,
        auth: Arc<AuthChallengeCoordinator>,
        builder: reqwest::ClientBuilder,
    ) -> Result<Self> {
        let http = builder.build()?;
        Ok(Self {
            root_endpoint: root_endpoint.trim_end_matches('/').to_string(),
            http,
            auth,
        })
    }

    pub fn root_endpoint(&self) -> &str {
        &self.root_endpoint
    }

    pub fn auth(&self) -> &Arc<AuthChallengeCoordinator> {
        &self.auth
    }

    fn collection_url(&self) -> String {
        format!("{}/todos", self.root_endpoint)
    }

    fn item_url(&self, id: TodoId) -> String {
        format!("{}/todos/{}", self.root_endpoint, id)
    }

    /// `GET /todos`
    pub async fn fetch_all(&self) -> Result<Vec<TodoItem>> {
        let url = self.collection_url();
        let resp = self
            .send("GET /todos", StatusCode::OK, |http| http.get(&url))
            .await?;
        let body = resp.text().await?;
        let envelope: ListEnvelope = wire::decode(&body)?;
        log::debug!("Fetched {} todos", envelope.todos.len());
        Ok(envelope.todos)
    }

    /// `POST /todos`, returning the todo with its server-assigned id.
    pub async fn create_item(&self, new: &NewTodo) -> Result<TodoItem> {
        let url = self.collection_url();
        let resp = self
            .send("POST /todos", StatusCode::CREATED, |http| {
                http.post(&url).json(new)
            })
            .await?;
        let body = resp.text().await?;
        let envelope: CreateEnvelope = wire::decode(&body)?;
        log::info!("Created todo {}: {}", envelope.todo.id, envelope.todo.title);
        Ok(envelope.todo)
    }

    /// `DELETE /todos/{id}`
    pub async fn delete_item(&self, id: TodoId) -> Result<()> {
        let url = self.item_url(id);
        let what = format!("DELETE /todos/{}", id);
        self.send(&what, StatusCode::OK, |http| http.delete(&url))
            .await?;
        Ok(())
    }

    /// `DELETE /todos`
    pub async fn delete_all(&self) -> Result<()> {
        let url = self.collection_url();
        self.send("DELETE /todos", StatusCode::OK, |http| http.delete(&url))
            .await?;
        Ok(())
    }

    /// `PUT /todos/{id}/{field}` with body `{<field>: value}`.
    pub async fn update_field(&self, id: TodoId, value: &FieldValue) -> Result<()> {
        let field = value.field();
        let url = format!("{}/{}", self.item_url(id), field);
        let what = format!("PUT /todos/{}/{}", id, field);
        let body = value.to_body();
        self.send(&what, StatusCode::OK, |http| http.put(&url).json(&body))
            .await?;
        Ok(())
    }

    /// Send until the server answers, re-prompting on 401/403 for as long as the user
    /// keeps supplying credentials.
    async fn send<F>(&self, what: &str, expected: StatusCode, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        loop {
            let credentials = self.auth.credentials().snapshot();
            log::debug!("{} as '{}'", what, credentials.username);

            let resp = build(&self.http)
                .basic_auth(&credentials.username, Some(&credentials.password))
                .send()
                .await?;

            let status = resp.status();
            if status == expected {
                return Ok(resp);
            }

            let Some(reason) = ChallengeReason::from_status(status) else {
                let body = resp.text().await.unwrap_or_default();
                log::error!("{} returned {}: {}", what, status, body);
                return Err(SyncError::InternalServerError(format!(
                    "{} returned {}",
                    what, status
                )));
            };

            if self.auth.credentials().snapshot() != credentials {
                log::debug!("{} was sent with stale credentials, retrying", what);
                continue;
            }

            match self.auth.challenge(reason).await {
                ChallengeOutcome::Confirmed => {
                    log::debug!("Retrying {} with new credentials", what);
                }
                ChallengeOutcome::Cancelled => {
                    return Err(match reason {
                        ChallengeReason::Unauthenticated => SyncError::AuthenticationFailed,
                        ChallengeReason::Forbidden => SyncError::AuthorizationFailed,
                    });
                }
                ChallengeOutcome::Interrupted => return Err(SyncError::Interrupted),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::todo::Priority;
    use crate::sync::credentials::Credentials;
    use crate::sync::testing::{
        ALICE_AUTH, GatedPrompt, ScriptedPrompt, client_for, todo_json, wait_for_waiters,
    };
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{any, body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alice() -> Credentials {
        Credentials::new("alice", "secret")
    }

    fn buy_milk() -> NewTodo {
        NewTodo::new(
            "Buy milk",
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            Priority::new(3).unwrap(),
        )
    }

    /// Everything not matched by a higher-priority mock is rejected.
    async fn reject_everything_else(server: &MockServer, status: u16) {
        Mock::given(any())
            .respond_with(ResponseTemplate::new(status))
            .with_priority(10)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fetch_all_sends_basic_auth_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos"))
            .and(header("authorization", ALICE_AUTH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "todos": [todo_json(1, "A", "2024-05-01", 2, false)],
                "error": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, alice(), ScriptedPrompt::cancelling());
        let todos = client.fetch_all().await.unwrap();

        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].id, TodoId(1));
        assert_eq!(todos[0].title, "A");
    }

    #[tokio::test]
    async fn create_posts_fields_and_returns_server_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/todos"))
            .and(body_json(json!({
                "title": "Buy milk",
                "date": "2024-05-01",
                "priority": 3,
                "completed": false
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "todo": todo_json(42, "Buy milk", "2024-05-01", 3, false),
                "error": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, alice(), ScriptedPrompt::cancelling());
        let todo = client.create_item(&buy_milk()).await.unwrap();

        assert_eq!(todo.id, TodoId(42));
        assert_eq!(todo.priority.get(), 3);
    }

    #[tokio::test]
    async fn create_after_401_retries_once_with_new_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/todos"))
            .and(header("authorization", ALICE_AUTH))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "todo": todo_json(1, "Buy milk", "2024-05-01", 3, false)
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(401))
            .with_priority(10)
            .expect(1)
            .mount(&server)
            .await;

        let prompt = ScriptedPrompt::new([Some(alice())]);
        let client = client_for(&server, Credentials::default(), prompt.clone());
        let todo = client.create_item(&buy_milk()).await.unwrap();

        assert_eq!(todo.id, TodoId(1));
        assert_eq!(prompt.prompts(), 1);
        assert_eq!(client.auth().credentials().snapshot(), alice());
    }

    #[tokio::test]
    async fn keeps_prompting_until_credentials_work() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos"))
            .and(header("authorization", ALICE_AUTH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "todos": [] })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(401))
            .with_priority(10)
            .expect(2)
            .mount(&server)
            .await;

        let prompt = ScriptedPrompt::new([Some(Credentials::new("bob", "wrong")), Some(alice())]);
        let client = client_for(&server, Credentials::default(), prompt.clone());

        assert!(client.fetch_all().await.unwrap().is_empty());
        assert_eq!(prompt.prompts(), 2);
    }

    #[tokio::test]
    async fn cancelled_401_is_authentication_failed() {
        let server = MockServer::start().await;
        reject_everything_else(&server, 401).await;

        let prompt = ScriptedPrompt::new([None]);
        let client = client_for(&server, alice(), prompt.clone());
        let err = client.delete_all().await.unwrap_err();

        assert!(matches!(err, SyncError::AuthenticationFailed));
        assert_eq!(prompt.errors(), vec!["Invalid username or password".to_string()]);
    }

    #[tokio::test]
    async fn cancelled_403_is_authorization_failed() {
        let server = MockServer::start().await;
        reject_everything_else(&server, 403).await;

        let prompt = ScriptedPrompt::new([None]);
        let client = client_for(&server, alice(), prompt.clone());
        let err = client.delete_item(TodoId(3)).await.unwrap_err();

        assert!(matches!(err, SyncError::AuthorizationFailed));
        assert_eq!(prompt.errors(), vec!["Access denied".to_string()]);
    }

    #[tokio::test]
    async fn unexpected_status_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let prompt = ScriptedPrompt::new([Some(alice())]);
        let client = client_for(&server, alice(), prompt.clone());
        let err = client.fetch_all().await.unwrap_err();

        assert!(matches!(err, SyncError::InternalServerError(_)));
        assert_eq!(prompt.prompts(), 0);
    }

    #[tokio::test]
    async fn wrong_success_code_is_internal_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "todo": todo_json(1, "Buy milk", "2024-05-01", 3, false)
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, alice(), ScriptedPrompt::cancelling());
        let err = client.create_item(&buy_milk()).await.unwrap_err();
        assert!(matches!(err, SyncError::InternalServerError(_)));
    }

    #[tokio::test]
    async fn undecodable_body_is_internal_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"todos\": [{\"id\": 1}]}"))
            .mount(&server)
            .await;

        let client = client_for(&server, alice(), ScriptedPrompt::cancelling());
        let err = client.fetch_all().await.unwrap_err();
        assert!(matches!(err, SyncError::InternalServerError(_)));
    }

    #[tokio::test]
    async fn connection_refused_is_io_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let store = Arc::new(crate::sync::credentials::CredentialStore::new());
        let auth = Arc::new(AuthChallengeCoordinator::new(store, ScriptedPrompt::cancelling()));
        let client = RemoteClient::new(&format!("http://127.0.0.1:{}", port), auth).unwrap();

        let err = client.fetch_all().await.unwrap_err();
        assert!(matches!(err, SyncError::Io(_)));
        assert_eq!(err.kind(), "io_error");
    }

    #[tokio::test]
    async fn update_field_puts_single_field() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/todos/7/priority"))
            .and(body_json(json!({ "priority": 4 })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/todos/7"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, alice(), ScriptedPrompt::cancelling());
        client
            .update_field(TodoId(7), &FieldValue::Priority(Priority::new(4).unwrap()))
            .await
            .unwrap();
        client.delete_item(TodoId(7)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_401s_share_one_prompt_and_fail_together() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let (prompt, release) = GatedPrompt::new([None]);
        let client = client_for(&server, alice(), prompt.clone());

        let (a, b, ()) = tokio::join!(client.fetch_all(), client.delete_all(), async {
            wait_for_waiters(client.auth(), 2).await;
            release.send(()).unwrap();
        });

        assert!(matches!(a, Err(SyncError::AuthenticationFailed)));
        assert!(matches!(b, Err(SyncError::AuthenticationFailed)));
        assert_eq!(prompt.prompts(), 1);
    }

    #[tokio::test]
    async fn late_401_after_new_credentials_retries_without_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos"))
            .and(header("authorization", ALICE_AUTH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "todos": [] })))
            .with_priority(1)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .with_priority(5)
            .mount(&server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(500)))
            .with_priority(6)
            .mount(&server)
            .await;

        let prompt = ScriptedPrompt::new([Some(alice())]);
        let client = client_for(&server, Credentials::new("old", "pw"), prompt.clone());

        let (a, b) = tokio::join!(client.fetch_all(), client.fetch_all());

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(prompt.prompts(), 1);
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let store = Arc::new(crate::sync::credentials::CredentialStore::new());
        let auth = Arc::new(AuthChallengeCoordinator::new(store, ScriptedPrompt::cancelling()));
        let client = RemoteClient::new("http://example.test/api/", auth).unwrap();
        assert_eq!(client.root_endpoint(), "http://example.test/api");
        assert_eq!(client.item_url(TodoId(5)), "http://example.test/api/todos/5");
    }
}
