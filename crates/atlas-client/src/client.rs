use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use atlas_types::api::{AuthResponse, HealthResponse, LoginRequest, MessageBody, RegisterRequest, SendMessageRequest};
use atlas_types::models::{Artifact, ArtifactDraft, ArtifactId, MessageView, validate_content};

use crate::error::{ClientError, FALLBACK_MESSAGE};
use crate::session::{Session, SessionStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client for the catalogue API.
///
/// Owns the session: register and login install it, logout clears it, and so
/// does a 401 on any call that sent the bearer token. Clones share the same
/// session, so a poller and a catalog built from one client see the same
/// sign-in state.
#[derive(Clone)]
pub struct AtlasClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<Mutex<Option<Session>>>,
    store: Option<SessionStore>,
}

impl AtlasClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: Arc::new(Mutex::new(None)),
            store: None,
        })
    }

    /// Restores any session saved in `store` and persists future changes there.
    pub fn with_session_store(mut self, store: SessionStore) -> Self {
        *self.lock_session() = store.load();
        self.store = Some(store);
        self
    }

    pub fn with_session(self, session: Session) -> Self {
        *self.lock_session() = Some(session);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> Option<Session> {
        self.lock_session().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.lock_session().is_some()
    }

    // -- Auth --

    pub async fn register(&self, username: &str, password: &str) -> Result<Session, ClientError> {
        let body = RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let resp: AuthResponse = self
            .execute(self.request(Method::POST, "/api/auth/register").json(&body), false)
            .await?;
        self.install(resp.into())
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ClientError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let resp: AuthResponse = self
            .execute(self.request(Method::POST, "/api/login").json(&body), false)
            .await?;
        self.install(resp.into())
    }

    pub fn logout(&self) -> Result<(), ClientError> {
        if let Some(session) = self.lock_session().take() {
            info!("Signed out {}", session.user.username);
        }
        if let Some(store) = &self.store {
            store.clear()?;
        }
        Ok(())
    }

    // -- Artifacts --

    pub async fn list_artifacts(&self) -> Result<Vec<Artifact>, ClientError> {
        self.execute(self.request(Method::GET, "/api/artifacts"), false)
            .await
    }

    pub async fn create_artifact(&self, draft: &ArtifactDraft) -> Result<Artifact, ClientError> {
        draft.validate()?;
        let req = self.authed(Method::POST, "/api/artifacts")?.json(draft);
        self.execute(req, true).await
    }

    pub async fn update_artifact(
        &self,
        id: ArtifactId,
        draft: &ArtifactDraft,
    ) -> Result<Artifact, ClientError> {
        draft.validate()?;
        let req = self
            .authed(Method::PUT, &format!("/api/artifacts/{}", id))?
            .json(draft);
        self.execute(req, true).await
    }

    pub async fn delete_artifact(&self, id: ArtifactId) -> Result<String, ClientError> {
        let req = self.authed(Method::DELETE, &format!("/api/artifacts/{}", id))?;
        let body: MessageBody = self.execute(req, true).await?;
        Ok(body.message)
    }

    // -- Messages --

    pub async fn list_messages(&self, artifact_id: ArtifactId) -> Result<Vec<MessageView>, ClientError> {
        let path = format!("/api/artifacts/{}/messages", artifact_id);
        self.execute(self.request(Method::GET, &path), false).await
    }

    pub async fn send_message(
        &self,
        artifact_id: ArtifactId,
        content: &str,
    ) -> Result<MessageView, ClientError> {
        validate_content(content)?;
        let body = SendMessageRequest {
            content: content.to_string(),
        };
        let req = self
            .authed(Method::POST, &format!("/api/artifacts/{}/messages", artifact_id))?
            .json(&body);
        self.execute(req, true).await
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.execute(self.request(Method::GET, "/api/health"), false)
            .await
    }

    // -- Plumbing --

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn install(&self, session: Session) -> Result<Session, ClientError> {
        info!("Signed in as {} ({})", session.user.username, session.user.role);
        if let Some(store) = &self.store {
            store.save(&session)?;
        }
        *self.lock_session() = Some(session.clone());
        Ok(session)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{}", self.base_url, path))
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let token = self
            .lock_session()
            .as_ref()
            .map(|s| s.token.clone())
            .ok_or(ClientError::NotSignedIn)?;
        Ok(self.request(method, path).bearer_auth(token))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        authenticated: bool,
    ) -> Result<T, ClientError> {
        let resp = req.send().await?;
        let status = resp.status();

        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }

        if authenticated && status == StatusCode::UNAUTHORIZED {
            warn!("Server rejected the session token, signing out");
            self.lock_session().take();
            if let Some(store) = &self.store {
                if let Err(e) = store.clear() {
                    warn!("Failed to clear session file: {}", e);
                }
            }
        }

        let message = resp
            .json::<MessageBody>()
            .await
            .map(|b| b.message)
            .unwrap_or_else(|_| FALLBACK_MESSAGE.to_string());
        debug!("Request failed ({}): {}", status, message);

        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

impl std::fmt::Debug for AtlasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasClient")
            .field("base_url", &self.base_url)
            .field("signed_in", &self.is_signed_in())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_types::models::{DraftError, PublicUser, Role};

    fn signed_in(client: AtlasClient) -> AtlasClient {
        client.with_session(Session {
            token: "t".into(),
            user: PublicUser {
                id: 1,
                username: "alice".into(),
                role: Role::Researcher,
            },
        })
    }

    #[test]
    fn base_url_is_normalized() {
        let client = AtlasClient::new("http://localhost:3001/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:3001");
    }

    #[tokio::test]
    async fn writes_need_a_session() {
        let client = AtlasClient::new("http://127.0.0.1:9").unwrap();
        let err = client.delete_artifact(1).await.unwrap_err();
        assert!(matches!(err, ClientError::NotSignedIn));
    }

    #[tokio::test]
    async fn invalid_drafts_never_leave_the_client() {
        // Nothing listens on port 9; reaching the network would be an Http error.
        let client = signed_in(AtlasClient::new("http://127.0.0.1:9").unwrap());

        let err = client
            .create_artifact(&ArtifactDraft::new("Axe", 91.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(DraftError::LatitudeOutOfRange(_))
        ));

        let err = client.send_message(1, "   ").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(DraftError::EmptyContent)));
    }

    #[test]
    fn logout_clears_session_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let client = signed_in(AtlasClient::new("http://localhost").unwrap())
            .with_session_store(store.clone());
        // the store was empty, so loading it replaced the session
        assert!(!client.is_signed_in());

        let client = client.with_session(Session {
            token: "t".into(),
            user: PublicUser {
                id: 1,
                username: "alice".into(),
                role: Role::Researcher,
            },
        });
        assert!(client.is_signed_in());
        client.logout().unwrap();
        assert!(!client.is_signed_in());
        assert!(store.load().is_none());
    }
}
