//! services/client/src/adapters/auth.rs
//!
//! This module contains the adapter for the backend's hosted auth service.
//! It implements the `AuthService` port over the provider's REST endpoints and
//! keeps the issued tokens in the local store so a session survives restarts.

use async_trait::async_trait;
use fitqa_core::domain::{AuthEvent, AuthUser};
use fitqa_core::ports::{AuthService, LocalStore, PortError, PortResult};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Local store key for the provider's tokens.
pub const KEY_AUTH_SESSION: &str = "auth_session";

//=========================================================================================
// Wire types
//=========================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenSession {
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct UserPayload {
    id: String,
    email: Option<String>,
}
impl UserPayload {
    fn to_domain(self) -> AuthUser {
        AuthUser {
            id: self.id,
            email: self.email.unwrap_or_default(),
        }
    }
}

/// Token grant response. Sign-up answers with a bare user when the project
/// requires email confirmation, hence the optional fields.
#[derive(Deserialize)]
struct GrantResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserPayload>,
    id: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize, Default)]
struct ErrorPayload {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct HostedAuthAdapter {
    http: Client,
    base_url: String,
    anon_key: String,
    local: Arc<dyn LocalStore>,
    session: RwLock<Option<TokenSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl HostedAuthAdapter {
    /// Creates a new adapter for the project at `project_url`.
    pub fn new(http: Client, project_url: &str, anon_key: String, local: Arc<dyn LocalStore>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            http,
            base_url: format!("{}/auth/v1", project_url.trim_end_matches('/')),
            anon_key,
            local,
            session: RwLock::new(None),
            events,
        }
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", &self.anon_key)
    }

    async fn grant(&self, path: &str, body: &impl Serialize) -> PortResult<AuthUser> {
        let response = self
            .request(self.http.post(format!("{}{}", self.base_url, path)))
            .json(body)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let grant: GrantResponse = read_json(response).await?;

        let user = match (grant.user, grant.id) {
            (Some(user), _) => user.to_domain(),
            (None, Some(id)) => AuthUser {
                id,
                email: grant.email.unwrap_or_default(),
            },
            (None, None) => {
                return Err(PortError::Unexpected(
                    "Auth response did not include a user".to_string(),
                ))
            }
        };

        if let Some(access_token) = grant.access_token {
            self.store_session(Some(TokenSession {
                access_token,
                refresh_token: grant.refresh_token,
            }))
            .await;
        }
        let _ = self.events.send(AuthEvent::SignedIn(user.clone()));
        Ok(user)
    }

    async fn store_session(&self, session: Option<TokenSession>) {
        let persisted = match &session {
            Some(tokens) => match serde_json::to_string(tokens) {
                Ok(raw) => self.local.set(KEY_AUTH_SESSION, &raw).await,
                Err(e) => Err(PortError::Unexpected(e.to_string())),
            },
            None => self.local.remove(KEY_AUTH_SESSION).await,
        };
        if let Err(e) = persisted {
            warn!("Failed to persist auth tokens: {}", e);
        }
        *self.session.write().await = session;
    }

    /// The in-memory tokens, falling back to the ones saved by a previous run.
    async fn load_session(&self) -> Option<TokenSession> {
        if let Some(session) = self.session.read().await.clone() {
            return Some(session);
        }
        let raw = self.local.get(KEY_AUTH_SESSION).await.ok().flatten()?;
        let session: TokenSession = serde_json::from_str(&raw).ok()?;
        *self.session.write().await = Some(session.clone());
        Some(session)
    }

    async fn fetch_user(&self, access_token: &str) -> PortResult<Option<AuthUser>> {
        let response = self
            .request(self.http.get(format!("{}/user", self.base_url)))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
            return Ok(None);
        }
        let user: UserPayload = read_json(response).await?;
        Ok(Some(user.to_domain()))
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(response: Response) -> PortResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()));
    }

    let payload: ErrorPayload = response.json().await.unwrap_or_default();
    let message = payload
        .error_description
        .or(payload.msg)
        .or(payload.message)
        .or(payload.error)
        .unwrap_or_else(|| format!("Authentication failed ({})", status));
    if status.is_client_error() {
        Err(PortError::Auth(message))
    } else {
        Err(PortError::Unexpected(message))
    }
}

//=========================================================================================
// `AuthService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthService for HostedAuthAdapter {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<AuthUser> {
        self.grant("/signup", &Credentials { email, password }).await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthUser> {
        self.grant("/token?grant_type=password", &Credentials { email, password })
            .await
    }

    async fn sign_out(&self) -> PortResult<()> {
        let session = self.load_session().await;
        self.store_session(None).await;
        let _ = self.events.send(AuthEvent::SignedOut);

        let Some(session) = session else {
            return Ok(());
        };
        let response = self
            .request(self.http.post(format!("{}/logout", self.base_url)))
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if !response.status().is_success() && response.status() != StatusCode::UNAUTHORIZED {
            return Err(PortError::Unexpected(format!(
                "Logout returned {}",
                response.status()
            )));
        }
        info!("Remote session revoked");
        Ok(())
    }

    async fn current_user(&self) -> PortResult<Option<AuthUser>> {
        let Some(session) = self.load_session().await else {
            return Ok(None);
        };
        if let Some(user) = self.fetch_user(&session.access_token).await? {
            return Ok(Some(user));
        }

        // Access token expired; try the refresh token once.
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            self.store_session(None).await;
            return Ok(None);
        };
        debug!("Refreshing expired access token");
        match self
            .grant("/token?grant_type=refresh_token", &RefreshRequest { refresh_token })
            .await
        {
            Ok(user) => Ok(Some(user)),
            Err(PortError::Auth(reason)) => {
                info!("Stored session could not be refreshed: {}", reason);
                self.store_session(None).await;
                let _ = self.events.send(AuthEvent::SignedOut);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
