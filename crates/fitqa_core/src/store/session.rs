//! crates/fitqa_core/src/store/session.rs
//!
//! Identity lifecycle: guest entry, sign-up, login and sign-out.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{log_read_failure, AppStore, KEY_IS_GUEST, KEY_LOCAL_STATS, KEY_USER};
use crate::domain::{AuthEvent, AuthUser, Session, Stats};
use crate::error::{StoreError, StoreResult};

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

/// Rejects malformed credentials before anything goes over the network.
pub fn validate_credentials(email: &str, password: &str) -> StoreResult<()> {
    if !EMAIL_PATTERN.is_match(email.trim()) {
        return Err(StoreError::Validation(
            "Please enter a valid email address".to_string(),
        ));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(StoreError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

impl AppStore {
    /// Starts a fresh local-only identity and loads the question cache. Never
    /// fails.
    pub async fn login_as_guest(&self) -> Session {
        let session = Session::guest(self.clock.now());
        self.install_session(session.clone(), Stats::default()).await;
        self.write_json(KEY_IS_GUEST, &true).await;
        self.write_json(KEY_USER, &session).await;
        info!(user_id = %session.id, "Entered guest mode");
        self.reload_questions().await;
        session
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> StoreResult<Session> {
        validate_credentials(email, password)?;
        let user = self
            .auth
            .sign_up(email.trim(), password)
            .await
            .map_err(|e| {
                error!("Sign-up failed: {}", e);
                StoreError::from(e)
            })?;
        info!(user_id = %user.id, "Account created");
        Ok(self.begin_authenticated(user).await)
    }

    pub async fn login(&self, email: &str, password: &str) -> StoreResult<Session> {
        validate_credentials(email, password)?;
        let user = self
            .auth
            .sign_in_with_password(email.trim(), password)
            .await
            .map_err(|e| {
                error!("Login failed: {}", e);
                StoreError::from(e)
            })?;
        info!(user_id = %user.id, "Signed in");
        Ok(self.begin_authenticated(user).await)
    }

    /// Clears the session and all user-scoped state before doing any cleanup
    /// I/O, so session observers see the transition immediately.
    pub async fn sign_out(&self) {
        let previous = self.clear_session_state().await;
        self.forget_persisted_identity().await;

        if let Some(session) = previous.filter(|s| !s.is_guest) {
            if let Err(e) = self.auth.sign_out().await {
                warn!(user_id = %session.id, "Failed to revoke remote session: {}", e);
            }
        }
    }

    /// Follows the provider's session-change stream. A remote sign-out of the
    /// active account clears local state as `sign_out` would.
    pub fn watch_auth(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let mut events = self.auth.auth_events();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::SignedOut) => {
                        let signed_in = store
                            .session()
                            .await
                            .is_some_and(|s| !s.is_guest);
                        if signed_in {
                            info!("Auth provider ended the session");
                            store.clear_session_state().await;
                            store.forget_persisted_identity().await;
                        }
                    }
                    Ok(AuthEvent::SignedIn(user)) => {
                        debug!(user_id = %user.id, "Auth provider reported sign-in");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth event stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// The synchronous half of sign-out. Returns the session that was active.
    pub(super) async fn clear_session_state(&self) -> Option<Session> {
        let previous = {
            let mut state = self.state.lock().await;
            let previous = state.session.take();
            state.reset_identity();
            state.questions.clear();
            previous
        };
        self.session_tx.send_replace(None);
        if let Some(session) = &previous {
            info!(user_id = %session.id, "Signed out");
        }
        previous
    }

    pub(super) async fn forget_persisted_identity(&self) {
        for key in [KEY_USER, KEY_IS_GUEST, KEY_LOCAL_STATS] {
            if let Err(e) = self.local.remove(key).await {
                warn!(key, "Failed to clear local store entry: {}", e);
            }
        }
    }

    pub(super) async fn begin_authenticated(&self, user: AuthUser) -> Session {
        let session = Session::authenticated(&user);
        let epoch = self.install_session(session.clone(), Stats::default()).await;
        self.write_json(KEY_USER, &session).await;
        self.write_json(KEY_IS_GUEST, &false).await;
        self.load_account_data(&session, epoch).await;
        self.reload_questions().await;
        session
    }

    /// Pulls remote stats and the vote ledger for an account. Failures leave
    /// the defaults in place.
    pub(super) async fn load_account_data(&self, session: &Session, epoch: u64) {
        let (stats, votes) = futures::join!(
            self.remote.fetch_stats(&session.id),
            self.remote.list_votes(&session.id)
        );

        let stats = match stats {
            Ok(stats) => stats.unwrap_or_default(),
            Err(e) => {
                log_read_failure("user stats", &e);
                Stats::default()
            }
        };
        let votes = votes.unwrap_or_else(|e| {
            log_read_failure("votes", &e);
            Vec::new()
        });

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return;
        }
        state.stats = stats;
        for vote in votes {
            state.votes.entry(vote.question_id).or_insert(vote.kind);
        }
    }
}
