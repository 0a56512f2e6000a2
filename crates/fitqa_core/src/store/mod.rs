//! crates/fitqa_core/src/store/mod.rs
//!
//! The application state container. One `AppStore` is created at startup and
//! handed (as an `Arc`) to every screen. It owns the session, the question
//! cache, the vote ledger and the aggregate counters, and mediates every read
//! and write against the remote data service and the local store.

mod calories;
mod questions;
mod session;
mod settings;
mod state;

pub use calories::{parse_calories, MONTHLY_POINTS};
pub use questions::{truncate_words, SyncHandle, VoteOutcome, MAX_ANSWER_WORDS, TRENDING_LIMIT};
pub use session::{validate_credentials, MIN_PASSWORD_LEN};

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::domain::{Question, Session, Settings, Stats, VoteKind};
use crate::ports::{
    AnswerService, AuthService, Clock, LocalStore, PortError, RemoteDataService, SystemClock,
};
use state::StoreState;

//=========================================================================================
// Local store keys
//=========================================================================================

pub const KEY_USER: &str = "user";
pub const KEY_IS_GUEST: &str = "isGuest";
pub const KEY_SETTINGS: &str = "settings";
pub const KEY_LOCAL_STATS: &str = "local_stats";

/// How many questions the cache holds.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// The external collaborators the store talks to.
#[derive(Clone)]
pub struct StorePorts {
    pub remote: Arc<dyn RemoteDataService>,
    pub auth: Arc<dyn AuthService>,
    pub answers: Arc<dyn AnswerService>,
    pub local: Arc<dyn LocalStore>,
}

pub struct AppStore {
    remote: Arc<dyn RemoteDataService>,
    auth: Arc<dyn AuthService>,
    answers: Arc<dyn AnswerService>,
    local: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    page_size: usize,
    state: Mutex<StoreState>,
    /// Held across read-latest-stats-then-upsert so remote writes land in order.
    stats_writes: Mutex<()>,
    session_tx: watch::Sender<Option<Session>>,
}

impl AppStore {
    pub fn new(ports: StorePorts) -> Self {
        let (session_tx, _) = watch::channel(None);
        Self {
            remote: ports.remote,
            auth: ports.auth,
            answers: ports.answers,
            local: ports.local,
            clock: Arc::new(SystemClock),
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(StoreState::default()),
            stats_writes: Mutex::new(()),
            session_tx,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    //=====================================================================================
    // Read accessors
    //=====================================================================================

    pub async fn session(&self) -> Option<Session> {
        self.state.lock().await.session.clone()
    }

    pub async fn is_guest(&self) -> bool {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .is_some_and(|s| s.is_guest)
    }

    /// Observes session transitions (sign-in, guest entry, sign-out).
    pub fn session_watch(&self) -> watch::Receiver<Option<Session>> {
        self.session_tx.subscribe()
    }

    /// The cached questions, newest first.
    pub async fn questions(&self) -> Vec<Question> {
        self.state.lock().await.questions.clone()
    }

    pub async fn stats(&self) -> Stats {
        self.state.lock().await.stats
    }

    pub async fn vote_for(&self, question_id: &str) -> Option<VoteKind> {
        self.state.lock().await.votes.get(question_id).copied()
    }

    pub async fn voted_questions(&self) -> HashMap<String, VoteKind> {
        self.state.lock().await.votes.clone()
    }

    //=====================================================================================
    // Startup
    //=====================================================================================

    /// Rebuilds in-memory state from the previous run. Never fails: anything that
    /// cannot be read falls back to defaults.
    pub async fn restore(&self) {
        let settings: Settings = self.read_json(KEY_SETTINGS).await.unwrap_or_default();
        let stored_user: Option<Session> = self.read_json(KEY_USER).await;
        let stored_guest: bool = self.read_json(KEY_IS_GUEST).await.unwrap_or(false);

        self.state.lock().await.settings = settings;

        match stored_user {
            Some(mut session) if stored_guest || session.is_guest => {
                session.is_guest = true;
                let stats: Stats = self.read_json(KEY_LOCAL_STATS).await.unwrap_or_default();
                info!(user_id = %session.id, "Restored guest session");
                self.install_session(session, stats).await;
            }
            Some(session) => match self.auth.current_user().await {
                Ok(Some(user)) if user.id == session.id => {
                    info!(user_id = %user.id, "Restored authenticated session");
                    // Loads the question cache itself.
                    self.begin_authenticated(user).await;
                    return;
                }
                Ok(_) => {
                    info!(user_id = %session.id, "Persisted session is no longer valid; signing out locally");
                    self.forget_persisted_identity().await;
                }
                Err(e) => {
                    // Provider unreachable: keep the identity so the app stays usable.
                    warn!("Could not confirm persisted session with the auth provider: {}", e);
                    let epoch = self.install_session(session.clone(), Stats::default()).await;
                    self.load_account_data(&session, epoch).await;
                }
            },
            None => {}
        }

        self.reload_questions().await;
    }

    //=====================================================================================
    // Internal helpers
    //=====================================================================================

    /// Replaces the identity and publishes the transition. Returns the new epoch.
    async fn install_session(&self, session: Session, stats: Stats) -> u64 {
        let epoch = {
            let mut state = self.state.lock().await;
            state.reset_identity();
            state.session = Some(session.clone());
            state.stats = stats;
            state.epoch
        };
        self.session_tx.send_replace(Some(session));
        epoch
    }

    /// Writes the current counters to wherever this session keeps them. Always
    /// sends the latest snapshot, so a slow earlier write cannot overwrite a
    /// newer one. Skipped once the session has changed.
    async fn persist_stats(&self, session: &Session, epoch: u64) {
        let _writing = self.stats_writes.lock().await;
        let stats = {
            let state = self.state.lock().await;
            if state.epoch != epoch {
                return;
            }
            state.stats
        };
        if session.is_guest {
            self.write_json(KEY_LOCAL_STATS, &stats).await;
            return;
        }
        if let Err(e) = self
            .remote
            .upsert_stats(&session.id, &session.email, stats)
            .await
        {
            warn!(user_id = %session.id, "Failed to upsert user stats: {}", e);
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.local.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, "Failed to read local store: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, "Ignoring unreadable local store entry: {}", e);
                None
            }
        }
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, "Failed to serialize local store entry: {}", e);
                return;
            }
        };
        if let Err(e) = self.local.set(key, &raw).await {
            warn!(key, "Failed to write local store: {}", e);
        }
    }
}

/// Read paths treat a missing table as "no data yet".
fn log_read_failure(what: &str, error: &PortError) {
    if error.is_missing_table() {
        info!("{} unavailable, backend not provisioned yet: {}", what, error);
    } else {
        warn!("Failed to load {}: {}", what, error);
    }
}
