//! crates/fitqa_core/src/ports.rs
//!
//! Defines the service contracts (traits) the state container depends on.
//! These traits form the boundary of the hexagonal architecture, keeping the core
//! independent of the hosted backend, the AI provider and on-device storage.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use futures::Stream;
use std::pin::Pin;
use tokio::sync::broadcast;

use crate::domain::{
    AuthEvent, AuthUser, CalorieEntry, ChangeEvent, ChangeFilter, NewQuestion, Question, Stats,
    VoteRow,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// The backend has not been provisioned with this table yet.
    #[error("Relation \"{0}\" does not exist")]
    MissingTable(String),
    /// The auth provider rejected the request; the message is user-facing.
    #[error("{0}")]
    Auth(String),
    /// An upstream service (the AI provider) failed and explained why; the
    /// message is user-facing.
    #[error("{0}")]
    Provider(String),
}

impl PortError {
    pub fn is_missing_table(&self) -> bool {
        matches!(self, PortError::MissingTable(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// A boxed stream of remote row changes.
pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeEvent> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Small string-keyed blob store that survives process restarts.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> PortResult<()>;
    async fn remove(&self, key: &str) -> PortResult<()>;
}

#[async_trait]
pub trait RemoteDataService: Send + Sync {
    // --- Questions ---
    async fn insert_question(&self, question: NewQuestion) -> PortResult<Question>;

    /// Newest first, at most `limit` rows.
    async fn list_questions(&self, limit: usize) -> PortResult<Vec<Question>>;

    async fn update_question_counts(
        &self,
        question_id: &str,
        supports: u32,
        dont_supports: u32,
    ) -> PortResult<()>;

    // --- Votes ---
    async fn insert_vote(&self, vote: VoteRow) -> PortResult<()>;

    async fn list_votes(&self, user_id: &str) -> PortResult<Vec<VoteRow>>;

    // --- Aggregate stats ---
    async fn fetch_stats(&self, user_id: &str) -> PortResult<Option<Stats>>;

    /// Creates the row if absent, otherwise overwrites it.
    async fn upsert_stats(&self, user_id: &str, user_email: &str, stats: Stats) -> PortResult<()>;

    // --- Calorie tracking ---
    async fn find_calorie_entry(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> PortResult<Option<CalorieEntry>>;

    async fn insert_calorie_entry(&self, entry: CalorieEntry) -> PortResult<CalorieEntry>;

    async fn update_calorie_entry(&self, entry: CalorieEntry) -> PortResult<CalorieEntry>;

    /// Inclusive range, ascending by date.
    async fn list_calorie_entries(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PortResult<Vec<CalorieEntry>>;

    // --- Real-time ---
    async fn subscribe(&self, filter: ChangeFilter) -> PortResult<ChangeStream>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<AuthUser>;
    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthUser>;
    async fn sign_out(&self) -> PortResult<()>;
    /// The provider's view of the current session, if any.
    async fn current_user(&self) -> PortResult<Option<AuthUser>>;
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;
}

#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Answers a fitness/health question in natural language.
    async fn answer(&self, question: &str) -> PortResult<String>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn today(&self) -> NaiveDate;
}

/// Wall-clock time; "today" is the local calendar day.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}
