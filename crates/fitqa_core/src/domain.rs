//! crates/fitqa_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! Storage-specific row shapes live with the adapters; the types here are what
//! the state container and the screens work with.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The single active identity. Mirrored to the local store under `user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub is_guest: bool,
}

impl Session {
    /// A local-only identity with no remote user behind it.
    pub fn guest(now: DateTime<Utc>) -> Self {
        Self {
            id: format!("guest_{}", now.timestamp_millis()),
            email: "guest".to_string(),
            is_guest: true,
        }
    }

    pub fn authenticated(user: &AuthUser) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            is_guest: false,
        }
    }
}

/// Identity as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

/// Session-change notifications from the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(AuthUser),
    SignedOut,
}

/// A question with its AI answer and community vote counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub supports: u32,
    pub dont_supports: u32,
    pub user_id: String,
    pub user_email: String,
    pub created_at: DateTime<Utc>,
}

/// The payload for creating a question; counters always start at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestion {
    pub question: String,
    pub answer: String,
    pub user_id: String,
    pub user_email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteKind {
    #[serde(rename = "support")]
    Support,
    #[serde(rename = "dontSupport")]
    DontSupport,
}

impl VoteKind {
    /// The in-memory token (`support` / `dontSupport`).
    pub fn as_str(self) -> &'static str {
        match self {
            VoteKind::Support => "support",
            VoteKind::DontSupport => "dontSupport",
        }
    }
}

/// One durable vote of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRow {
    pub question_id: String,
    pub user_id: String,
    pub kind: VoteKind,
}

/// Per-session aggregate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    #[serde(default)]
    pub questions_asked: u32,
    #[serde(default)]
    pub supports_given: u32,
}

/// A single day's calorie total for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalorieEntry {
    pub user_id: String,
    pub date: NaiveDate,
    pub calories: u32,
    pub updated_at: DateTime<Utc>,
}

/// One point of the 30-day series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCalories {
    pub date: NaiveDate,
    pub calories: u32,
}

/// One point of the 12-month series: the mean of the month's recorded days.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthlyAverage {
    /// 1-based calendar month.
    pub month: u32,
    pub average_calories: f64,
}

/// Process-wide preferences. The record is kept as the raw JSON object so any
/// shape is accepted and echoed back; the known toggles have typed accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(Map<String, Value>);

const NOTIFICATIONS: &str = "notifications";
const DARK_MODE: &str = "darkMode";
const PRIVACY: &str = "privacy";

impl Settings {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Falls back to `default` when the key is absent or not a bool.
    fn flag(&self, key: &str, default: bool) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn notifications(&self) -> bool {
        self.flag(NOTIFICATIONS, true)
    }

    pub fn dark_mode(&self) -> bool {
        self.flag(DARK_MODE, false)
    }

    pub fn privacy(&self) -> bool {
        self.flag(PRIVACY, true)
    }

    pub fn set_notifications(&mut self, on: bool) {
        self.set(NOTIFICATIONS, Value::Bool(on));
    }

    pub fn set_dark_mode(&mut self, on: bool) {
        self.set(DARK_MODE, Value::Bool(on));
    }

    pub fn set_privacy(&mut self, on: bool) {
        self.set(PRIVACY, Value::Bool(on));
    }
}

impl Default for Settings {
    fn default() -> Self {
        let mut settings = Self(Map::new());
        settings.set_notifications(true);
        settings.set_dark_mode(false);
        settings.set_privacy(true);
        settings
    }
}

//=========================================================================================
// Change notifications
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Questions,
    Votes,
    UserStats,
    CalorieTracker,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Questions => "questions",
            Table::Votes => "votes",
            Table::UserStats => "user_stats",
            Table::CalorieTracker => "calorie_tracker",
        }
    }

    /// Resolves a remote table name. `calorie_entries` is an older name for the
    /// calorie table and maps to the same logical table.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "questions" => Some(Table::Questions),
            "votes" => Some(Table::Votes),
            "user_stats" => Some(Table::UserStats),
            "calorie_tracker" | "calorie_entries" => Some(Table::CalorieTracker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn from_op(op: &str) -> Option<Self> {
        match op.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// A row-level change pushed by the remote data service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub user_id: Option<String>,
}

/// Which changes a subscription wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: Table,
    pub user_id: Option<String>,
}

impl ChangeFilter {
    pub fn table(table: Table) -> Self {
        Self { table, user_id: None }
    }

    pub fn for_user(table: Table, user_id: impl Into<String>) -> Self {
        Self {
            table,
            user_id: Some(user_id.into()),
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        match &self.user_id {
            Some(wanted) => event.user_id.as_deref() == Some(wanted.as_str()),
            None => true,
        }
    }
}
