//! services/client/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `RemoteDataService` port from the `core` crate. It talks to the hosted
//! Postgres behind the backend using `sqlx`, and turns `pg_notify` traffic into
//! change streams.
//!
//! Every table has a record struct here; the record is the single place where a
//! snake_case column is paired with its domain field.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fitqa_core::domain::{
    CalorieEntry, ChangeEvent, ChangeFilter, ChangeKind, NewQuestion, Question, Stats, Table,
    VoteKind, VoteRow,
};
use fitqa_core::ports::{ChangeStream, PortError, PortResult, RemoteDataService};
use serde::Deserialize;
use sqlx::postgres::PgListener;
use sqlx::{FromRow, PgPool};
use tracing::{error, info, warn};
use uuid::Uuid;

/// The channel the migration's trigger publishes row changes on.
pub const CHANGE_CHANNEL: &str = "fitqa_changes";

/// Postgres `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

const QUESTION_COLUMNS: &str =
    "id, question, answer, supports, dont_supports, user_id, user_email, created_at";
const CALORIE_COLUMNS: &str = "user_id, date, calories, updated_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `RemoteDataService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn map_db_error(table: Table, e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("No matching row in {}", table.name())),
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNDEFINED_TABLE) => {
            PortError::MissingTable(table.name().to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn to_db_count(value: u32) -> PortResult<i32> {
    i32::try_from(value).map_err(|_| PortError::Unexpected(format!("Count {} is out of range", value)))
}

fn from_db_count(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct QuestionRecord {
    id: String,
    question: String,
    answer: String,
    supports: i32,
    dont_supports: i32,
    user_id: String,
    user_email: String,
    created_at: DateTime<Utc>,
}
impl QuestionRecord {
    fn to_domain(self) -> Question {
        Question {
            id: self.id,
            question: self.question,
            answer: self.answer,
            supports: from_db_count(self.supports),
            dont_supports: from_db_count(self.dont_supports),
            user_id: self.user_id,
            user_email: self.user_email,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct VoteRecord {
    question_id: String,
    user_id: String,
    vote_type: String,
}
impl VoteRecord {
    fn to_domain(self) -> Option<VoteRow> {
        Some(VoteRow {
            kind: vote_kind_from_remote(&self.vote_type)?,
            question_id: self.question_id,
            user_id: self.user_id,
        })
    }
}

/// The remote column spells the negative vote `dont_support`.
fn vote_kind_to_remote(kind: VoteKind) -> &'static str {
    match kind {
        VoteKind::Support => "support",
        VoteKind::DontSupport => "dont_support",
    }
}

fn vote_kind_from_remote(raw: &str) -> Option<VoteKind> {
    match raw {
        "support" => Some(VoteKind::Support),
        "dont_support" => Some(VoteKind::DontSupport),
        _ => None,
    }
}

#[derive(FromRow)]
struct StatsRecord {
    questions_asked: i32,
    supports_given: i32,
}
impl StatsRecord {
    fn to_domain(self) -> Stats {
        Stats {
            questions_asked: from_db_count(self.questions_asked),
            supports_given: from_db_count(self.supports_given),
        }
    }
}

#[derive(FromRow)]
struct CalorieRecord {
    user_id: String,
    date: NaiveDate,
    calories: i32,
    updated_at: DateTime<Utc>,
}
impl CalorieRecord {
    fn to_domain(self) -> CalorieEntry {
        CalorieEntry {
            user_id: self.user_id,
            date: self.date,
            calories: from_db_count(self.calories),
            updated_at: self.updated_at,
        }
    }
}

/// Payload published by the change trigger.
#[derive(Deserialize)]
struct ChangePayload {
    table: String,
    #[serde(rename = "type")]
    op: String,
    user_id: Option<String>,
}

fn parse_change(payload: &str) -> Option<ChangeEvent> {
    let raw: ChangePayload = serde_json::from_str(payload).ok()?;
    Some(ChangeEvent {
        table: Table::from_name(&raw.table)?,
        kind: ChangeKind::from_op(&raw.op)?,
        user_id: raw.user_id,
    })
}

//=========================================================================================
// `RemoteDataService` Trait Implementation
//=========================================================================================

#[async_trait]
impl RemoteDataService for DbAdapter {
    async fn insert_question(&self, question: NewQuestion) -> PortResult<Question> {
        let sql = format!(
            "INSERT INTO questions (id, question, answer, supports, dont_supports, user_id, user_email) \
             VALUES ($1, $2, $3, 0, 0, $4, $5) RETURNING {}",
            QUESTION_COLUMNS
        );
        let record = sqlx::query_as::<_, QuestionRecord>(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(&question.question)
            .bind(&question.answer)
            .bind(&question.user_id)
            .bind(&question.user_email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_error(Table::Questions, e))?;
        Ok(record.to_domain())
    }

    async fn list_questions(&self, limit: usize) -> PortResult<Vec<Question>> {
        let sql = format!(
            "SELECT {} FROM questions ORDER BY created_at DESC LIMIT $1",
            QUESTION_COLUMNS
        );
        let records = sqlx::query_as::<_, QuestionRecord>(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error(Table::Questions, e))?;

        let questions = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(questions)
    }

    async fn update_question_counts(
        &self,
        question_id: &str,
        supports: u32,
        dont_supports: u32,
    ) -> PortResult<()> {
        let result = sqlx::query("UPDATE questions SET supports = $1, dont_supports = $2 WHERE id = $3")
            .bind(to_db_count(supports)?)
            .bind(to_db_count(dont_supports)?)
            .bind(question_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error(Table::Questions, e))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Question {} not found", question_id)));
        }
        Ok(())
    }

    async fn insert_vote(&self, vote: VoteRow) -> PortResult<()> {
        sqlx::query("INSERT INTO votes (question_id, user_id, vote_type) VALUES ($1, $2, $3)")
            .bind(&vote.question_id)
            .bind(&vote.user_id)
            .bind(vote_kind_to_remote(vote.kind))
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error(Table::Votes, e))?;
        Ok(())
    }

    async fn list_votes(&self, user_id: &str) -> PortResult<Vec<VoteRow>> {
        let records = sqlx::query_as::<_, VoteRecord>(
            "SELECT question_id, user_id, vote_type FROM votes WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error(Table::Votes, e))?;

        Ok(records
            .into_iter()
            .filter_map(|r| {
                let raw = r.vote_type.clone();
                let row = r.to_domain();
                if row.is_none() {
                    warn!(vote_type = %raw, "Skipping vote with unknown type");
                }
                row
            })
            .collect())
    }

    async fn fetch_stats(&self, user_id: &str) -> PortResult<Option<Stats>> {
        let record = sqlx::query_as::<_, StatsRecord>(
            "SELECT questions_asked, supports_given FROM user_stats WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_error(Table::UserStats, e))?;
        Ok(record.map(StatsRecord::to_domain))
    }

    async fn upsert_stats(&self, user_id: &str, user_email: &str, stats: Stats) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_stats (user_id, user_email, questions_asked, supports_given) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id) DO UPDATE SET \
                user_email = EXCLUDED.user_email, \
                questions_asked = EXCLUDED.questions_asked, \
                supports_given = EXCLUDED.supports_given",
        )
        .bind(user_id)
        .bind(user_email)
        .bind(to_db_count(stats.questions_asked)?)
        .bind(to_db_count(stats.supports_given)?)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error(Table::UserStats, e))?;
        Ok(())
    }

    async fn find_calorie_entry(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> PortResult<Option<CalorieEntry>> {
        let sql = format!(
            "SELECT {} FROM calorie_tracker WHERE user_id = $1 AND date = $2",
            CALORIE_COLUMNS
        );
        let record = sqlx::query_as::<_, CalorieRecord>(&sql)
            .bind(user_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error(Table::CalorieTracker, e))?;
        Ok(record.map(CalorieRecord::to_domain))
    }

    async fn insert_calorie_entry(&self, entry: CalorieEntry) -> PortResult<CalorieEntry> {
        let sql = format!(
            "INSERT INTO calorie_tracker (user_id, date, calories, updated_at) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            CALORIE_COLUMNS
        );
        let record = sqlx::query_as::<_, CalorieRecord>(&sql)
            .bind(&entry.user_id)
            .bind(entry.date)
            .bind(to_db_count(entry.calories)?)
            .bind(entry.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_error(Table::CalorieTracker, e))?;
        Ok(record.to_domain())
    }

    async fn update_calorie_entry(&self, entry: CalorieEntry) -> PortResult<CalorieEntry> {
        let sql = format!(
            "UPDATE calorie_tracker SET calories = $1, updated_at = $2 \
             WHERE user_id = $3 AND date = $4 RETURNING {}",
            CALORIE_COLUMNS
        );
        let record = sqlx::query_as::<_, CalorieRecord>(&sql)
            .bind(to_db_count(entry.calories)?)
            .bind(entry.updated_at)
            .bind(&entry.user_id)
            .bind(entry.date)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_error(Table::CalorieTracker, e))?;
        Ok(record.to_domain())
    }

    async fn list_calorie_entries(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PortResult<Vec<CalorieEntry>> {
        let sql = format!(
            "SELECT {} FROM calorie_tracker \
             WHERE user_id = $1 AND date >= $2 AND date <= $3 ORDER BY date ASC",
            CALORIE_COLUMNS
        );
        let records = sqlx::query_as::<_, CalorieRecord>(&sql)
            .bind(user_id)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error(Table::CalorieTracker, e))?;

        let entries = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(entries)
    }

    async fn subscribe(&self, filter: ChangeFilter) -> PortResult<ChangeStream> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        listener
            .listen(CHANGE_CHANNEL)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        info!(table = filter.table.name(), "Listening for remote changes");

        let stream = async_stream::stream! {
            loop {
                match listener.recv().await {
                    Ok(notification) => match parse_change(notification.payload()) {
                        Some(event) if filter.matches(&event) => yield event,
                        Some(_) => {}
                        None => warn!(
                            payload = notification.payload(),
                            "Ignoring malformed change notification"
                        ),
                    },
                    Err(e) => {
                        error!("Change listener stopped: {}", e);
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_vote_uses_underscore_spelling_remotely() {
        assert_eq!(vote_kind_to_remote(VoteKind::DontSupport), "dont_support");
        assert_eq!(vote_kind_from_remote("dont_support"), Some(VoteKind::DontSupport));
        assert_eq!(vote_kind_from_remote("dontSupport"), None);
    }

    #[test]
    fn question_record_maps_every_column() {
        let created_at = Utc::now();
        let question = QuestionRecord {
            id: "q1".to_string(),
            question: "How many rest days?".to_string(),
            answer: "One or two.".to_string(),
            supports: 4,
            dont_supports: 1,
            user_id: "u1".to_string(),
            user_email: "u1@example.com".to_string(),
            created_at,
        }
        .to_domain();

        assert_eq!(question.dont_supports, 1);
        assert_eq!(question.user_id, "u1");
        assert_eq!(question.user_email, "u1@example.com");
        assert_eq!(question.created_at, created_at);
    }

    #[test]
    fn trigger_payload_parses_into_event() {
        let event =
            parse_change(r#"{"table":"calorie_entries","type":"UPDATE","user_id":"u1"}"#).unwrap();
        assert_eq!(event.table, Table::CalorieTracker);
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.user_id.as_deref(), Some("u1"));

        assert!(parse_change(r#"{"table":"sessions","type":"INSERT"}"#).is_none());
        assert!(parse_change("not json").is_none());
    }

    #[test]
    fn negative_counts_read_as_zero() {
        assert_eq!(from_db_count(-3), 0);
        assert!(to_db_count(u32::MAX).is_err());
    }
}
