//! In-memory stand-ins for the hosted backend, the auth provider and the AI
//! service.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use fitqa_core::{
    AnswerService, AppStore, AuthEvent, AuthService, AuthUser, CalorieEntry, ChangeEvent,
    ChangeFilter, ChangeKind, ChangeStream, Clock, MemoryLocalStore, NewQuestion, PortError,
    PortResult, Question, RemoteDataService, Stats, StorePorts, Table, VoteRow,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};

//=========================================================================================
// Remote data service
//=========================================================================================

#[derive(Default)]
pub struct Tables {
    /// Newest first.
    pub questions: Vec<Question>,
    pub votes: Vec<VoteRow>,
    pub stats: HashMap<String, (String, Stats)>,
    pub calories: Vec<CalorieEntry>,
    pub next_id: u64,
}

pub struct FakeRemote {
    pub tables: Mutex<Tables>,
    changes: broadcast::Sender<ChangeEvent>,
    pub missing_tables: Mutex<HashSet<Table>>,
    pub fail_vote_writes: Mutex<bool>,
    pub question_list_calls: Mutex<u32>,
    /// When set, the next `upsert_stats` waits for a notification before writing.
    pub stats_gate: Mutex<Option<Arc<Notify>>>,
    pub held_stats_writes: Mutex<u32>,
}

impl FakeRemote {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            tables: Mutex::new(Tables::default()),
            changes,
            missing_tables: Mutex::new(HashSet::new()),
            fail_vote_writes: Mutex::new(false),
            question_list_calls: Mutex::new(0),
            stats_gate: Mutex::new(None),
            held_stats_writes: Mutex::new(0),
        }
    }

    pub fn with_missing(self, table: Table) -> Self {
        self.missing_tables.lock().unwrap().insert(table);
        self
    }

    /// Inserts as if another client did it, including the change notification.
    pub fn seed_question(&self, question: &str, supports: u32) -> Question {
        let mut tables = self.tables.lock().unwrap();
        tables.next_id += 1;
        let stored = Question {
            id: format!("q{}", tables.next_id),
            question: question.to_string(),
            answer: "seeded".to_string(),
            supports,
            dont_supports: 0,
            user_id: "someone".to_string(),
            user_email: "someone@example.com".to_string(),
            created_at: Utc::now(),
        };
        tables.questions.insert(0, stored.clone());
        drop(tables);
        self.notify(Table::Questions, ChangeKind::Insert, Some("someone"));
        stored
    }

    pub fn vote_rows(&self) -> Vec<VoteRow> {
        self.tables.lock().unwrap().votes.clone()
    }

    pub fn stats_rows(&self) -> HashMap<String, (String, Stats)> {
        self.tables.lock().unwrap().stats.clone()
    }

    pub fn remote_question(&self, id: &str) -> Option<Question> {
        self.tables
            .lock()
            .unwrap()
            .questions
            .iter()
            .find(|q| q.id == id)
            .cloned()
    }

    fn check(&self, table: Table) -> PortResult<()> {
        if self.missing_tables.lock().unwrap().contains(&table) {
            return Err(PortError::MissingTable(table.name().to_string()));
        }
        Ok(())
    }

    fn notify(&self, table: Table, kind: ChangeKind, user_id: Option<&str>) {
        let _ = self.changes.send(ChangeEvent {
            table,
            kind,
            user_id: user_id.map(str::to_string),
        });
    }
}

#[async_trait]
impl RemoteDataService for FakeRemote {
    async fn insert_question(&self, question: NewQuestion) -> PortResult<Question> {
        self.check(Table::Questions)?;
        let mut tables = self.tables.lock().unwrap();
        tables.next_id += 1;
        let stored = Question {
            id: format!("q{}", tables.next_id),
            question: question.question,
            answer: question.answer,
            supports: 0,
            dont_supports: 0,
            user_id: question.user_id.clone(),
            user_email: question.user_email,
            created_at: Utc::now(),
        };
        tables.questions.insert(0, stored.clone());
        drop(tables);
        self.notify(Table::Questions, ChangeKind::Insert, Some(&question.user_id));
        Ok(stored)
    }

    async fn list_questions(&self, limit: usize) -> PortResult<Vec<Question>> {
        *self.question_list_calls.lock().unwrap() += 1;
        self.check(Table::Questions)?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.questions.iter().take(limit).cloned().collect())
    }

    async fn update_question_counts(
        &self,
        question_id: &str,
        supports: u32,
        dont_supports: u32,
    ) -> PortResult<()> {
        if *self.fail_vote_writes.lock().unwrap() {
            return Err(PortError::Unexpected("connection reset".to_string()));
        }
        let mut tables = self.tables.lock().unwrap();
        let question = tables
            .questions
            .iter_mut()
            .find(|q| q.id == question_id)
            .ok_or_else(|| PortError::NotFound(question_id.to_string()))?;
        question.supports = supports;
        question.dont_supports = dont_supports;
        Ok(())
    }

    async fn insert_vote(&self, vote: VoteRow) -> PortResult<()> {
        if *self.fail_vote_writes.lock().unwrap() {
            return Err(PortError::Unexpected("connection reset".to_string()));
        }
        self.tables.lock().unwrap().votes.push(vote);
        Ok(())
    }

    async fn list_votes(&self, user_id: &str) -> PortResult<Vec<VoteRow>> {
        self.check(Table::Votes)?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .votes
            .iter()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn fetch_stats(&self, user_id: &str) -> PortResult<Option<Stats>> {
        self.check(Table::UserStats)?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.stats.get(user_id).map(|(_, stats)| *stats))
    }

    async fn upsert_stats(&self, user_id: &str, user_email: &str, stats: Stats) -> PortResult<()> {
        self.check(Table::UserStats)?;
        let gate = self.stats_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            *self.held_stats_writes.lock().unwrap() += 1;
            gate.notified().await;
        }
        self.tables
            .lock()
            .unwrap()
            .stats
            .insert(user_id.to_string(), (user_email.to_string(), stats));
        Ok(())
    }

    async fn find_calorie_entry(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> PortResult<Option<CalorieEntry>> {
        self.check(Table::CalorieTracker)?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .calories
            .iter()
            .find(|e| e.user_id == user_id && e.date == date)
            .cloned())
    }

    async fn insert_calorie_entry(&self, entry: CalorieEntry) -> PortResult<CalorieEntry> {
        self.check(Table::CalorieTracker)?;
        self.tables.lock().unwrap().calories.push(entry.clone());
        self.notify(Table::CalorieTracker, ChangeKind::Insert, Some(&entry.user_id));
        Ok(entry)
    }

    async fn update_calorie_entry(&self, entry: CalorieEntry) -> PortResult<CalorieEntry> {
        self.check(Table::CalorieTracker)?;
        let mut tables = self.tables.lock().unwrap();
        let existing = tables
            .calories
            .iter_mut()
            .find(|e| e.user_id == entry.user_id && e.date == entry.date)
            .ok_or_else(|| PortError::NotFound(entry.date.to_string()))?;
        *existing = entry.clone();
        drop(tables);
        self.notify(Table::CalorieTracker, ChangeKind::Update, Some(&entry.user_id));
        Ok(entry)
    }

    async fn list_calorie_entries(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PortResult<Vec<CalorieEntry>> {
        self.check(Table::CalorieTracker)?;
        let tables = self.tables.lock().unwrap();
        let mut entries: Vec<CalorieEntry> = tables
            .calories
            .iter()
            .filter(|e| e.user_id == user_id && e.date >= start && e.date <= end)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.date);
        Ok(entries)
    }

    async fn subscribe(&self, filter: ChangeFilter) -> PortResult<ChangeStream> {
        self.check(filter.table)?;
        let rx = self.changes.subscribe();
        Ok(Box::pin(futures::stream::unfold(rx, move |mut rx| {
            let filter = filter.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(event) if filter.matches(&event) => return Some((event, rx)),
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        })))
    }
}

//=========================================================================================
// Auth provider
//=========================================================================================

pub struct FakeAuth {
    accounts: Mutex<HashMap<String, (String, String)>>,
    current: Mutex<Option<AuthUser>>,
    events: broadcast::Sender<AuthEvent>,
    pub calls: Mutex<u32>,
    /// When set, `sign_out` waits for a notification before returning.
    pub sign_out_gate: Mutex<Option<Arc<Notify>>>,
    pub sign_out_calls: Mutex<u32>,
}

impl FakeAuth {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            events,
            calls: Mutex::new(0),
            sign_out_gate: Mutex::new(None),
            sign_out_calls: Mutex::new(0),
        }
    }

    pub fn with_account(self, email: &str, password: &str, id: &str) -> Self {
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), id.to_string()));
        self
    }

    pub fn set_current(&self, user: Option<AuthUser>) {
        *self.current.lock().unwrap() = user;
    }

    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl AuthService for FakeAuth {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<AuthUser> {
        *self.calls.lock().unwrap() += 1;
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(PortError::Auth("User already registered".to_string()));
        }
        let id = format!("user-{}", accounts.len() + 1);
        accounts.insert(email.to_string(), (password.to_string(), id.clone()));
        let user = AuthUser {
            id,
            email: email.to_string(),
        };
        *self.current.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthUser> {
        *self.calls.lock().unwrap() += 1;
        let accounts = self.accounts.lock().unwrap();
        match accounts.get(email) {
            Some((stored, id)) if stored == password => {
                let user = AuthUser {
                    id: id.clone(),
                    email: email.to_string(),
                };
                *self.current.lock().unwrap() = Some(user.clone());
                Ok(user)
            }
            _ => Err(PortError::Auth("Invalid login credentials".to_string())),
        }
    }

    async fn sign_out(&self) -> PortResult<()> {
        *self.sign_out_calls.lock().unwrap() += 1;
        let gate = self.sign_out_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        *self.current.lock().unwrap() = None;
        Ok(())
    }

    async fn current_user(&self) -> PortResult<Option<AuthUser>> {
        Ok(self.current.lock().unwrap().clone())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

//=========================================================================================
// AI answers and time
//=========================================================================================

pub struct FakeAnswers {
    pub reply: String,
    /// When set, every call fails with this provider message.
    pub refusal: Option<String>,
}

#[async_trait]
impl AnswerService for FakeAnswers {
    async fn answer(&self, _question: &str) -> PortResult<String> {
        match &self.refusal {
            Some(message) => Err(PortError::Provider(message.clone())),
            None => Ok(self.reply.clone()),
        }
    }
}

pub struct FixedClock {
    pub now: DateTime<Utc>,
}

impl FixedClock {
    pub fn on(year: i32, month: u32, day: u32) -> Self {
        Self {
            now: Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap(),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

//=========================================================================================
// Harness
//=========================================================================================

pub const EMAIL: &str = "sam@example.com";
pub const PASSWORD: &str = "hunter22";
pub const USER_ID: &str = "user-sam";

pub struct Harness {
    pub store: Arc<AppStore>,
    pub remote: Arc<FakeRemote>,
    pub auth: Arc<FakeAuth>,
    pub local: Arc<MemoryLocalStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(FakeRemote::new(), MemoryLocalStore::new(), "An answer.")
    }

    pub fn build(remote: FakeRemote, local: MemoryLocalStore, reply: &str) -> Self {
        Self::with_answers(
            remote,
            local,
            FakeAnswers {
                reply: reply.to_string(),
                refusal: None,
            },
        )
    }

    /// An AI service that refuses every question with `message`.
    pub fn refusing_answers(message: &str) -> Self {
        Self::with_answers(
            FakeRemote::new(),
            MemoryLocalStore::new(),
            FakeAnswers {
                reply: String::new(),
                refusal: Some(message.to_string()),
            },
        )
    }

    fn with_answers(remote: FakeRemote, local: MemoryLocalStore, answers: FakeAnswers) -> Self {
        let remote = Arc::new(remote);
        let auth = Arc::new(FakeAuth::new().with_account(EMAIL, PASSWORD, USER_ID));
        let local = Arc::new(local);
        let store = AppStore::new(StorePorts {
            remote: remote.clone(),
            auth: auth.clone(),
            answers: Arc::new(answers),
            local: local.clone(),
        })
        .with_clock(Arc::new(FixedClock::on(2024, 3, 15)));
        Self {
            store: Arc::new(store),
            remote,
            auth,
            local,
        }
    }

    pub fn today(&self) -> NaiveDate {
        FixedClock::on(2024, 3, 15).today()
    }

    pub fn days_ago(&self, days: i64) -> NaiveDate {
        self.today() - Duration::days(days)
    }
}
