//! crates/fitqa_core/src/store/questions.rs
//!
//! The question cache and the vote ledger, plus the real-time reload path.

use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::{GuestDelta, ReloadDecision};
use super::{log_read_failure, AppStore};
use crate::domain::{ChangeFilter, NewQuestion, Question, Table, VoteKind, VoteRow};
use crate::error::{StoreError, StoreResult};

pub const TRENDING_LIMIT: usize = 10;
pub const MAX_ANSWER_WORDS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded,
    /// The session already voted on this question; nothing changed.
    AlreadyVoted,
}

/// Keeps the first `max_words` space-separated words.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    text.split(' ').take(max_words).collect::<Vec<_>>().join(" ")
}

impl AppStore {
    /// Stores a question/answer pair and prepends it to the cache.
    pub async fn add_question(&self, question: &str, answer: &str) -> StoreResult<Question> {
        let question = question.trim();
        if question.is_empty() {
            return Err(StoreError::Validation("Please enter a question".to_string()));
        }

        let (session, epoch) = {
            let state = self.state.lock().await;
            let session = state.session.clone().ok_or(StoreError::NotSignedIn)?;
            (session, state.epoch)
        };

        let stored = self
            .remote
            .insert_question(NewQuestion {
                question: question.to_string(),
                answer: answer.to_string(),
                user_id: session.id.clone(),
                user_email: session.email.clone(),
            })
            .await
            .map_err(|e| {
                error!(user_id = %session.id, "Failed to save question: {}", e);
                StoreError::from(e)
            })?;

        {
            let mut state = self.state.lock().await;
            if state.epoch != epoch {
                return Ok(stored);
            }
            state.push_question(stored.clone(), self.page_size);
            state.stats.questions_asked += 1;
        }
        self.persist_stats(&session, epoch).await;

        info!(question_id = %stored.id, "Question added");
        Ok(stored)
    }

    /// Asks the AI service, trims the answer and stores the pair.
    pub async fn ask(&self, question: &str) -> StoreResult<Question> {
        let question = question.trim();
        if question.is_empty() {
            return Err(StoreError::Validation("Please enter a question".to_string()));
        }
        if self.session().await.is_none() {
            return Err(StoreError::NotSignedIn);
        }

        let answer = self.answers.answer(question).await.map_err(|e| {
            error!("AI answer failed: {}", e);
            StoreError::from(e)
        })?;
        let answer = truncate_words(answer.trim(), MAX_ANSWER_WORDS);

        self.add_question(question, &answer).await
    }

    /// Records one vote per question per session. Repeat calls are no-ops.
    pub async fn vote_question(&self, question_id: &str, kind: VoteKind) -> StoreResult<VoteOutcome> {
        let (session, supports, dont_supports, epoch) = {
            let mut state = self.state.lock().await;
            let session = state.session.clone().ok_or(StoreError::NotSignedIn)?;
            if state.votes.contains_key(question_id) || state.pending_votes.contains(question_id) {
                return Ok(VoteOutcome::AlreadyVoted);
            }

            let question = state
                .questions
                .iter_mut()
                .find(|q| q.id == question_id)
                .ok_or_else(|| StoreError::UnknownQuestion(question_id.to_string()))?;
            match kind {
                VoteKind::Support => question.supports += 1,
                VoteKind::DontSupport => question.dont_supports += 1,
            }
            let (supports, dont_supports) = (question.supports, question.dont_supports);

            state.votes.insert(question_id.to_string(), kind);
            if kind == VoteKind::Support {
                state.stats.supports_given += 1;
            }

            // Guest bumps ride on the delta overlay, so only account votes
            // invalidate reloads already in flight.
            if session.is_guest {
                let delta = state
                    .guest_deltas
                    .entry(question_id.to_string())
                    .or_insert_with(GuestDelta::default);
                match kind {
                    VoteKind::Support => delta.supports += 1,
                    VoteKind::DontSupport => delta.dont_supports += 1,
                }
            } else {
                state.pending_votes.insert(question_id.to_string());
                state.mutation_version += 1;
            }
            (session, supports, dont_supports, state.epoch)
        };

        debug!(question_id, vote = kind.as_str(), "Vote applied locally");

        if session.is_guest {
            if kind == VoteKind::Support {
                self.persist_stats(&session, epoch).await;
            }
            return Ok(VoteOutcome::Recorded);
        }

        // Two sequential writes with no compensation; the local state stands
        // either way and a reload reconciles the counters.
        let written = async {
            self.remote
                .insert_vote(VoteRow {
                    question_id: question_id.to_string(),
                    user_id: session.id.clone(),
                    kind,
                })
                .await?;
            self.remote
                .update_question_counts(question_id, supports, dont_supports)
                .await
        }
        .await;
        if let Err(e) = &written {
            warn!(question_id, "Failed to persist vote remotely: {}", e);
        }
        if kind == VoteKind::Support {
            self.persist_stats(&session, epoch).await;
        }

        let reload = {
            let mut state = self.state.lock().await;
            if state.epoch != epoch {
                return Ok(VoteOutcome::Recorded);
            }
            state.pending_votes.remove(question_id);
            state.pending_votes.is_empty() && (state.stale || written.is_err())
        };
        if reload {
            self.reload_questions().await;
        }

        Ok(VoteOutcome::Recorded)
    }

    /// The most supported questions, at most ten. Equal counts keep cache order.
    pub async fn get_trending_questions(&self) -> Vec<Question> {
        let mut questions = self.questions().await;
        questions.sort_by(|a, b| b.supports.cmp(&a.supports));
        questions.truncate(TRENDING_LIMIT);
        questions
    }

    /// Replaces the cache with the remote page. Returns whether the result was
    /// applied; a fetch that raced with newer local changes is discarded.
    pub async fn reload_questions(&self) -> bool {
        let ticket = self.state.lock().await.issue_reload();

        let fetched = match self.remote.list_questions(self.page_size).await {
            Ok(questions) => questions,
            Err(e) if e.is_missing_table() => {
                log_read_failure("questions", &e);
                Vec::new()
            }
            Err(e) => {
                log_read_failure("questions", &e);
                return false;
            }
        };

        let decision = self.state.lock().await.apply_reload(ticket, fetched);
        decision == ReloadDecision::Applied
    }

    /// Reloads the question cache whenever the remote table changes.
    pub fn start_sync(self: &Arc<Self>) -> SyncHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let store = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut changes = match store
                .remote
                .subscribe(ChangeFilter::table(Table::Questions))
                .await
            {
                Ok(changes) => changes,
                Err(e) => {
                    warn!("Real-time updates for questions unavailable: {}", e);
                    return;
                }
            };
            info!("Real-time subscription active for questions");

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    event = changes.next() => match event {
                        Some(event) => {
                            debug!(kind = ?event.kind, "Questions changed remotely; reloading");
                            store.reload_questions().await;
                        }
                        None => {
                            warn!("Question change stream ended");
                            break;
                        }
                    },
                }
            }
        });

        SyncHandle { token, task }
    }
}

/// Owns the background sync task.
pub struct SyncHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!("Sync task ended abnormally: {}", e);
        }
    }
}
