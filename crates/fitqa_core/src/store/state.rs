//! crates/fitqa_core/src/store/state.rs
//!
//! The in-memory half of the store. Everything here is synchronous and is only
//! touched while the store's mutex is held; no method awaits.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::domain::{Question, Session, Settings, Stats, VoteKind};

/// Optimistic counter bumps made by a guest. Guests never write remotely, so
/// these are re-applied on top of every reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct GuestDelta {
    pub supports: u32,
    pub dont_supports: u32,
}

/// Issued when a reload starts; checked when it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReloadTicket {
    pub seq: u64,
    pub epoch: u64,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReloadDecision {
    Applied,
    /// The session changed while the fetch was in flight.
    SessionChanged,
    /// A newer reload has already been applied.
    Superseded,
    /// Local mutations happened after the fetch started, or votes are still
    /// being written. The cache is marked stale.
    Deferred,
}

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub session: Option<Session>,
    pub questions: Vec<Question>,
    pub votes: HashMap<String, VoteKind>,
    pub pending_votes: HashSet<String>,
    pub guest_deltas: HashMap<String, GuestDelta>,
    pub stats: Stats,
    pub settings: Settings,
    /// Bumped whenever the session starts or ends.
    pub epoch: u64,
    /// Bumped on every local mutation of `questions`.
    pub mutation_version: u64,
    pub next_reload_seq: u64,
    pub last_applied_reload: u64,
    pub stale: bool,
}

impl StoreState {
    /// Drops everything tied to the current identity. Settings survive.
    pub fn reset_identity(&mut self) {
        self.votes.clear();
        self.pending_votes.clear();
        self.guest_deltas.clear();
        self.stats = Stats::default();
        self.stale = false;
        self.epoch += 1;
    }

    pub fn issue_reload(&mut self) -> ReloadTicket {
        self.next_reload_seq += 1;
        ReloadTicket {
            seq: self.next_reload_seq,
            epoch: self.epoch,
            version: self.mutation_version,
        }
    }

    pub fn apply_reload(&mut self, ticket: ReloadTicket, mut fetched: Vec<Question>) -> ReloadDecision {
        if ticket.epoch != self.epoch {
            debug!(seq = ticket.seq, "Dropping reload started under a previous session");
            return ReloadDecision::SessionChanged;
        }
        if ticket.seq <= self.last_applied_reload {
            debug!(seq = ticket.seq, applied = self.last_applied_reload, "Dropping out-of-order reload");
            return ReloadDecision::Superseded;
        }
        if ticket.version != self.mutation_version || !self.pending_votes.is_empty() {
            debug!(seq = ticket.seq, "Deferring reload; local changes are newer");
            self.stale = true;
            return ReloadDecision::Deferred;
        }

        for question in fetched.iter_mut() {
            if let Some(delta) = self.guest_deltas.get(&question.id) {
                question.supports += delta.supports;
                question.dont_supports += delta.dont_supports;
            }
        }
        self.questions = fetched;
        self.last_applied_reload = ticket.seq;
        self.stale = false;
        ReloadDecision::Applied
    }

    /// Prepends a freshly stored question, keeping the cache bounded.
    pub fn push_question(&mut self, question: Question, page_size: usize) {
        self.questions.insert(0, question);
        self.questions.truncate(page_size);
        self.mutation_version += 1;
    }
}
