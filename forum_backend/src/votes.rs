//! Viewer-local votes and their reconciliation with stored counts.
//!
//! A viewer's vote lives in a [`VoteLedger`] until `sync` pushes it to the
//! store. Displayed scores combine the stored counts with the unsynced delta,
//! so a score never changes across a sync.

use crate::database::models::VoteCountDelta;
use crate::database::Database;
use crate::error::{ForumError, ForumResult};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn value(self) -> i8 {
        match self {
            VoteDirection::Up => 1,
            VoteDirection::Down => -1,
        }
    }
}

impl FromStr for VoteDirection {
    type Err = ForumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" | "upvote" | "+1" => Ok(VoteDirection::Up),
            "down" | "downvote" | "-1" => Ok(VoteDirection::Down),
            other => Err(ForumError::validation(format!(
                "unknown vote direction {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Post,
    Comment,
}

impl FromStr for SubjectKind {
    type Err = ForumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "post" | "posts" => Ok(SubjectKind::Post),
            "comment" | "comments" => Ok(SubjectKind::Comment),
            other => Err(ForumError::validation(format!(
                "unknown vote subject {other:?}"
            ))),
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubjectKind::Post => "post",
            SubjectKind::Comment => "comment",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoteKey {
    pub kind: SubjectKind,
    pub id: String,
}

impl VoteKey {
    pub fn new(kind: SubjectKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LedgerEntry {
    current: i8,
    synced: i8,
}

/// One viewer's votes. Absence of an entry means no vote.
#[derive(Debug, Clone, Default)]
pub struct VoteLedger {
    entries: HashMap<VoteKey, LedgerEntry>,
}

/// An entry whose local vote differs from what the store has seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVote {
    pub key: VoteKey,
    pub current: i8,
    pub synced: i8,
}

impl VoteLedger {
    /// Toggles a vote: the same direction clears it, the opposite replaces
    /// it. Returns the new vote value.
    pub fn cast(&mut self, key: VoteKey, direction: VoteDirection) -> i8 {
        let entry = self.entries.entry(key.clone()).or_default();
        entry.current = if entry.current == direction.value() {
            0
        } else {
            direction.value()
        };
        let current = entry.current;
        if *entry == LedgerEntry::default() {
            self.entries.remove(&key);
        }
        current
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn vote(&self, key: &VoteKey) -> i8 {
        self.entries.get(key).map(|e| e.current).unwrap_or(0)
    }

    /// Unsynced contribution of this viewer, in `-2..=2`.
    pub fn delta(&self, key: &VoteKey) -> i64 {
        self.entries
            .get(key)
            .map(|e| i64::from(e.current) - i64::from(e.synced))
            .unwrap_or(0)
    }

    pub fn pending(&self) -> Vec<PendingVote> {
        let mut pending: Vec<PendingVote> = self
            .entries
            .iter()
            .filter(|(_, e)| e.current != e.synced)
            .map(|(key, e)| PendingVote {
                key: key.clone(),
                current: e.current,
                synced: e.synced,
            })
            .collect();
        pending.sort_by(|a, b| a.key.cmp(&b.key));
        pending
    }

    /// Records that the store now reflects `value` for `key`.
    pub fn mark_synced(&mut self, key: &VoteKey, value: i8) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.synced = value;
            if entry.current == 0 && entry.synced == 0 {
                self.entries.remove(key);
            }
        }
    }

    pub fn forget(&mut self, key: &VoteKey) {
        self.entries.remove(key);
    }
}

/// Stored net score plus the viewer's unsynced delta.
pub fn effective_score(upvotes: i64, downvotes: i64, viewer_delta: i64) -> i64 {
    upvotes - downvotes + viewer_delta
}

/// Stored-count change that moves a subject from vote `from` to vote `to`.
pub fn count_delta(from: i8, to: i8) -> VoteCountDelta {
    let ups = |v: i8| i64::from(v == 1);
    let downs = |v: i8| i64::from(v == -1);
    VoteCountDelta {
        upvotes: ups(to) - ups(from),
        downvotes: downs(to) - downs(from),
    }
}

/// Viewer id used when a request names nobody. It may read but not vote.
pub const ANONYMOUS_VIEWER: &str = "anonymous";

/// Ledgers for every viewer seen by this process.
#[derive(Clone, Default)]
pub struct VoteBook {
    ledgers: Arc<Mutex<HashMap<String, VoteLedger>>>,
}

impl VoteBook {
    /// Runs `f` on the viewer's ledger while holding the book lock. A ledger
    /// that ends up empty is dropped.
    pub fn with_ledger<T, E>(
        &self,
        viewer: &str,
        f: impl FnOnce(&mut VoteLedger) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<anyhow::Error>,
    {
        let mut guard = self
            .ledgers
            .lock()
            .map_err(|_| anyhow!("vote book mutex poisoned"))?;
        let mut ledger = guard.remove(viewer).unwrap_or_default();
        let outcome = f(&mut ledger);
        if !ledger.is_empty() {
            guard.insert(viewer.to_string(), ledger);
        }
        outcome
    }

    /// A copy of the viewer's ledger, for rendering scores.
    pub fn snapshot(&self, viewer: &str) -> ForumResult<VoteLedger> {
        let guard = self
            .ledgers
            .lock()
            .map_err(|_| anyhow!("vote book mutex poisoned"))?;
        Ok(guard.get(viewer).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub kind: SubjectKind,
    pub id: String,
    /// The viewer's vote after the toggle: -1, 0 or 1.
    pub vote: i8,
    pub upvotes: i64,
    pub downvotes: i64,
    pub score: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub applied: usize,
    /// Votes on subjects that no longer exist; they are discarded.
    pub dropped: usize,
}

#[derive(Clone)]
pub struct VoteService {
    database: Database,
    book: VoteBook,
}

impl VoteService {
    pub fn new(database: Database, book: VoteBook) -> Self {
        Self { database, book }
    }

    pub fn book(&self) -> &VoteBook {
        &self.book
    }

    pub fn cast(
        &self,
        viewer: &str,
        kind: SubjectKind,
        id: &str,
        direction: VoteDirection,
    ) -> ForumResult<VoteOutcome> {
        if viewer == ANONYMOUS_VIEWER {
            return Err(ForumError::Unauthorized("sign in to vote".into()));
        }
        let key = VoteKey::new(kind, id);
        let outcome = self.book.with_ledger(viewer, |ledger| {
            let (upvotes, downvotes) = self.stored_counts(kind, id)?;
            let vote = ledger.cast(key.clone(), direction);
            Ok::<_, ForumError>(VoteOutcome {
                kind,
                id: id.to_string(),
                vote,
                upvotes,
                downvotes,
                score: effective_score(upvotes, downvotes, ledger.delta(&key)),
            })
        })?;
        debug!(viewer, subject = %kind, id, vote = outcome.vote, "vote cast");
        Ok(outcome)
    }

    /// Pushes the viewer's unsynced votes to storage in one unit of work.
    /// The book stays locked until the ledger is marked, so concurrent syncs
    /// apply each pending vote once.
    pub fn sync(&self, viewer: &str) -> ForumResult<SyncReport> {
        let report = self.book.with_ledger(viewer, |ledger| {
            let pending = ledger.pending();
            if pending.is_empty() {
                return Ok(SyncReport::default());
            }
            let outcomes = self.database.with_repositories(|repos| {
                let mut outcomes = Vec::with_capacity(pending.len());
                for vote in &pending {
                    let change = count_delta(vote.synced, vote.current);
                    let author = match vote.key.kind {
                        SubjectKind::Post => repos
                            .posts()
                            .adjust_votes(&vote.key.id, change)?
                            .map(|post| post.author_id),
                        SubjectKind::Comment => repos
                            .comments()
                            .adjust_votes(&vote.key.id, change)?
                            .map(|comment| comment.author_id),
                    };
                    if let Some(author_id) = &author {
                        let karma = i64::from(vote.current) - i64::from(vote.synced);
                        repos.users().adjust_karma(author_id, karma)?;
                    }
                    outcomes.push(author.is_some());
                }
                Ok::<_, ForumError>(outcomes)
            })?;

            let mut report = SyncReport::default();
            for (vote, applied) in pending.iter().zip(outcomes) {
                if applied {
                    ledger.mark_synced(&vote.key, vote.current);
                    report.applied += 1;
                } else {
                    ledger.forget(&vote.key);
                    report.dropped += 1;
                }
            }
            Ok::<_, ForumError>(report)
        })?;
        if report != SyncReport::default() {
            info!(viewer, applied = report.applied, dropped = report.dropped, "votes synced");
        }
        Ok(report)
    }

    fn stored_counts(&self, kind: SubjectKind, id: &str) -> ForumResult<(i64, i64)> {
        let counts = self.database.with_repositories(|repos| {
            Ok::<_, ForumError>(match kind {
                SubjectKind::Post => repos.posts().get(id)?.map(|p| (p.upvotes, p.downvotes)),
                SubjectKind::Comment => repos
                    .comments()
                    .get(id)?
                    .map(|c| (c.upvotes, c.downvotes)),
            })
        })?;
        counts.ok_or_else(|| ForumError::not_found(format!("{kind} {id}")))
    }
}
