use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rocket::tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Error, Result};
use crate::model::{
    db::{
        candidate::{Candidate, NewCandidate},
        vote::{NewVote, Vote},
        voter::{NewVoter, Voter},
    },
    mongodb::Id,
};

use super::{BallotStore, BallotTxn, Claim, TallySnapshot, Turnout};

#[derive(Debug, Clone, Default)]
struct Tables {
    voters: BTreeMap<Id, Voter>,
    candidates: BTreeMap<Id, Candidate>,
    votes: Vec<Vote>,
}

/// An in-process ballot store.
///
/// Transactions hold the store lock from `begin` until they are dropped, so
/// they run one at a time and always see each other's committed state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    failing_claims: Arc<AtomicU32>,
    failing_commits: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` voter claims fail as if they hit a write conflict.
    pub fn fail_next_claims(&self, n: u32) {
        self.failing_claims.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` commits fail as if the storage were unreachable.
    pub fn fail_next_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }
}

/// Use up one injected fault, if any are left.
fn take_fault(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[rocket::async_trait]
impl BallotStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn BallotTxn>> {
        let guard = self.tables.clone().lock_owned().await;
        let pending = guard.clone();
        Ok(Box::new(MemoryTxn {
            guard,
            pending,
            failing_claims: self.failing_claims.clone(),
            failing_commits: self.failing_commits.clone(),
        }))
    }

    async fn voter(&self, id: Id) -> Result<Option<Voter>> {
        Ok(self.tables.lock().await.voters.get(&id).cloned())
    }

    async fn candidates(&self) -> Result<Vec<Candidate>> {
        let mut candidates = self
            .tables
            .lock()
            .await
            .candidates
            .values()
            .cloned()
            .collect::<Vec<_>>();
        candidates.sort_by(|a, b| (&a.position, a.id).cmp(&(&b.position, b.id)));
        Ok(candidates)
    }

    async fn votes_by_voter(&self, voter_id: Id) -> Result<Vec<Vote>> {
        let mut votes = self
            .tables
            .lock()
            .await
            .votes
            .iter()
            .filter(|vote| vote.voter_id == voter_id)
            .cloned()
            .collect::<Vec<_>>();
        votes.sort_by(|a, b| a.position.cmp(&b.position));
        Ok(votes)
    }

    async fn tally_snapshot(&self) -> Result<TallySnapshot> {
        let tables = self.tables.lock().await;
        let mut counts = HashMap::new();
        for vote in &tables.votes {
            *counts.entry(vote.candidate_id).or_insert(0) += 1;
        }
        Ok(TallySnapshot {
            candidates: tables.candidates.values().cloned().collect(),
            counts,
        })
    }

    async fn turnout(&self) -> Result<Turnout> {
        let tables = self.tables.lock().await;
        Ok(Turnout {
            registered: tables.voters.len() as u64,
            voted: tables.voters.values().filter(|v| v.has_voted).count() as u64,
            ballot_entries: tables.votes.len() as u64,
        })
    }

    async fn insert_voter(&self, voter: NewVoter) -> Result<Id> {
        let id = Id::new();
        self.tables
            .lock()
            .await
            .voters
            .insert(id, Voter { id, voter });
        Ok(id)
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Id> {
        let id = Id::new();
        self.tables
            .lock()
            .await
            .candidates
            .insert(id, Candidate { id, candidate });
        Ok(id)
    }
}

/// Writes go to a private copy of the tables, which replaces the shared
/// tables on commit.
struct MemoryTxn {
    guard: OwnedMutexGuard<Tables>,
    pending: Tables,
    failing_claims: Arc<AtomicU32>,
    failing_commits: Arc<AtomicU32>,
}

#[rocket::async_trait]
impl BallotTxn for MemoryTxn {
    async fn claim_voter(&mut self, voter_id: Id) -> Result<Claim> {
        if take_fault(&self.failing_claims) {
            return Err(Error::StorageUnavailable(
                "claim failed: injected write conflict".to_string(),
            ));
        }
        Ok(match self.pending.voters.get_mut(&voter_id) {
            None => Claim::UnknownVoter,
            Some(voter) if voter.has_voted => Claim::AlreadyVoted,
            Some(voter) => {
                voter.has_voted = true;
                Claim::Claimed
            }
        })
    }

    async fn candidates(&mut self) -> Result<Vec<Candidate>> {
        Ok(self.pending.candidates.values().cloned().collect())
    }

    async fn insert_votes(&mut self, votes: Vec<NewVote>) -> Result<()> {
        for vote in votes {
            let taken = self
                .pending
                .votes
                .iter()
                .any(|v| v.voter_id == vote.voter_id && v.position == vote.position);
            if taken {
                return Err(Error::AlreadyVoted);
            }
            self.pending.votes.push(Vote { id: Id::new(), vote });
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if take_fault(&self.failing_commits) {
            return Err(Error::StorageUnavailable(
                "commit failed: injected fault".to_string(),
            ));
        }
        *self.guard = std::mem::take(&mut self.pending);
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        self.pending = self.guard.clone();
        Ok(())
    }
}
