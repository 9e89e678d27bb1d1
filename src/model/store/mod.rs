//! The ballot store: durable record of voters, candidates and votes.
//!
//! Every write a submission makes goes through a [`BallotTxn`], which either
//! commits completely or leaves no trace.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{
    db::{
        candidate::{Candidate, NewCandidate},
        vote::{NewVote, Vote},
        voter::{NewVoter, Voter},
    },
    mongodb::Id,
};

mod memory;

pub use memory::MemoryStore;

/// The store handle placed in managed state.
pub type SharedStore = Arc<dyn BallotStore>;

/// Result of claiming a voter at the start of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The voter's flag was flipped to "has voted" within the transaction.
    Claimed,
    AlreadyVoted,
    UnknownVoter,
}

/// Candidates and their vote counts, read from one consistent snapshot.
/// Candidates without votes have no entry in `counts`.
#[derive(Debug, Clone, Default)]
pub struct TallySnapshot {
    pub candidates: Vec<Candidate>,
    pub counts: HashMap<Id, u64>,
}

/// Raw participation figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Turnout {
    pub registered: u64,
    pub voted: u64,
    pub ballot_entries: u64,
}

#[rocket::async_trait]
pub trait BallotStore: Send + Sync {
    /// Open a transaction. Dropping it without committing discards its writes.
    async fn begin(&self) -> Result<Box<dyn BallotTxn>>;

    async fn voter(&self, id: Id) -> Result<Option<Voter>>;

    /// All candidates, ordered by position and then ID.
    async fn candidates(&self) -> Result<Vec<Candidate>>;

    /// The given voter's ballot entries, ordered by position.
    async fn votes_by_voter(&self, voter_id: Id) -> Result<Vec<Vote>>;

    async fn tally_snapshot(&self) -> Result<TallySnapshot>;

    async fn turnout(&self) -> Result<Turnout>;

    /// Register a voter. Registration itself is handled elsewhere; this is the
    /// hook it (and test setup) writes through.
    async fn insert_voter(&self, voter: NewVoter) -> Result<Id>;

    /// Add a candidate. Used by administrative tooling and test setup.
    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Id>;
}

/// A single all-or-nothing unit of work against the store.
#[rocket::async_trait]
pub trait BallotTxn: Send {
    /// Atomically flip the voter's flag from "not voted" to "voted", taking
    /// whatever lock the store uses to exclude a concurrent claim.
    async fn claim_voter(&mut self, voter_id: Id) -> Result<Claim>;

    /// The candidates as seen by this transaction.
    async fn candidates(&mut self) -> Result<Vec<Candidate>>;

    /// Insert ballot entries. A second entry for the same (voter, position)
    /// is reported as [`Error::AlreadyVoted`](crate::error::Error::AlreadyVoted).
    async fn insert_votes(&mut self, votes: Vec<NewVote>) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn abort(&mut self) -> Result<()>;
}
