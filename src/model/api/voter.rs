use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    db::{vote::Vote, voter::Voter},
};

/// Whether a voter has voted, and what they voted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterStatus {
    pub has_voted: bool,
    pub votes: Vec<CastVote>,
}

impl VoterStatus {
    pub fn new(voter: &Voter, votes: Vec<Vote>) -> Self {
        Self {
            has_voted: voter.has_voted,
            votes: votes.into_iter().map(Into::into).collect(),
        }
    }
}

/// One of the voter's own ballot entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVote {
    pub position: String,
    pub candidate_id: ApiId,
    pub cast_at: DateTime<Utc>,
}

impl From<Vote> for CastVote {
    fn from(vote: Vote) -> Self {
        Self {
            position: vote.vote.position,
            candidate_id: vote.vote.candidate_id.into(),
            cast_at: vote.vote.cast_at,
        }
    }
}
