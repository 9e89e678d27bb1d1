use std::collections::btree_map::Entry;

use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::ballot::{BallotViolation, Selections},
};

/// A voter's full ballot, as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotRequest {
    pub votes: Vec<SelectionSpec>,
}

/// The candidate a voter chose for one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSpec {
    pub position: String,
    pub candidate_id: ApiId,
}

impl BallotRequest {
    /// Key the selections by position, rejecting any position given twice.
    pub fn into_selections(self) -> Result<Selections, BallotViolation> {
        let mut selections = Selections::new();
        for spec in self.votes {
            match selections.entry(spec.position) {
                Entry::Occupied(entry) => {
                    return Err(BallotViolation::DuplicatePosition(entry.key().clone()))
                }
                Entry::Vacant(entry) => {
                    entry.insert(*spec.candidate_id);
                }
            }
        }
        Ok(selections)
    }
}
