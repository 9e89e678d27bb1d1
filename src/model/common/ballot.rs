use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;

use crate::model::{api::id::ApiId, db::candidate::Candidate, mongodb::Id};

/// A voter's choices: exactly one candidate per contested position.
pub type Selections = BTreeMap<String, Id>;

/// The distinct positions contested by the given candidates.
pub fn position_set(candidates: &[Candidate]) -> BTreeSet<&str> {
    candidates.iter().map(|c| c.position.as_str()).collect()
}

/// Why a ballot was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BallotViolation {
    #[error("there are no contested positions")]
    NoContestedPositions,
    #[error("position '{0}' was selected more than once")]
    DuplicatePosition(String),
    #[error("position '{0}' is not contested")]
    UnexpectedPosition(String),
    #[error("no vote for position '{0}'")]
    MissingPosition(String),
    #[error("candidate '{0}' does not exist")]
    UnknownCandidate(ApiId),
    #[error("candidate '{candidate}' stands for '{actual}', not '{selected}'")]
    PositionMismatch {
        candidate: ApiId,
        selected: String,
        actual: String,
    },
}

/// Check that the selections name exactly one existing, matching candidate for
/// every position in the position set, and nothing else.
pub fn validate_selections(
    candidates: &[Candidate],
    selections: &Selections,
) -> Result<(), BallotViolation> {
    let positions = position_set(candidates);
    if positions.is_empty() {
        return Err(BallotViolation::NoContestedPositions);
    }

    let by_id = candidates
        .iter()
        .map(|c| (c.id, c))
        .collect::<HashMap<_, _>>();

    for (position, candidate_id) in selections {
        if !positions.contains(position.as_str()) {
            return Err(BallotViolation::UnexpectedPosition(position.clone()));
        }
        let candidate = by_id
            .get(candidate_id)
            .ok_or_else(|| BallotViolation::UnknownCandidate((*candidate_id).into()))?;
        if candidate.position != *position {
            return Err(BallotViolation::PositionMismatch {
                candidate: (*candidate_id).into(),
                selected: position.clone(),
                actual: candidate.position.clone(),
            });
        }
    }

    // Selected positions are a subset of the position set; now check coverage.
    if let Some(missing) = positions
        .iter()
        .find(|position| !selections.contains_key(**position))
    {
        return Err(BallotViolation::MissingPosition(missing.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::model::db::candidate::CandidateCore;

    use super::*;

    fn candidate(position: &str, name: &str) -> Candidate {
        Candidate {
            id: Id::new(),
            candidate: CandidateCore::new(position, name),
        }
    }

    /// President: A, B. Secretary: C.
    fn field() -> Vec<Candidate> {
        vec![
            candidate("president", "A"),
            candidate("president", "B"),
            candidate("secretary", "C"),
        ]
    }

    fn selections(pairs: &[(&str, Id)]) -> Selections {
        pairs
            .iter()
            .map(|(position, id)| (position.to_string(), *id))
            .collect()
    }

    #[test]
    fn full_ballot_is_valid() {
        let candidates = field();
        let ballot = selections(&[
            ("president", candidates[1].id),
            ("secretary", candidates[2].id),
        ]);
        assert_eq!(validate_selections(&candidates, &ballot), Ok(()));
    }

    #[test]
    fn missing_position_is_rejected() {
        let candidates = field();
        let ballot = selections(&[("president", candidates[0].id)]);
        assert_eq!(
            validate_selections(&candidates, &ballot),
            Err(BallotViolation::MissingPosition("secretary".to_string()))
        );
    }

    #[test]
    fn extra_position_is_rejected() {
        let candidates = field();
        let ballot = selections(&[
            ("president", candidates[0].id),
            ("secretary", candidates[2].id),
            ("treasurer", candidates[2].id),
        ]);
        assert_eq!(
            validate_selections(&candidates, &ballot),
            Err(BallotViolation::UnexpectedPosition("treasurer".to_string()))
        );
    }

    #[test]
    fn wrong_position_is_rejected() {
        let candidates = field();
        let ballot = selections(&[
            ("president", candidates[2].id),
            ("secretary", candidates[2].id),
        ]);
        assert_eq!(
            validate_selections(&candidates, &ballot),
            Err(BallotViolation::PositionMismatch {
                candidate: candidates[2].id.into(),
                selected: "president".to_string(),
                actual: "secretary".to_string(),
            })
        );
    }

    #[test]
    fn unknown_candidate_is_rejected() {
        let candidates = field();
        let stranger = Id::new();
        let ballot = selections(&[("president", stranger), ("secretary", candidates[2].id)]);
        assert_eq!(
            validate_selections(&candidates, &ballot),
            Err(BallotViolation::UnknownCandidate(stranger.into()))
        );
    }

    #[test]
    fn nothing_to_vote_for() {
        assert_eq!(
            validate_selections(&[], &Selections::new()),
            Err(BallotViolation::NoContestedPositions)
        );
    }

    #[test]
    fn empty_ballot_reports_first_missing_position() {
        assert_eq!(
            validate_selections(&field(), &Selections::new()),
            Err(BallotViolation::MissingPosition("president".to_string()))
        );
    }

    #[test]
    fn positions_are_deduplicated() {
        let candidates = field();
        let positions = position_set(&candidates).into_iter().collect::<Vec<_>>();
        assert_eq!(positions, vec!["president", "secretary"]);
    }
}
