use crate::error::Result;
use crate::model::{
    api::results::ResultEntry,
    db::candidate::Candidate,
    store::{BallotStore, TallySnapshot},
};

/// Count the votes for every candidate and rank them within their position.
///
/// Positions are listed in ascending order. Within a position candidates are
/// ordered by vote count, highest first, with ties going to the lower
/// candidate ID; `rank` follows that order starting from 1. Candidates without
/// any votes are included with a count of zero.
pub async fn compute_results(store: &dyn BallotStore) -> Result<Vec<ResultEntry>> {
    let snapshot = store.tally_snapshot().await?;
    Ok(rank_candidates(snapshot))
}

/// The pure part of [`compute_results`].
pub fn rank_candidates(snapshot: TallySnapshot) -> Vec<ResultEntry> {
    let TallySnapshot {
        mut candidates,
        counts,
    } = snapshot;
    let votes_for = |candidate: &Candidate| counts.get(&candidate.id).copied().unwrap_or(0);

    candidates.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| votes_for(b).cmp(&votes_for(a)))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut results = Vec::with_capacity(candidates.len());
    let mut current_position: Option<String> = None;
    let mut rank = 0;
    for candidate in candidates {
        let vote_count = votes_for(&candidate);
        if current_position.as_deref() == Some(candidate.position.as_str()) {
            rank += 1;
        } else {
            rank = 1;
            current_position = Some(candidate.position.clone());
        }
        results.push(ResultEntry {
            position: candidate.candidate.position,
            candidate_id: candidate.id.into(),
            name: candidate.candidate.name,
            vote_count,
            rank,
        });
    }
    results
}
