use chrono::Utc;
use rand::Rng;
use rocket::tokio::time::{sleep, Duration};

use crate::error::{Error, Result};
use crate::model::{
    common::ballot::{validate_selections, Selections},
    db::vote::NewVote,
    mongodb::Id,
    store::{BallotStore, BallotTxn, Claim},
};

/// How many times a submission is attempted before a transient storage
/// failure is reported to the caller.
const MAX_ATTEMPTS: u32 = 5;

/// Record a voter's full ballot.
///
/// The voter's flag flip and the ballot entries are written in one
/// transaction: either all of them persist or none do. Fails with
/// [`Error::AlreadyVoted`] if the voter has a ballot on record, and with
/// [`Error::InvalidBallot`] unless `selections` covers exactly the contested
/// positions with matching candidates. Transient storage failures are retried
/// here; if they persist the result is [`Error::StorageUnavailable`], and
/// resending the same ballot is safe.
pub async fn submit_ballot(
    store: &dyn BallotStore,
    voter_id: Id,
    selections: &Selections,
) -> Result<()> {
    let mut attempt = 1;
    loop {
        match try_submit(store, voter_id, selections).await {
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                warn!(
                    "Ballot for voter {voter_id} hit a transient failure \
(attempt {attempt}/{MAX_ATTEMPTS}): {err}"
                );
                backoff(attempt).await;
                attempt += 1;
            }
            Err(err) if err.is_transient() => {
                // A concurrent submission may have held the voter's row for
                // every attempt; if it committed, this one lost the race.
                let err = already_voted_or(store, voter_id, err).await;
                if !matches!(err, Error::AlreadyVoted) {
                    error!("Giving up on ballot for voter {voter_id}: {err}");
                    return Err(Error::StorageUnavailable(err.to_string()));
                }
                return Err(err);
            }
            result => return result,
        }
    }
}

/// A voter who has already voted is told so, whatever else went wrong with
/// their request; anyone else gets `err`.
pub async fn already_voted_or(store: &dyn BallotStore, voter_id: Id, err: Error) -> Error {
    match store.voter(voter_id).await {
        Ok(Some(voter)) if voter.has_voted => {
            debug!("Voter {voter_id} has already voted ({err})");
            Error::AlreadyVoted
        }
        Ok(_) => err,
        Err(lookup_err) => {
            warn!("Could not check whether voter {voter_id} has voted: {lookup_err}");
            err
        }
    }
}

/// One transactional attempt.
async fn try_submit(store: &dyn BallotStore, voter_id: Id, selections: &Selections) -> Result<()> {
    let mut txn = store.begin().await?;
    match record_ballot(txn.as_mut(), voter_id, selections).await {
        Ok(()) => {
            txn.commit().await?;
            info!(
                "Recorded ballot for voter {voter_id} ({} positions)",
                selections.len()
            );
            Ok(())
        }
        Err(err) => {
            if let Err(abort_err) = txn.abort().await {
                // The transaction is discarded on drop regardless.
                warn!("Failed to abort ballot transaction for voter {voter_id}: {abort_err}");
            }
            Err(err)
        }
    }
}

async fn record_ballot(
    txn: &mut dyn BallotTxn,
    voter_id: Id,
    selections: &Selections,
) -> Result<()> {
    match txn.claim_voter(voter_id).await? {
        Claim::Claimed => {}
        Claim::AlreadyVoted => {
            debug!("Voter {voter_id} has already voted");
            return Err(Error::AlreadyVoted);
        }
        Claim::UnknownVoter => return Err(Error::not_found(format!("Voter {voter_id}"))),
    }

    let candidates = txn.candidates().await?;
    if let Err(violation) = validate_selections(&candidates, selections) {
        debug!("Rejected ballot from voter {voter_id}: {violation}");
        return Err(violation.into());
    }

    let cast_at = Utc::now();
    let votes = selections
        .iter()
        .map(|(position, candidate_id)| NewVote {
            voter_id,
            candidate_id: *candidate_id,
            position: position.clone(),
            cast_at,
        })
        .collect();
    txn.insert_votes(votes).await
}

/// Sleep a little longer after each failed attempt, with jitter so that
/// colliding submissions drift apart.
async fn backoff(attempt: u32) {
    let millis = rand::thread_rng().gen_range(5..20) * u64::from(attempt);
    sleep(Duration::from_millis(millis)).await;
}

#[cfg(test)]
mod tests {
    use rocket::tokio;

    use crate::model::{
        common::ballot::BallotViolation,
        db::{candidate::NewCandidate, voter::NewVoter},
        store::{MemoryStore, Turnout},
    };
    use crate::service::compute_results;

    use super::*;

    /// Candidates (A, president), (B, president), (C, secretary).
    struct Field {
        store: MemoryStore,
        a: Id,
        b: Id,
        c: Id,
    }

    async fn field() -> Field {
        let store = MemoryStore::new();
        let a = store
            .insert_candidate(NewCandidate::new("president", "A"))
            .await
            .unwrap();
        let b = store
            .insert_candidate(NewCandidate::new("president", "B"))
            .await
            .unwrap();
        let c = store
            .insert_candidate(NewCandidate::new("secretary", "C"))
            .await
            .unwrap();
        Field { store, a, b, c }
    }

    fn ballot(pairs: &[(&str, Id)]) -> Selections {
        pairs
            .iter()
            .map(|(position, id)| (position.to_string(), *id))
            .collect()
    }

    async fn assert_untouched(store: &MemoryStore, voter: Id) {
        assert!(!store.voter(voter).await.unwrap().unwrap().has_voted);
        assert!(store.votes_by_voter(voter).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn vote_once_then_tally() {
        let Field { store, a, b, c } = field().await;
        let v1 = store.insert_voter(NewVoter::example()).await.unwrap();

        submit_ballot(&store, v1, &ballot(&[("president", a), ("secretary", c)]))
            .await
            .unwrap();
        assert!(store.voter(v1).await.unwrap().unwrap().has_voted);

        let again = submit_ballot(&store, v1, &ballot(&[("president", b), ("secretary", c)])).await;
        assert!(matches!(again, Err(Error::AlreadyVoted)));

        let results = compute_results(&store).await.unwrap();
        let summary = results
            .iter()
            .map(|r| (r.position.as_str(), *r.candidate_id, r.vote_count, r.rank))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("president", a, 1, 1),
                ("president", b, 0, 2),
                ("secretary", c, 1, 1),
            ]
        );
    }

    #[rocket::async_test]
    async fn already_voted_wins_over_invalid_payload() {
        let Field { store, a, c, .. } = field().await;
        let voter = store.insert_voter(NewVoter::example()).await.unwrap();
        submit_ballot(&store, voter, &ballot(&[("president", a), ("secretary", c)]))
            .await
            .unwrap();

        let garbage = ballot(&[("treasurer", Id::new())]);
        let result = submit_ballot(&store, voter, &garbage).await;
        assert!(matches!(result, Err(Error::AlreadyVoted)));
        assert_eq!(store.votes_by_voter(voter).await.unwrap().len(), 2);
    }

    #[rocket::async_test]
    async fn partial_ballot_writes_nothing() {
        let Field { store, a, .. } = field().await;
        let v2 = store.insert_voter(NewVoter::example2()).await.unwrap();

        let result = submit_ballot(&store, v2, &ballot(&[("president", a)])).await;
        assert!(matches!(
            result,
            Err(Error::InvalidBallot(BallotViolation::MissingPosition(ref p))) if p == "secretary"
        ));
        assert_untouched(&store, v2).await;
    }

    #[rocket::async_test]
    async fn invalid_ballots_write_nothing() {
        let Field { store, a, c, .. } = field().await;
        let voter = store.insert_voter(NewVoter::example()).await.unwrap();

        let extra = ballot(&[("president", a), ("secretary", c), ("treasurer", c)]);
        let wrong_position = ballot(&[("president", c), ("secretary", c)]);
        let unknown = ballot(&[("president", Id::new()), ("secretary", c)]);
        for selections in [extra, wrong_position, unknown] {
            let result = submit_ballot(&store, voter, &selections).await;
            assert!(matches!(result, Err(Error::InvalidBallot(_))));
            assert_untouched(&store, voter).await;
        }

        // A valid ballot still goes through afterwards.
        submit_ballot(&store, voter, &ballot(&[("president", a), ("secretary", c)]))
            .await
            .unwrap();
    }

    #[rocket::async_test]
    async fn unknown_voter() {
        let Field { store, a, c, .. } = field().await;
        let result = submit_ballot(&store, Id::new(), &ballot(&[("president", a), ("secretary", c)])).await;
        assert!(matches!(result, Err(Error::Status(status, _)) if status.code == 404));
        assert_eq!(store.turnout().await.unwrap().ballot_entries, 0);
    }

    #[rocket::async_test]
    async fn no_contested_positions() {
        let store = MemoryStore::new();
        let voter = store.insert_voter(NewVoter::example()).await.unwrap();
        let result = submit_ballot(&store, voter, &Selections::new()).await;
        assert!(matches!(
            result,
            Err(Error::InvalidBallot(BallotViolation::NoContestedPositions))
        ));
        assert_untouched(&store, voter).await;
    }

    #[rocket::async_test]
    async fn concurrent_submissions_have_one_winner() {
        let Field { store, a, b, c } = field().await;
        let voter = store.insert_voter(NewVoter::example()).await.unwrap();

        let first = ballot(&[("president", a), ("secretary", c)]);
        let second = ballot(&[("president", b), ("secretary", c)]);
        let tasks = [first, second].map(|selections| {
            let store = store.clone();
            tokio::spawn(async move {
                let result = submit_ballot(&store, voter, &selections).await;
                (selections, result)
            })
        });

        let mut winners = Vec::new();
        let mut losers = 0;
        for task in tasks {
            let (selections, result) = task.await.unwrap();
            match result {
                Ok(()) => winners.push(selections),
                Err(Error::AlreadyVoted) => losers += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(losers, 1);

        // The persisted ballot is entirely the winner's.
        let persisted = store
            .votes_by_voter(voter)
            .await
            .unwrap()
            .into_iter()
            .map(|v| (v.vote.position, v.vote.candidate_id))
            .collect::<Selections>();
        assert_eq!(persisted, winners[0]);
    }

    #[rocket::async_test]
    async fn transient_commit_failures_are_retried() {
        let Field { store, a, c, .. } = field().await;
        let voter = store.insert_voter(NewVoter::example()).await.unwrap();
        store.fail_next_commits(MAX_ATTEMPTS - 1);

        submit_ballot(&store, voter, &ballot(&[("president", a), ("secretary", c)]))
            .await
            .unwrap();
        assert_eq!(
            store.turnout().await.unwrap(),
            Turnout {
                registered: 1,
                voted: 1,
                ballot_entries: 2,
            }
        );
    }

    #[rocket::async_test]
    async fn contended_claim_reports_the_committed_winner() {
        let Field { store, a, b, c } = field().await;
        let voter = store.insert_voter(NewVoter::example()).await.unwrap();
        submit_ballot(&store, voter, &ballot(&[("president", a), ("secretary", c)]))
            .await
            .unwrap();

        // Every claim conflicts, as if the winner held the voter's row.
        store.fail_next_claims(MAX_ATTEMPTS);
        let result = submit_ballot(&store, voter, &ballot(&[("president", b), ("secretary", c)])).await;
        assert!(matches!(result, Err(Error::AlreadyVoted)));
        assert_eq!(store.votes_by_voter(voter).await.unwrap().len(), 2);
    }

    #[rocket::async_test]
    async fn contended_claim_without_winner_is_unavailable() {
        let Field { store, a, c, .. } = field().await;
        let voter = store.insert_voter(NewVoter::example()).await.unwrap();
        store.fail_next_claims(MAX_ATTEMPTS);

        let selections = ballot(&[("president", a), ("secretary", c)]);
        let result = submit_ballot(&store, voter, &selections).await;
        assert!(matches!(result, Err(Error::StorageUnavailable(_))));
        assert_untouched(&store, voter).await;

        submit_ballot(&store, voter, &selections).await.unwrap();
    }

    #[rocket::async_test]
    async fn persistent_failure_leaves_no_trace_and_can_be_resent() {
        let Field { store, a, c, .. } = field().await;
        let voter = store.insert_voter(NewVoter::example()).await.unwrap();
        let selections = ballot(&[("president", a), ("secretary", c)]);
        store.fail_next_commits(MAX_ATTEMPTS);

        let result = submit_ballot(&store, voter, &selections).await;
        assert!(matches!(result, Err(Error::StorageUnavailable(_))));
        assert_untouched(&store, voter).await;

        submit_ballot(&store, voter, &selections).await.unwrap();
        assert_eq!(store.votes_by_voter(voter).await.unwrap().len(), 2);
    }
}
