use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{candidate::CandidateDesc, results::ResultEntry, stats::ElectionStats},
    common::ballot::position_set,
    store::SharedStore,
};
use crate::service::compute_results;

pub fn routes() -> Vec<Route> {
    routes![results, candidates, positions, stats]
}

#[get("/results")]
async fn results(store: &State<SharedStore>) -> Result<Json<Vec<ResultEntry>>> {
    let results = compute_results(store.inner().as_ref()).await?;
    Ok(Json(results))
}

#[get("/candidates?<position>")]
async fn candidates(
    position: Option<String>,
    store: &State<SharedStore>,
) -> Result<Json<Vec<CandidateDesc>>> {
    let candidates = store
        .candidates()
        .await?
        .into_iter()
        .filter(|c| position.as_ref().map_or(true, |p| &c.position == p))
        .map(Into::into)
        .collect();
    Ok(Json(candidates))
}

#[get("/positions")]
async fn positions(store: &State<SharedStore>) -> Result<Json<Vec<String>>> {
    let candidates = store.candidates().await?;
    let positions = position_set(&candidates)
        .into_iter()
        .map(str::to_string)
        .collect();
    Ok(Json(positions))
}

#[get("/stats")]
async fn stats(store: &State<SharedStore>) -> Result<Json<ElectionStats>> {
    let turnout = store.turnout().await?;
    let candidates = store.candidates().await?;
    let positions = position_set(&candidates).len();
    Ok(Json(ElectionStats::new(turnout, candidates.len(), positions)))
}

#[cfg(test)]
mod tests {
    use rocket::{http::Status, serde::json::serde_json};

    use crate::model::{
        common::ballot::Selections,
        db::{candidate::NewCandidate, voter::NewVoter},
        mongodb::Id,
        store::{BallotStore, MemoryStore},
    };
    use crate::service::submit_ballot;

    use super::*;

    /// Two presidential candidates and one for secretary; one voter has voted
    /// for `b` and `c`, another is still to vote.
    async fn election() -> (MemoryStore, Id, Id, Id) {
        let store = MemoryStore::new();
        let b = store
            .insert_candidate(NewCandidate::new("president", "B"))
            .await
            .unwrap();
        let a = store
            .insert_candidate(NewCandidate::new("president", "A"))
            .await
            .unwrap();
        let c = store
            .insert_candidate(NewCandidate::new("secretary", "C"))
            .await
            .unwrap();
        let voter = store.insert_voter(NewVoter::example()).await.unwrap();
        store.insert_voter(NewVoter::example2()).await.unwrap();

        let selections = Selections::from([
            ("president".to_string(), b),
            ("secretary".to_string(), c),
        ]);
        submit_ballot(&store, voter, &selections).await.unwrap();
        (store, a, b, c)
    }

    #[rocket::async_test]
    async fn results_are_ranked() {
        let (store, a, b, c) = election().await;
        let client = crate::memory_client(&store).await;

        let response = client.get(uri!(results)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let raw = response.into_string().await.unwrap();
        let results = serde_json::from_str::<Vec<ResultEntry>>(&raw).unwrap();

        let summary = results
            .iter()
            .map(|r| (r.position.as_str(), *r.candidate_id, r.vote_count, r.rank))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("president", b, 1, 1),
                ("president", a, 0, 2),
                ("secretary", c, 1, 1),
            ]
        );
    }

    #[rocket::async_test]
    async fn results_of_empty_election() {
        let client = crate::memory_client(&MemoryStore::new()).await;
        let response = client.get(uri!(results)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(response.into_string().await.unwrap(), "[]");
    }

    #[rocket::async_test]
    async fn candidates_by_position() {
        let (store, _, _, c) = election().await;
        let client = crate::memory_client(&store).await;

        let response = client.get(uri!(candidates(_))).dispatch().await;
        let raw = response.into_string().await.unwrap();
        let all = serde_json::from_str::<Vec<CandidateDesc>>(&raw).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].position <= w[1].position));

        let response = client
            .get(uri!(candidates(Some("secretary"))))
            .dispatch()
            .await;
        let raw = response.into_string().await.unwrap();
        let secretaries = serde_json::from_str::<Vec<CandidateDesc>>(&raw).unwrap();
        assert_eq!(secretaries.len(), 1);
        assert_eq!(*secretaries[0].id, c);
        assert_eq!(secretaries[0].name, "C");
    }

    #[rocket::async_test]
    async fn positions_are_distinct_and_sorted() {
        let (store, ..) = election().await;
        let client = crate::memory_client(&store).await;

        let response = client.get(uri!(positions)).dispatch().await;
        let raw = response.into_string().await.unwrap();
        let positions = serde_json::from_str::<Vec<String>>(&raw).unwrap();
        assert_eq!(positions, vec!["president", "secretary"]);
    }

    #[rocket::async_test]
    async fn stats_report_turnout() {
        let (store, ..) = election().await;
        let client = crate::memory_client(&store).await;

        let response = client.get(uri!(stats)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let raw = response.into_string().await.unwrap();
        let stats = serde_json::from_str::<ElectionStats>(&raw).unwrap();
        assert_eq!(
            stats,
            ElectionStats {
                registered_voters: 2,
                voters_voted: 1,
                turnout: 50.0,
                ballot_entries: 2,
                candidates: 3,
                positions: 2,
            }
        );
    }
}
