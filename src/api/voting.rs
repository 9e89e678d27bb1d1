use rocket::{
    http::Status,
    serde::json::{Error as JsonError, Json},
    Route, State,
};

use crate::error::{Error, Result};
use crate::model::{
    api::{auth::AuthToken, ballot::BallotRequest, message::Message, voter::VoterStatus},
    store::SharedStore,
};
use crate::service::{already_voted_or, submit_ballot};

pub fn routes() -> Vec<Route> {
    routes![submit, status]
}

#[post("/voter/ballot", data = "<ballot>")]
async fn submit(
    token: AuthToken,
    ballot: std::result::Result<Json<BallotRequest>, JsonError<'_>>,
    store: &State<SharedStore>,
) -> Result<Json<Message>> {
    let store = store.inner().as_ref();
    let voter_id = token.voter_id();

    let selections = ballot
        .map_err(|err| {
            let reason = match err {
                JsonError::Io(e) => e.to_string(),
                JsonError::Parse(_, e) => e.to_string(),
            };
            Error::Status(Status::BadRequest, format!("Malformed ballot: {reason}"))
        })
        .and_then(|ballot| ballot.into_inner().into_selections().map_err(Error::from));
    let selections = match selections {
        Ok(selections) => selections,
        Err(err) => return Err(already_voted_or(store, voter_id, err).await),
    };

    submit_ballot(store, voter_id, &selections).await?;
    Ok(Json(Message::new("Vote submitted successfully")))
}

#[get("/voter/status")]
async fn status(token: AuthToken, store: &State<SharedStore>) -> Result<Json<VoterStatus>> {
    let voter_id = token.voter_id();
    let voter = store
        .voter(voter_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))?;
    let votes = store.votes_by_voter(voter_id).await?;
    Ok(Json(VoterStatus::new(&voter, votes)))
}
