use std::collections::HashMap;

use mongodb::{
    bson::{doc, from_document},
    options::{
        Acknowledgment, FindOptions, ReadConcern, SessionOptions, TransactionOptions,
        WriteConcern,
    },
    Client, ClientSession, Database,
};
use rocket::{futures::TryStreamExt, http::Status};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{
    db::{
        candidate::{Candidate, NewCandidate},
        vote::{NewVote, Vote},
        voter::{NewVoter, Voter},
    },
    store::{BallotStore, BallotTxn, Claim, TallySnapshot, Turnout},
};

use super::{is_duplicate_key_error, is_unknown_commit_result, Coll, Id};

/// How many times to retry a commit whose outcome is unknown.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// The MongoDB-backed ballot store. Requires a replica set, for transactions
/// and snapshot reads.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    /// Wrap an existing connection. Indexes are assumed to exist already.
    pub fn new(client: Client, db: Database) -> Self {
        Self { client, db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

/// One row of the vote-count aggregation.
#[derive(Debug, Deserialize)]
struct VoteCount {
    #[serde(rename = "_id")]
    candidate_id: Id,
    votes: u64,
}

/// Read everything a session cursor yields.
async fn collect_with_session<T>(
    coll: &Coll<T>,
    filter: impl Into<Option<mongodb::bson::Document>>,
    session: &mut ClientSession,
) -> Result<Vec<T>>
where
    T: serde::de::DeserializeOwned + Unpin + Send + Sync,
{
    let mut cursor = coll.find_with_session(filter, None, session).await?;
    let mut items = Vec::new();
    while let Some(item) = cursor.next(session).await {
        items.push(item?);
    }
    Ok(items)
}

#[rocket::async_trait]
impl BallotStore for MongoStore {
    async fn begin(&self) -> Result<Box<dyn BallotTxn>> {
        let mut session = self.client.start_session(None).await?;
        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .build();
        session.start_transaction(options).await?;
        Ok(Box::new(MongoTxn {
            session,
            voters: Coll::from_db(&self.db),
            candidates: Coll::from_db(&self.db),
            votes: Coll::from_db(&self.db),
        }))
    }

    async fn voter(&self, id: Id) -> Result<Option<Voter>> {
        let voter = Coll::<Voter>::from_db(&self.db)
            .find_one(id.as_doc(), None)
            .await?;
        Ok(voter)
    }

    async fn candidates(&self) -> Result<Vec<Candidate>> {
        let options = FindOptions::builder()
            .sort(doc! {"position": 1, "_id": 1})
            .build();
        let candidates = Coll::<Candidate>::from_db(&self.db)
            .find(None, options)
            .await?
            .try_collect()
            .await?;
        Ok(candidates)
    }

    async fn votes_by_voter(&self, voter_id: Id) -> Result<Vec<Vote>> {
        let filter = doc! {
            "voter_id": voter_id,
        };
        let options = FindOptions::builder().sort(doc! {"position": 1}).build();
        let votes = Coll::<Vote>::from_db(&self.db)
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(votes)
    }

    async fn tally_snapshot(&self) -> Result<TallySnapshot> {
        // Ensure candidates and counts come from the same point in time.
        let session_options = SessionOptions::builder().snapshot(true).build();
        let mut session = self.client.start_session(Some(session_options)).await?;

        let candidates =
            collect_with_session(&Coll::<Candidate>::from_db(&self.db), None, &mut session)
                .await?;

        let pipeline = vec![doc! {
            "$group": {
                "_id": "$candidate_id",
                "votes": { "$sum": 1 },
            }
        }];
        let mut cursor = Coll::<Vote>::from_db(&self.db)
            .aggregate_with_session(pipeline, None, &mut session)
            .await?;
        let mut counts = HashMap::new();
        while let Some(row) = cursor.next(&mut session).await {
            let row: VoteCount = from_document(row?)?;
            counts.insert(row.candidate_id, row.votes);
        }

        Ok(TallySnapshot { candidates, counts })
    }

    async fn turnout(&self) -> Result<Turnout> {
        let voters = Coll::<Voter>::from_db(&self.db);
        let registered = voters.count_documents(None, None).await?;
        let voted = voters
            .count_documents(doc! {"has_voted": true}, None)
            .await?;
        let ballot_entries = Coll::<Vote>::from_db(&self.db)
            .count_documents(None, None)
            .await?;
        Ok(Turnout {
            registered,
            voted,
            ballot_entries,
        })
    }

    async fn insert_voter(&self, voter: NewVoter) -> Result<Id> {
        let inserted = Coll::<NewVoter>::from_db(&self.db)
            .insert_one(&voter, None)
            .await?;
        inserted_id(inserted.inserted_id)
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Id> {
        let inserted = Coll::<NewCandidate>::from_db(&self.db)
            .insert_one(&candidate, None)
            .await?;
        inserted_id(inserted.inserted_id)
    }
}

fn inserted_id(id: mongodb::bson::Bson) -> Result<Id> {
    id.as_object_id().map(Id::from).ok_or_else(|| {
        Error::Status(
            Status::InternalServerError,
            format!("Database returned a non-ObjectId ID: {id}"),
        )
    })
}

/// A multi-document transaction. If dropped while still in progress, the
/// driver aborts it.
struct MongoTxn {
    session: ClientSession,
    voters: Coll<Voter>,
    candidates: Coll<Candidate>,
    votes: Coll<NewVote>,
}

#[rocket::async_trait]
impl BallotTxn for MongoTxn {
    async fn claim_voter(&mut self, voter_id: Id) -> Result<Claim> {
        // The conditional write takes the document lock, so a concurrent claim
        // for the same voter fails with a write conflict.
        let filter = doc! {
            "_id": voter_id,
            "has_voted": false,
        };
        let update = doc! {
            "$set": {
                "has_voted": true,
            }
        };
        let result = self
            .voters
            .update_one_with_session(filter, update, None, &mut self.session)
            .await?;
        if result.modified_count == 1 {
            return Ok(Claim::Claimed);
        }

        let existing = self
            .voters
            .find_one_with_session(voter_id.as_doc(), None, &mut self.session)
            .await?;
        Ok(match existing {
            Some(_) => Claim::AlreadyVoted,
            None => Claim::UnknownVoter,
        })
    }

    async fn candidates(&mut self) -> Result<Vec<Candidate>> {
        collect_with_session(&self.candidates, None, &mut self.session).await
    }

    async fn insert_votes(&mut self, votes: Vec<NewVote>) -> Result<()> {
        match self
            .votes
            .insert_many_with_session(votes, None, &mut self.session)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key_error(&err) => Err(Error::AlreadyVoted),
            Err(err) => Err(err.into()),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.session.commit_transaction().await {
                Ok(()) => return Ok(()),
                Err(err) if is_unknown_commit_result(&err) && attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!("Commit outcome unknown (attempt {attempt}), retrying commit: {err}");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn abort(&mut self) -> Result<()> {
        self.session.abort_transaction().await?;
        Ok(())
    }
}
