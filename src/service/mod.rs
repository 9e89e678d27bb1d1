//! The voting core: ballot submission and tallying, both written against
//! [`BallotStore`](crate::model::store::BallotStore) only.

pub mod submission;
pub mod tally;

pub use submission::{already_voted_or, submit_ballot};
pub use tally::compute_results;
