use jsonwebtoken::errors::Error as JwtError;
use mongodb::{bson::de::Error as BsonError, error::Error as DbError};
use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use thiserror::Error;

use crate::model::{
    api::message::ErrorMessage, common::ballot::BallotViolation,
    mongodb::is_transient_transaction_error,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("already voted")]
    AlreadyVoted,
    #[error("invalid ballot: {0}")]
    InvalidBallot(#[from] BallotViolation),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("{1}")]
    Status(Status, String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Bson(#[from] BsonError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
}

impl Error {
    pub fn not_found(what: impl AsRef<str>) -> Self {
        Self::Status(Status::NotFound, format!("Not found: {}", what.as_ref()))
    }

    pub fn unauthorized(why: impl Into<String>) -> Self {
        Self::Status(Status::Unauthorized, why.into())
    }

    /// Can the operation that produced this error be re-run unchanged?
    pub fn is_transient(&self) -> bool {
        match self {
            Self::StorageUnavailable(_) => true,
            Self::Db(err) => is_transient_transaction_error(err),
            _ => false,
        }
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::AlreadyVoted => Status::Forbidden,
            Self::InvalidBallot(_) => Status::BadRequest,
            Self::Status(status, _) => *status,
            Self::Jwt(_) => Status::Unauthorized,
            Self::StorageUnavailable(_) | Self::Db(_) | Self::Bson(_) => {
                Status::InternalServerError
            }
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        match status.class() {
            StatusClass::ServerError => error!("{self}"),
            _ => debug!("{self}"),
        }
        let body = Json(ErrorMessage::new(self.to_string()));
        (status, body).respond_to(req)
    }
}
