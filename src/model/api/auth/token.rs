use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::{api::id::ApiId, mongodb::Id, store::SharedStore};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token identifying a registered voter.
///
/// Tokens are issued by the sign-in service; this server only verifies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub id: ApiId,
}

impl AuthToken {
    pub fn new(voter_id: Id) -> Self {
        Self {
            id: voter_id.into(),
        }
    }

    pub fn voter_id(&self) -> Id {
        *self.id
    }

    #[allow(clippy::missing_panics_doc)]
    /// Serialize this token into a signed cookie.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings");

        Cookie::build(AUTH_TOKEN_COOKIE, token)
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish()
    }

    /// Deserialize and verify a token from a cookie.
    pub fn from_cookie(cookie: &Cookie<'_>, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.token)?;
        Ok(token)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Error;

    /// Get an [`AuthToken`] from the cookie and check the voter it names exists.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` and the store are always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();
        let store = req.guard::<&State<SharedStore>>().await.unwrap();

        let cookie = match req.cookies().get(AUTH_TOKEN_COOKIE) {
            Some(cookie) => cookie,
            None => {
                return Outcome::Failure((
                    Status::Unauthorized,
                    Error::unauthorized("Missing auth token"),
                ))
            }
        };

        let token = match Self::from_cookie(cookie, config) {
            Ok(token) => token,
            Err(e) => return Outcome::Failure((Status::Unauthorized, e)),
        };

        match store.voter(token.voter_id()).await {
            Ok(Some(_)) => Outcome::Success(token),
            Ok(None) => Outcome::Failure((
                Status::Unauthorized,
                Error::unauthorized(format!("No voter with ID {}", token.id)),
            )),
            Err(e) => Outcome::Failure((Status::InternalServerError, e)),
        }
    }
}
