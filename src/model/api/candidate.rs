use serde::{Deserialize, Serialize};

use crate::model::{api::id::ApiId, db::candidate::Candidate};

/// API-friendly representation of a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDesc {
    pub id: ApiId,
    pub position: String,
    pub name: String,
    pub manifesto: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl From<Candidate> for CandidateDesc {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.into(),
            position: candidate.candidate.position,
            name: candidate.candidate.name,
            manifesto: candidate.candidate.manifesto,
            photo_url: candidate.candidate.photo_url,
        }
    }
}
