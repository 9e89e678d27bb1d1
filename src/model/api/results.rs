use serde::{Deserialize, Serialize};

use crate::model::api::id::ApiId;

/// One candidate's line in the election results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub position: String,
    pub candidate_id: ApiId,
    pub name: String,
    pub vote_count: u64,
    /// 1-based rank within the position.
    pub rank: u32,
}
