use serde::{Deserialize, Serialize};

use crate::model::store::Turnout;

/// Participation figures for the election dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionStats {
    pub registered_voters: u64,
    pub voters_voted: u64,
    /// Percentage of registered voters who have voted, 0 when nobody is registered.
    pub turnout: f64,
    pub ballot_entries: u64,
    pub candidates: usize,
    pub positions: usize,
}

impl ElectionStats {
    pub fn new(turnout: Turnout, candidates: usize, positions: usize) -> Self {
        let percentage = if turnout.registered == 0 {
            0.0
        } else {
            turnout.voted as f64 * 100.0 / turnout.registered as f64
        };
        Self {
            registered_voters: turnout.registered,
            voters_voted: turnout.voted,
            turnout: percentage,
            ballot_entries: turnout.ballot_entries,
            candidates,
            positions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turnout_percentage() {
        let stats = ElectionStats::new(
            Turnout {
                registered: 4,
                voted: 1,
                ballot_entries: 2,
            },
            3,
            2,
        );
        assert_eq!(stats.turnout, 25.0);
        assert_eq!(stats.ballot_entries, 2);
    }

    #[test]
    fn empty_electorate() {
        let stats = ElectionStats::new(Turnout::default(), 0, 0);
        assert_eq!(stats.turnout, 0.0);
    }
}
