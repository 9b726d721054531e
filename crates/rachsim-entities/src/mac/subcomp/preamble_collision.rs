use std::collections::HashMap;

use rachsim_core::RapId;

/// Occurrence counts of preamble ids within one detection window.
///
/// Built in a single pass over the whole batch before any attempt is
/// judged, so every attempt sees the complete tally: an id transmitted by
/// more than one terminal is a collision for all attempts using it, not
/// just the ones processed later.
pub struct PreambleTally {
    counts: HashMap<RapId, u32>,
}

impl PreambleTally {
    pub fn from_rap_ids(rap_ids: impl IntoIterator<Item = RapId>) -> Self {
        let mut counts = HashMap::new();
        for rap_id in rap_ids {
            *counts.entry(rap_id).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn count(&self, rap_id: RapId) -> u32 {
        self.counts.get(&rap_id).copied().unwrap_or(0)
    }

    /// True if more than one terminal picked this preamble id
    pub fn is_collided(&self, rap_id: RapId) -> bool {
        self.count(rap_id) > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_id_collides_for_every_attempt() {
        // Attempts: (A, 3), (B, 3), (C, 7) in one window
        let tally = PreambleTally::from_rap_ids([3, 3, 7]);
        assert!(tally.is_collided(3));
        assert!(!tally.is_collided(7));
        assert_eq!(tally.count(3), 2);
        assert_eq!(tally.count(7), 1);
    }

    #[test]
    fn unseen_id_is_clean() {
        let tally = PreambleTally::from_rap_ids([1]);
        assert_eq!(tally.count(9), 0);
        assert!(!tally.is_collided(9));
    }

    #[test]
    fn empty_window() {
        let tally = PreambleTally::from_rap_ids([]);
        assert_eq!(tally.count(0), 0);
    }
}
