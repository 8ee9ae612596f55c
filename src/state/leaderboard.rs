use indexmap::IndexMap;
use uuid::Uuid;

/// Row of a leaderboard snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    /// Participant identifier.
    pub participant_id: Uuid,
    /// Display name at the time of the snapshot.
    pub name: String,
    /// Cumulative score.
    pub score: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    score: u64,
}

/// Running per-participant totals for one session.
///
/// Entries are kept in join order so ties resolve to the earliest joiner.
/// Totals only move through [`Leaderboard::apply_round`]; nothing is recomputed
/// from answer history.
#[derive(Debug, Clone, Default)]
pub struct Leaderboard {
    entries: IndexMap<Uuid, Entry>,
    awarded_total: u64,
}

impl Leaderboard {
    /// Create an empty leaderboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant with a zero score. Re-registering is a no-op.
    pub fn register(&mut self, participant_id: Uuid, name: String) {
        self.entries
            .entry(participant_id)
            .or_insert(Entry { name, score: 0 });
    }

    /// Fold one round's awarded points into the cumulative totals.
    pub fn apply_round(&mut self, awarded: &[(Uuid, u32)]) {
        for (participant_id, points) in awarded {
            if let Some(entry) = self.entries.get_mut(participant_id) {
                entry.score += u64::from(*points);
                self.awarded_total += u64::from(*points);
            }
        }
    }

    /// Cumulative score of a participant.
    pub fn score_of(&self, participant_id: &Uuid) -> Option<u64> {
        self.entries.get(participant_id).map(|entry| entry.score)
    }

    /// Sum of every point ever awarded through [`Leaderboard::apply_round`].
    pub fn awarded_total(&self) -> u64 {
        self.awarded_total
    }

    /// Ranked view: score descending, ties by join order.
    pub fn snapshot(&self) -> Vec<Standing> {
        let mut ranked = self
            .entries
            .iter()
            .enumerate()
            .map(|(join_order, (id, entry))| (join_order, *id, entry))
            .collect::<Vec<_>>();
        ranked.sort_by(|(a_order, _, a), (b_order, _, b)| {
            b.score.cmp(&a.score).then(a_order.cmp(b_order))
        });
        ranked
            .into_iter()
            .map(|(_, participant_id, entry)| Standing {
                participant_id,
                name: entry.name.clone(),
                score: entry.score,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(count: usize) -> Vec<Uuid> {
        (0..count).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn snapshot_sorted_by_score_then_join_order() {
        let ids = ids(4);
        let mut board = Leaderboard::new();
        for (i, id) in ids.iter().enumerate() {
            board.register(*id, format!("p{i}"));
        }
        board.apply_round(&[(ids[0], 10), (ids[1], 30), (ids[2], 10), (ids[3], 0)]);

        let names = board
            .snapshot()
            .into_iter()
            .map(|standing| standing.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["p1", "p0", "p2", "p3"]);
    }

    #[test]
    fn totals_accumulate_across_rounds() {
        let ids = ids(2);
        let mut board = Leaderboard::new();
        board.register(ids[0], "a".into());
        board.register(ids[1], "b".into());
        board.apply_round(&[(ids[0], 80), (ids[1], 0)]);
        board.apply_round(&[(ids[0], 25), (ids[1], 50)]);

        assert_eq!(board.score_of(&ids[0]), Some(105));
        assert_eq!(board.score_of(&ids[1]), Some(50));
        let sum: u64 = board.snapshot().iter().map(|s| s.score).sum();
        assert_eq!(sum, board.awarded_total());
        assert_eq!(sum, 155);
    }

    #[test]
    fn snapshot_is_idempotent() {
        let ids = ids(3);
        let mut board = Leaderboard::new();
        for id in &ids {
            board.register(*id, id.to_string());
        }
        board.apply_round(&[(ids[2], 5)]);
        assert_eq!(board.snapshot(), board.snapshot());
    }

    #[test]
    fn register_twice_keeps_score() {
        let id = Uuid::new_v4();
        let mut board = Leaderboard::new();
        board.register(id, "a".into());
        board.apply_round(&[(id, 7)]);
        board.register(id, "a".into());
        assert_eq!(board.snapshot().len(), 1);
        assert_eq!(board.score_of(&id), Some(7));
    }

    #[test]
    fn unknown_participants_are_ignored() {
        let mut board = Leaderboard::new();
        board.apply_round(&[(Uuid::new_v4(), 100)]);
        assert!(board.snapshot().is_empty());
        assert_eq!(board.awarded_total(), 0);
    }
}
