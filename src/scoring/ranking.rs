//! Round Ranking
//! Mission: Reproducible total order over one round's scores

use crate::models::{ParticipantId, ParticipantScore};

/// One ranked participant. Rank is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedScore {
    pub participant: ParticipantId,
    pub points: f64,
    pub rank: usize,
}

/// Orders one round's scores descending by points. Ties are broken by the
/// stable original ordering so re-runs always produce the same result.
/// Participants without points are excluded from ranking but callers keep
/// them for reporting.
pub fn rank_round(scores: &[ParticipantScore]) -> Vec<RankedScore> {
    let mut played: Vec<(usize, ParticipantId, f64)> = scores
        .iter()
        .enumerate()
        .filter_map(|(idx, s)| s.points.map(|p| (idx, s.participant, p)))
        .collect();

    // Stable sort keeps input order for equal points.
    played.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    played
        .into_iter()
        .enumerate()
        .map(|(i, (_, participant, points))| RankedScore {
            participant,
            points,
            rank: i + 1,
        })
        .collect()
}

/// Rank of one participant within the round, if they played.
pub fn rank_of(scores: &[ParticipantScore], participant: ParticipantId) -> Option<usize> {
    rank_round(scores)
        .iter()
        .find(|r| r.participant == participant)
        .map(|r| r.rank)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(id: u64, points: Option<f64>) -> ParticipantScore {
        ParticipantScore {
            participant: ParticipantId(id),
            points,
        }
    }

    #[test]
    fn test_descending_order_with_ranks() {
        let ranked = rank_round(&[
            score(1, Some(50.0)),
            score(2, Some(80.0)),
            score(3, Some(65.5)),
        ]);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].participant, ParticipantId(2));
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].participant, ParticipantId(3));
        assert_eq!(ranked[2].participant, ParticipantId(1));
        assert_eq!(ranked[2].rank, 3);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let ranked = rank_round(&[
            score(7, Some(42.0)),
            score(3, Some(42.0)),
            score(9, Some(42.0)),
        ]);
        let ids: Vec<u64> = ranked.iter().map(|r| r.participant.0).collect();
        assert_eq!(ids, vec![7, 3, 9]);
    }

    #[test]
    fn test_null_points_excluded() {
        let ranked = rank_round(&[score(1, None), score(2, Some(10.0)), score(3, None)]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].participant, ParticipantId(2));
        assert_eq!(ranked[0].rank, 1);
    }

    #[test]
    fn test_empty_input_empty_ranking() {
        assert!(rank_round(&[]).is_empty());
    }

    #[test]
    fn test_rank_of() {
        let scores = [score(1, Some(5.0)), score(2, Some(9.0)), score(3, None)];
        assert_eq!(rank_of(&scores, ParticipantId(2)), Some(1));
        assert_eq!(rank_of(&scores, ParticipantId(1)), Some(2));
        assert_eq!(rank_of(&scores, ParticipantId(3)), None);
    }
}
