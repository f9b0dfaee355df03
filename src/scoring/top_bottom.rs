//! Weekly Extremes
//! Mission: Flag the single best and single worst performer of a round

use super::ranking;
use crate::models::{ParticipantId, ParticipantScore, TopBottomConfig};

/// Best/worst awards for one round. Ties resolve the same way as the
/// ranking module (stable input order), so results are reproducible.
pub fn payouts_for_round(
    config: &TopBottomConfig,
    scores: &[ParticipantScore],
) -> Vec<(ParticipantId, f64, String)> {
    let ranked = ranking::rank_round(scores);
    if ranked.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();

    let best = &ranked[0];
    let best_value = config.best.first().copied().unwrap_or(0.0);
    if best_value != 0.0 {
        out.push((
            best.participant,
            best_value,
            format!("best of round ({:.2} pts)", best.points),
        ));
    }

    // A single entrant cannot be both best and worst.
    if ranked.len() > 1 {
        let worst = &ranked[ranked.len() - 1];
        let worst_value = config.worst.first().copied().unwrap_or(0.0);
        if worst_value != 0.0 {
            out.push((
                worst.participant,
                worst_value,
                format!("worst of round ({:.2} pts)", worst.points),
            ));
        }
    }

    out
}
