//! Rank Bonus Table
//! Mission: Pure rank -> money lookup with an optional phase split

use crate::models::{BonusTable, Round};

/// Value for a 1-based rank at a given round. Ranks outside the active
/// phase's domain are worth zero; a malformed (empty) table also yields
/// zero so a configuration gap never aborts consolidation.
pub fn value_for(table: &BonusTable, rank: usize, round: Round) -> f64 {
    let values = active_phase(table, round);
    if rank == 0 {
        return 0.0;
    }
    values.get(rank - 1).copied().unwrap_or(0.0)
}

fn active_phase(table: &BonusTable, round: Round) -> &[f64] {
    if let Some(phase) = &table.phase_two {
        if round >= phase.from_round {
            return &phase.values;
        }
    }
    &table.values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BonusPhase;

    fn two_phase_table() -> BonusTable {
        // First phase rewards six ranks, second phase four (from round 30).
        BonusTable {
            values: vec![7.0, 4.0, 0.0, -2.0, -5.0, -10.0],
            phase_two: Some(BonusPhase {
                from_round: Round(30),
                values: vec![5.0, 0.0, 0.0, -5.0],
            }),
        }
    }

    #[test]
    fn test_phase_selection_by_round() {
        let table = two_phase_table();
        assert_eq!(value_for(&table, 1, Round(29)), 7.0);
        assert_eq!(value_for(&table, 1, Round(30)), 5.0);
        assert_eq!(value_for(&table, 4, Round(10)), -2.0);
        assert_eq!(value_for(&table, 4, Round(35)), -5.0);
    }

    #[test]
    fn test_rank_outside_domain_is_zero() {
        let table = two_phase_table();
        assert_eq!(value_for(&table, 7, Round(5)), 0.0);
        assert_eq!(value_for(&table, 5, Round(31)), 0.0);
        assert_eq!(value_for(&table, 0, Round(5)), 0.0);
    }

    #[test]
    fn test_single_phase_table() {
        let table = BonusTable {
            values: vec![10.0, 5.0],
            phase_two: None,
        };
        assert_eq!(value_for(&table, 2, Round(38)), 5.0);
        assert_eq!(value_for(&table, 3, Round(38)), 0.0);
    }

    #[test]
    fn test_empty_table_defaults_to_zero() {
        let table = BonusTable {
            values: Vec::new(),
            phase_two: None,
        };
        assert_eq!(value_for(&table, 1, Round(1)), 0.0);
    }
}
