use analysis_core::PositionType;

use crate::ranking::RankedSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationMode {
    /// One conviction pick gets the lion's share; a handful of runners-up
    /// split a modest satellite allocation.
    CoreFocus,
    /// A moderate core position balanced against a wider satellite spread.
    Balanced,
    /// No single pick dominates; the top five candidates split evenly.
    Diversified,
}

impl AllocationMode {
    pub fn cash_reserve_pct(&self) -> f64 {
        match self {
            AllocationMode::CoreFocus => 0.10,
            AllocationMode::Balanced => 0.10,
            AllocationMode::Diversified => 0.20,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AllocationMode::CoreFocus => "one core conviction pick, three satellites, 10% reserve",
            AllocationMode::Balanced => "one moderate core pick, four satellites, 10% reserve",
            AllocationMode::Diversified => "five equal-weighted picks, 20% reserve",
        }
    }
}

/// One allocated slot: a ranked signal paired with the portfolio
/// percentage it receives and the position type that percentage implies.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub signal: RankedSignal,
    pub position_type: PositionType,
    pub allocation_pct: f64,
}

/// Allocates capital across `ranked` (already sorted best-first) per
/// `mode`. Candidates beyond what a mode uses receive no allocation at
/// all -- they simply don't appear in the result, same as the Python
/// original's slicing.
pub fn allocate(ranked: &[RankedSignal], mode: AllocationMode) -> Vec<Allocation> {
    match mode {
        AllocationMode::CoreFocus => allocate_core_focus(ranked),
        AllocationMode::Balanced => allocate_balanced(ranked),
        AllocationMode::Diversified => allocate_diversified(ranked),
    }
}

fn allocate_core_focus(ranked: &[RankedSignal]) -> Vec<Allocation> {
    let mut out = Vec::new();
    if let Some(core) = ranked.first() {
        out.push(Allocation {
            signal: core.clone(),
            position_type: PositionType::Core,
            allocation_pct: 0.60,
        });
    }
    for satellite in ranked.iter().skip(1).take(3) {
        out.push(Allocation {
            signal: satellite.clone(),
            position_type: PositionType::Satellite,
            allocation_pct: 0.10,
        });
    }
    out
}

fn allocate_balanced(ranked: &[RankedSignal]) -> Vec<Allocation> {
    let mut out = Vec::new();
    if let Some(core) = ranked.first() {
        out.push(Allocation {
            signal: core.clone(),
            position_type: PositionType::Core,
            allocation_pct: 0.40,
        });
    }
    for satellite in ranked.iter().skip(1).take(4) {
        out.push(Allocation {
            signal: satellite.clone(),
            position_type: PositionType::Satellite,
            allocation_pct: 0.125,
        });
    }
    out
}

fn allocate_diversified(ranked: &[RankedSignal]) -> Vec<Allocation> {
    ranked
        .iter()
        .take(5)
        .map(|signal| Allocation {
            signal: signal.clone(),
            position_type: PositionType::Equal,
            allocation_pct: 0.16,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::rank_signals;
    use analysis_core::{SignalStatus, StoredSignal, StoredSignalType};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn signals(n: usize) -> Vec<StoredSignal> {
        (0..n)
            .map(|i| StoredSignal {
                id: None,
                ticker: format!("T{i}"),
                signal_type: StoredSignalType::Buy,
                confidence: 5 - (i as i32 % 3),
                entry_price: dec!(100),
                target_price: dec!(120),
                stop_loss: dec!(90),
                share_count: 10,
                status: SignalStatus::Pending,
                created_at: Utc::now(),
                executed_at: None,
                closed_at: None,
                pnl: None,
                notes: None,
            })
            .collect()
    }

    #[test]
    fn core_focus_allocates_60_percent_to_one_pick_and_10_each_to_three_more() {
        let ranked = rank_signals(&signals(6));
        let allocations = allocate(&ranked, AllocationMode::CoreFocus);
        assert_eq!(allocations.len(), 4);
        assert_eq!(allocations[0].allocation_pct, 0.60);
        assert!(allocations[1..].iter().all(|a| a.allocation_pct == 0.10));
        let total: f64 = allocations.iter().map(|a| a.allocation_pct).sum();
        assert!((total - 0.90).abs() < 1e-9);
    }

    #[test]
    fn diversified_splits_five_ways_evenly() {
        let ranked = rank_signals(&signals(8));
        let allocations = allocate(&ranked, AllocationMode::Diversified);
        assert_eq!(allocations.len(), 5);
        assert!(allocations.iter().all(|a| a.allocation_pct == 0.16));
    }

    #[test]
    fn fewer_candidates_than_a_modes_slots_allocates_only_what_exists() {
        let ranked = rank_signals(&signals(2));
        let allocations = allocate(&ranked, AllocationMode::Balanced);
        assert_eq!(allocations.len(), 2);
    }
}
