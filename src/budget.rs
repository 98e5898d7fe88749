//! Budget Controller.
//!
//! Translates a [`QueryMode`](crate::query::QueryMode) into a hard
//! wall-clock deadline plus per-phase sub-budgets. Every downstream
//! component treats `Budget` as the sole authoritative stop signal —
//! nothing in this crate relies on an ambient or default timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::QueryMode;

/// One row of the mode-to-budget table, all values in
/// milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModeBudget {
    pub total_ms: u64,
    pub refinement_ms: u64,
    pub retrieval_ms: u64,
    pub synthesis_ms: u64,
    pub per_lane_cap_ms: u64,
    pub per_provider_cap_ms: u64,
}

/// The full mode table, overridable via [`crate::config::Config`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeBudgetTable {
    pub simple: ModeBudget,
    pub technical: ModeBudget,
    pub research: ModeBudget,
    pub multimedia: ModeBudget,
}

impl Default for ModeBudgetTable {
    fn default() -> Self {
        Self {
            simple: ModeBudget {
                total_ms: 5_000,
                refinement_ms: 800,
                retrieval_ms: 1_500,
                synthesis_ms: 2_500,
                per_lane_cap_ms: 1_500,
                per_provider_cap_ms: 800,
            },
            technical: ModeBudget {
                total_ms: 7_000,
                refinement_ms: 800,
                retrieval_ms: 2_500,
                synthesis_ms: 3_500,
                per_lane_cap_ms: 2_500,
                per_provider_cap_ms: 800,
            },
            research: ModeBudget {
                total_ms: 10_000,
                refinement_ms: 800,
                retrieval_ms: 4_000,
                synthesis_ms: 4_500,
                per_lane_cap_ms: 4_000,
                per_provider_cap_ms: 1_000,
            },
            multimedia: ModeBudget {
                total_ms: 10_000,
                refinement_ms: 800,
                retrieval_ms: 4_000,
                synthesis_ms: 4_500,
                per_lane_cap_ms: 4_000,
                per_provider_cap_ms: 1_000,
            },
        }
    }
}

impl ModeBudgetTable {
    pub fn row(&self, mode: QueryMode) -> ModeBudget {
        match mode {
            QueryMode::Simple => self.simple,
            QueryMode::Technical => self.technical,
            QueryMode::Research => self.research,
            QueryMode::Multimedia => self.multimedia,
        }
    }
}

/// A named phase of the request lifecycle. Used as the key for
/// `phase_budgets` and for `remaining()` lookups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Refinement,
    Retrieval,
    Synthesis,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Refinement => "refinement",
            Phase::Retrieval => "retrieval",
            Phase::Synthesis => "synthesis",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("budget exceeded for phase {phase}")]
pub struct BudgetExceeded {
    pub phase: Phase,
}

/// Per-Query budget. Immutable once created; `Instant`-based so it
/// is monotonic and unaffected by wall-clock adjustments.
#[derive(Debug, Clone)]
pub struct Budget {
    pub total_ms: u64,
    phase_budgets: HashMap<Phase, u64>,
    created_at: Instant,
    per_lane_cap_ms: u64,
    per_provider_cap_ms: u64,
}

impl Budget {
    pub fn from_mode(mode: QueryMode, table: &ModeBudgetTable) -> Self {
        let row = table.row(mode);
        let mut phase_budgets = HashMap::new();
        phase_budgets.insert(Phase::Refinement, row.refinement_ms);
        phase_budgets.insert(Phase::Retrieval, row.retrieval_ms);
        phase_budgets.insert(Phase::Synthesis, row.synthesis_ms);

        Self {
            total_ms: row.total_ms,
            phase_budgets,
            created_at: Instant::now(),
            per_lane_cap_ms: row.per_lane_cap_ms,
            per_provider_cap_ms: row.per_provider_cap_ms,
        }
    }

    /// Construct a budget with an explicit total, used for the §8 boundary
    /// test ("deadline set to 0").
    pub fn with_total_ms(total_ms: u64) -> Self {
        let mut phase_budgets = HashMap::new();
        phase_budgets.insert(Phase::Refinement, total_ms);
        phase_budgets.insert(Phase::Retrieval, total_ms);
        phase_budgets.insert(Phase::Synthesis, total_ms);
        Self {
            total_ms,
            phase_budgets,
            created_at: Instant::now(),
            per_lane_cap_ms: total_ms,
            per_provider_cap_ms: total_ms,
        }
    }

    pub fn per_lane_cap_ms(&self) -> u64 {
        self.per_lane_cap_ms
    }

    pub fn per_provider_cap_ms(&self) -> u64 {
        self.per_provider_cap_ms
    }

    /// Absolute deadline for the whole request.
    pub fn deadline(&self) -> Instant {
        self.created_at + Duration::from_millis(self.total_ms)
    }

    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline()
    }

    /// Residual wall-clock time against the *global* deadline, zero if
    /// already past it.
    pub fn global_remaining(&self) -> Duration {
        self.deadline().saturating_duration_since(Instant::now())
    }

    /// `remaining(phase)`: the minimum of the phase budget and the
    /// wall-clock residual. Fails with `BudgetExceeded` once the
    /// phase's own deadline — not just the global one — has passed.
    pub fn remaining(&self, phase: Phase) -> Result<Duration, BudgetExceeded> {
        let phase_ms = *self.phase_budgets.get(&phase).unwrap_or(&self.total_ms);
        let phase_deadline = self.created_at + Duration::from_millis(phase_ms);
        let now = Instant::now();
        if now >= phase_deadline || now >= self.deadline() {
            return Err(BudgetExceeded { phase });
        }
        Ok(phase_deadline
            .saturating_duration_since(now)
            .min(self.global_remaining()))
    }

    /// Deadline derived for a single lane: `min(now + per_lane_budget_ms,
    /// global_deadline - synthesis_reserve)`.
    pub fn lane_deadline(&self, per_lane_budget_ms: u64, synthesis_reserve_ms: u64) -> Instant {
        let candidate = Instant::now() + Duration::from_millis(per_lane_budget_ms);
        let reserved_global = self
            .deadline()
            .checked_sub(Duration::from_millis(synthesis_reserve_ms))
            .unwrap_or(self.created_at);
        candidate.min(reserved_global)
    }

    /// Deadline derived for a single provider call within a lane.
    pub fn provider_deadline(&self, per_provider_cap_ms: u64, lane_deadline: Instant) -> Instant {
        (Instant::now() + Duration::from_millis(per_provider_cap_ms)).min(lane_deadline)
    }

    /// Absolute deadline for one phase: the phase's own sub-budget capped
    /// by the global deadline. Used by components (Guided Refinement) that
    /// need an `Instant` to hand to `tokio::time::timeout` rather than a
    /// `remaining()` duration recomputed at call time.
    pub fn phase_deadline(&self, phase: Phase) -> Instant {
        let phase_ms = *self.phase_budgets.get(&phase).unwrap_or(&self.total_ms);
        (self.created_at + Duration::from_millis(phase_ms)).min(self.deadline())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn mode_table_matches_spec() {
        let table = ModeBudgetTable::default();
        assert_eq!(table.simple.total_ms, 5_000);
        assert_eq!(table.research.total_ms, 10_000);
        assert_eq!(table.research.per_lane_cap_ms, 4_000);
    }

    #[test]
    fn remaining_never_exceeds_global_residual() {
        let budget = Budget::from_mode(QueryMode::Simple, &ModeBudgetTable::default());
        let remaining = budget.remaining(Phase::Synthesis).unwrap();
        assert!(remaining <= Duration::from_millis(5_000));
    }

    #[test]
    fn zero_total_budget_is_immediately_expired() {
        let budget = Budget::with_total_ms(0);
        assert!(budget.is_expired());
        assert!(budget.remaining(Phase::Retrieval).is_err());
    }

    #[test]
    fn remaining_fails_past_phase_deadline() {
        let mut table = ModeBudgetTable::default();
        table.simple.refinement_ms = 5;
        table.simple.total_ms = 10_000;
        let budget = Budget::from_mode(QueryMode::Simple, &table);
        sleep(Duration::from_millis(20));
        assert!(budget.remaining(Phase::Refinement).is_err());
        // other phases still have headroom against the global deadline
        assert!(budget.remaining(Phase::Retrieval).is_ok());
    }
}
