//! Contract between the orchestrator and a combinatorial search engine.
//!
//! Any engine able to optimize an [`OptimizationModel`] can be plugged in by
//! implementing [`Solver`]. It must report strictly improving feasible
//! solutions through the callback and honour the [`CancelToken`].

pub use self::branch_and_bound::BranchAndBound;

use crate::encoder::{OptimizationModel, Var};
use pathfinding::matrix::Matrix;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

mod branch_and_bound;

/// Values of the decision variables for one feasible solution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution {
    /// Students × teams.
    pub assignment: Matrix<bool>,
    /// Teams × slots.
    pub time_slot: Matrix<bool>,
    pub objective: i64,
}

impl Solution {
    /// Build the boolean grids from a team per student and a slot per team.
    pub fn from_indices(
        team_of: &[usize],
        slot_of: &[usize],
        teams: usize,
        slots: usize,
        objective: i64,
    ) -> Self {
        let mut assignment = Matrix::new(team_of.len(), teams, false);
        for (student, &team) in team_of.iter().enumerate() {
            assignment[(student, team)] = true;
        }
        let mut time_slot = Matrix::new(teams, slots, false);
        for (team, &slot) in slot_of.iter().enumerate() {
            time_slot[(team, slot)] = true;
        }
        Self {
            assignment,
            time_slot,
            objective,
        }
    }

    pub fn value(&self, var: Var) -> bool {
        let cell = match var {
            Var::Assign { student, team } => self.assignment.get((student, team)),
            Var::Slot { team, slot } => self.time_slot.get((team, slot)),
        };
        cell.copied().unwrap_or(false)
    }

    pub fn members(&self, team: usize) -> Vec<usize> {
        (0..self.assignment.rows)
            .filter(|&s| self.value(Var::Assign { student: s, team }))
            .collect()
    }

    pub fn slot_of(&self, team: usize) -> Option<usize> {
        (0..self.time_slot.columns).find(|&slot| self.value(Var::Slot { team, slot }))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    TimedOut,
}

/// Cooperative stop signal shared between the orchestrator and a running
/// solver: an external flag plus an optional deadline.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_limit(limit: Option<Duration>) -> Self {
        Self {
            flag: Arc::default(),
            deadline: limit.map(|l| Instant::now() + l),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(StopReason::TimedOut)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminalStatus {
    /// The last reported solution is proven optimal.
    Optimal,
    /// Stopped on the time budget with at least one solution.
    Feasible,
    Cancelled,
    Infeasible,
    Error(String),
}

impl TerminalStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, TerminalStatus::Infeasible | TerminalStatus::Error(_))
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalStatus::Optimal => write!(f, "optimal"),
            TerminalStatus::Feasible => write!(f, "feasible"),
            TerminalStatus::Cancelled => write!(f, "cancelled"),
            TerminalStatus::Infeasible => write!(f, "infeasible"),
            TerminalStatus::Error(e) => write!(f, "error: {e}"),
        }
    }
}

pub trait Solver: Send + Sync {
    /// Search `model`, calling `on_improve` for every feasible solution
    /// strictly better than the previous one, until optimality is proven or
    /// `cancel` says to stop.
    fn solve(
        &self,
        model: &OptimizationModel,
        on_improve: &mut dyn FnMut(Solution),
        cancel: &CancelToken,
    ) -> TerminalStatus;
}
