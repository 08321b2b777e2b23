use super::{CancelToken, Solution, Solver, StopReason, TerminalStatus};
use crate::config::MAX_SLOTS;
use crate::encoder::OptimizationModel;
use pathfinding::matrix::Matrix;
use tracing::{debug, trace};

/// Nodes explored between two deadline checks.
const DEADLINE_CHECK_PERIOD: u64 = 1024;

/// Exhaustive depth-first search over student placements.
///
/// Students are placed one at a time. A branch is cut when the remaining
/// students cannot bring every team to its minimum size, when a team is left
/// without a slot suiting all of its members, or when an optimistic bound on
/// the objective cannot beat the best solution found so far.
#[derive(Clone, Copy, Debug, Default)]
pub struct BranchAndBound;

impl Solver for BranchAndBound {
    fn solve(
        &self,
        model: &OptimizationModel,
        on_improve: &mut dyn FnMut(Solution),
        cancel: &CancelToken,
    ) -> TerminalStatus {
        if model.teams() == 0 {
            return TerminalStatus::Error("the model has no team".into());
        }
        if model.slot_count() == 0 || model.slot_count() > MAX_SLOTS {
            return TerminalStatus::Error(format!(
                "cannot search with {} time slots",
                model.slot_count()
            ));
        }
        let mut search = Search::new(model, cancel, on_improve);
        search.descend(0);
        debug!(
            nodes = search.nodes,
            best = ?search.best,
            stopped = ?search.stopped,
            "branch and bound finished"
        );
        match (search.stopped, search.best) {
            (Some(StopReason::Cancelled), _) | (Some(StopReason::TimedOut), None) => {
                TerminalStatus::Cancelled
            }
            (Some(StopReason::TimedOut), Some(_)) => TerminalStatus::Feasible,
            (None, Some(_)) => TerminalStatus::Optimal,
            (None, None) => TerminalStatus::Infeasible,
        }
    }
}

struct Search<'a> {
    model: &'a OptimizationModel,
    cancel: &'a CancelToken,
    on_improve: &'a mut dyn FnMut(Solution),
    masks: Vec<u64>,
    /// Row `i`: best contribution to (team, skill) of any student from `i` on.
    best_remaining: Matrix<i64>,
    team_of: Vec<usize>,
    sizes: Vec<usize>,
    common_slots: Vec<u64>,
    sums: Matrix<i64>,
    best: Option<i64>,
    nodes: u64,
    stopped: Option<StopReason>,
}

impl<'a> Search<'a> {
    fn new(
        model: &'a OptimizationModel,
        cancel: &'a CancelToken,
        on_improve: &'a mut dyn FnMut(Solution),
    ) -> Self {
        let (students, teams, skills) = (model.students(), model.teams(), model.skills.len());
        let masks = (0..students)
            .map(|i| {
                (0..model.slot_count())
                    .filter(|&j| model.availability[(i, j)])
                    .fold(0u64, |m, j| m | (1 << j))
            })
            .collect();
        let mut best_remaining = Matrix::new(students + 1, teams * skills, 0);
        for i in (0..students).rev() {
            for t in 0..teams {
                for k in 0..skills {
                    let c = t * skills + k;
                    best_remaining[(i, c)] =
                        best_remaining[(i + 1, c)].max(model.contribution(i, t, k));
                }
            }
        }
        let all_slots = if model.slot_count() == 64 {
            u64::MAX
        } else {
            (1u64 << model.slot_count()) - 1
        };
        Self {
            model,
            cancel,
            on_improve,
            masks,
            best_remaining,
            team_of: vec![0; students],
            sizes: vec![0; teams],
            common_slots: vec![all_slots; teams],
            sums: Matrix::new(teams, skills, 0),
            best: None,
            nodes: 0,
            stopped: None,
        }
    }

    fn should_stop(&mut self) -> bool {
        if self.stopped.is_none() {
            self.nodes += 1;
            if self.cancel.is_cancelled() {
                self.stopped = Some(StopReason::Cancelled);
            } else if self.nodes % DEADLINE_CHECK_PERIOD == 0 {
                self.stopped = self.cancel.stop_reason();
            }
        }
        self.stopped.is_some()
    }

    fn goodness(&self, team: usize) -> i64 {
        (0..self.sums.columns)
            .map(|k| self.sums[(team, k)])
            .min()
            .unwrap_or(0)
    }

    /// Upper bound on the objective reachable from placing student `next` on.
    fn bound(&self, next: usize) -> i64 {
        let remaining = self.model.students() - next;
        let skills = self.sums.columns;
        (0..self.model.teams())
            .map(|t| {
                let room = (self.model.group_size.max - self.sizes[t]).min(remaining) as i64;
                (0..skills)
                    .map(|k| {
                        let best = self.best_remaining[(next, t * skills + k)].max(0);
                        self.sums[(t, k)] + room * best
                    })
                    .min()
                    .unwrap_or(0)
            })
            .min()
            .unwrap_or(0)
    }

    fn can_still_fill(&self, next: usize) -> bool {
        let missing: usize = self
            .sizes
            .iter()
            .map(|&s| self.model.group_size.min.saturating_sub(s))
            .sum();
        missing <= self.model.students() - next
    }

    fn descend(&mut self, next: usize) {
        if self.should_stop() || !self.can_still_fill(next) {
            return;
        }
        if self.best.is_some_and(|best| self.bound(next) <= best) {
            return;
        }
        if next == self.model.students() {
            self.record();
            return;
        }
        let mut candidates = (0..self.model.teams())
            .filter(|&t| {
                self.sizes[t] < self.model.group_size.max
                    && self.common_slots[t] & self.masks[next] != 0
            })
            .collect::<Vec<_>>();
        // Weakest teams first, to reach good solutions early.
        candidates.sort_by_key(|&t| (self.goodness(t), t));
        for t in candidates {
            let saved_slots = self.common_slots[t];
            self.place(next, t, 1);
            self.common_slots[t] &= self.masks[next];
            self.descend(next + 1);
            self.common_slots[t] = saved_slots;
            self.place(next, t, -1);
            if self.stopped.is_some() {
                return;
            }
        }
    }

    fn place(&mut self, student: usize, team: usize, direction: i64) {
        for k in 0..self.sums.columns {
            self.sums[(team, k)] += direction * self.model.contribution(student, team, k);
        }
        if direction > 0 {
            self.sizes[team] += 1;
            self.team_of[student] = team;
        } else {
            self.sizes[team] -= 1;
        }
    }

    fn record(&mut self) {
        let objective = (0..self.model.teams())
            .map(|t| self.goodness(t))
            .min()
            .unwrap_or(0);
        if self.best.is_some_and(|best| objective <= best) {
            return;
        }
        self.best = Some(objective);
        let slot_of = self
            .common_slots
            .iter()
            .map(|m| m.trailing_zeros() as usize)
            .collect::<Vec<_>>();
        trace!(objective, nodes = self.nodes, "improving solution");
        (self.on_improve)(Solution::from_indices(
            &self.team_of,
            &slot_of,
            self.model.teams(),
            self.model.slot_count(),
            objective,
        ));
    }
}
