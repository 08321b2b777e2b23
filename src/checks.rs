use crate::config::GroupSizeBounds;
use crate::encoder::{OptimizationModel, Violation};
use crate::error::{Error, Result};
use crate::publisher::SolveResult;
use crate::solver::Solution;
use tracing::debug;

/// Check a solver solution against the model before it gets published, and
/// return its recomputed objective.
pub fn ensure_acceptable(model: &OptimizationModel, solution: &Solution) -> Result<i64> {
    let objective = model.evaluate(solution).map_err(|violations| {
        for v in &violations {
            debug!(violation = ?v, "solution breaks a model constraint");
        }
        Error::Solver(format!(
            "solution breaks {} constraint(s), first: {}",
            violations.len(),
            violations.first().map(describe).unwrap_or_default()
        ))
    })?;
    if objective != solution.objective {
        return Err(Error::Solver(format!(
            "reported objective {} differs from recomputed {objective}",
            solution.objective
        )));
    }
    Ok(objective)
}

fn describe(violation: &Violation) -> String {
    match violation {
        Violation::Shape {
            grid,
            expected,
            found,
        } => format!("{grid} grid is {found:?} instead of {expected:?}"),
        Violation::Unsatisfied(c) => format!("{c:?}"),
    }
}

/// Structural problems of a record: students not placed exactly once, teams
/// out of bounds or without exactly one meeting slot.
pub fn record_issues(result: &SolveResult, bounds: GroupSizeBounds) -> Vec<String> {
    let mut issues = Vec::new();
    let mut seen = vec![0usize; result.students.len()];
    for (&team, members) in &result.matching {
        if !bounds.contains(members.len()) {
            issues.push(format!(
                "team {} has {} students, expected {} to {}",
                result.team_name(team),
                members.len(),
                bounds.min,
                bounds.max
            ));
        }
        if !result.time_slot.contains_key(&team) {
            issues.push(format!("team {} has no meeting slot", result.team_name(team)));
        }
        for &s in members {
            match seen.get_mut(s) {
                Some(count) => *count += 1,
                None => issues.push(format!(
                    "team {} lists unknown student {s}",
                    result.team_name(team)
                )),
            }
        }
    }
    for (s, &count) in seen.iter().enumerate() {
        if count != 1 {
            issues.push(format!(
                "student {} is placed {count} times",
                result.student_name(s)
            ));
        }
    }
    issues
}
