//! Exact integer optimization model built from verified tables.
//!
//! Decision variables are two boolean grids: student × team assignment and
//! team × slot meeting time. The objective is the minimum team goodness,
//! to be maximized.

use crate::config::{Config, GroupSizeBounds, lcm};
use crate::loaders::Dataset;
use crate::remap::{remap_projects, remap_students};
use crate::solver::Solution;
use pathfinding::matrix::Matrix;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("a rating of the {0} table is absent from its value mapping")]
    UnknownOrdinal(&'static str),
    #[error("integer overflow while computing {0}")]
    Overflow(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Var {
    Assign { student: usize, team: usize },
    Slot { team: usize, slot: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Constraint {
    /// The number of true variables lies within `min..=max`.
    Cardinality { vars: Vec<Var>, min: usize, max: usize },
    /// Whenever `enforce_if` holds, `premise` implies `conclusion`.
    Implication {
        enforce_if: Var,
        premise: Var,
        conclusion: bool,
    },
}

impl Constraint {
    pub fn holds(&self, solution: &Solution) -> bool {
        match self {
            Constraint::Cardinality { vars, min, max } => {
                let count = vars.iter().filter(|&&v| solution.value(v)).count();
                (*min..=*max).contains(&count)
            }
            Constraint::Implication {
                enforce_if,
                premise,
                conclusion,
            } => !solution.value(*enforce_if) || !solution.value(*premise) || *conclusion,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    Shape {
        grid: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    Unsatisfied(Constraint),
}

#[derive(Clone, Debug)]
pub struct OptimizationModel {
    pub skills: Vec<String>,
    pub slots: Vec<String>,
    pub group_size: GroupSizeBounds,
    /// Remapped student values, students × skills.
    pub student_values: Matrix<i64>,
    /// Importance-scaled requirements, teams × skills.
    pub requirements: Matrix<i64>,
    /// Per-unit multiplier `global_factor / requirement`, teams × skills.
    pub multipliers: Matrix<i64>,
    /// Students × slots.
    pub availability: Matrix<bool>,
    pub scale_factor: i64,
    pub global_factor: i64,
}

pub fn encode(data: &Dataset, config: &Config) -> Result<OptimizationModel, ModelError> {
    let skills = data.skills.len();
    let student_values = remap_students(&data.students, skills, &config.student_mapping)
        .ok_or(ModelError::UnknownOrdinal("student"))?;
    let mut requirements = remap_projects(&data.projects, skills, &config.company_mapping)
        .ok_or(ModelError::UnknownOrdinal("company"))?;

    let scale_factor = lcm(config.skill_importance.values().map(|w| w.denom()))
        .ok_or(ModelError::Overflow("the importance scale factor"))?;
    for value in requirements.values_mut() {
        *value = value
            .checked_mul(scale_factor)
            .ok_or(ModelError::Overflow("scaled requirements"))?;
    }
    for (k, skill) in data.skills.iter().enumerate() {
        if let Some(weight) = config.importance(skill) {
            for t in 0..requirements.rows {
                // Divide first, then multiply.
                requirements[(t, k)] = (requirements[(t, k)] / weight.denom())
                    .checked_mul(weight.numer())
                    .ok_or(ModelError::Overflow("weighted requirements"))?;
            }
        }
    }
    // Requirements stay positive: company values are at least 1 and the scale
    // factor is a multiple of every importance denominator.
    let distinct = requirements.values().copied().collect::<BTreeSet<_>>();
    let global_factor =
        lcm(distinct).ok_or(ModelError::Overflow("the global normalization factor"))?;
    let mut multipliers = Matrix::new(requirements.rows, skills, 0);
    for t in 0..requirements.rows {
        for k in 0..skills {
            multipliers[(t, k)] = global_factor / requirements[(t, k)];
        }
    }

    let largest_value = student_values.values().map(|v| v.abs()).max().unwrap_or(0);
    let largest_multiplier = multipliers.values().map(|v| v.abs()).max().unwrap_or(0);
    i64::try_from(config.group_size.max)
        .ok()
        .and_then(|n| n.checked_mul(largest_value))
        .and_then(|v| v.checked_mul(largest_multiplier))
        .ok_or(ModelError::Overflow("team goodness"))?;

    let slots = config.time_availability.len();
    let mut availability = Matrix::new(data.students.len(), slots, false);
    for (i, student) in data.students.iter().enumerate() {
        for j in 0..slots {
            availability[(i, j)] = student.is_available(j);
        }
    }

    debug!(
        students = data.students.len(),
        teams = data.projects.len(),
        skills,
        slots,
        scale_factor,
        global_factor,
        "encoded optimization model"
    );
    Ok(OptimizationModel {
        skills: data.skills.clone(),
        slots: config.time_availability.clone(),
        group_size: config.group_size,
        student_values,
        requirements,
        multipliers,
        availability,
        scale_factor,
        global_factor,
    })
}

impl OptimizationModel {
    pub fn students(&self) -> usize {
        self.student_values.rows
    }

    pub fn teams(&self) -> usize {
        self.requirements.rows
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Weighted value a student brings to a team for one skill.
    pub fn contribution(&self, student: usize, team: usize, skill: usize) -> i64 {
        self.student_values[(student, skill)] * self.multipliers[(team, skill)]
    }

    /// Minimum over skills of the accumulated weighted values of `members`.
    pub fn team_goodness(&self, team: usize, members: &[usize]) -> i64 {
        (0..self.skills.len())
            .map(|k| {
                members
                    .iter()
                    .map(|&i| self.contribution(i, team, k))
                    .sum::<i64>()
            })
            .min()
            .unwrap_or(0)
    }

    /// Every constraint of the model, in a solver-neutral form.
    pub fn constraints(&self) -> Vec<Constraint> {
        let (students, teams, slots) = (self.students(), self.teams(), self.slot_count());
        let mut constraints = Vec::new();
        for student in 0..students {
            constraints.push(Constraint::Cardinality {
                vars: (0..teams).map(|team| Var::Assign { student, team }).collect(),
                min: 1,
                max: 1,
            });
        }
        for team in 0..teams {
            constraints.push(Constraint::Cardinality {
                vars: (0..students).map(|student| Var::Assign { student, team }).collect(),
                min: self.group_size.min,
                max: self.group_size.max,
            });
        }
        for team in 0..teams {
            constraints.push(Constraint::Cardinality {
                vars: (0..slots).map(|slot| Var::Slot { team, slot }).collect(),
                min: 1,
                max: 1,
            });
        }
        // Only enforced for assigned students: the chosen slot must suit them.
        for student in 0..students {
            for team in 0..teams {
                for slot in 0..slots {
                    constraints.push(Constraint::Implication {
                        enforce_if: Var::Assign { student, team },
                        premise: Var::Slot { team, slot },
                        conclusion: self.availability[(student, slot)],
                    });
                }
            }
        }
        constraints
    }

    /// Check a solution against every constraint and return its objective.
    pub fn evaluate(&self, solution: &Solution) -> Result<i64, Vec<Violation>> {
        let mut violations = Vec::new();
        let shapes = [
            ("assignment", &solution.assignment, (self.students(), self.teams())),
            ("time_slot", &solution.time_slot, (self.teams(), self.slot_count())),
        ];
        for (grid, matrix, expected) in shapes {
            let found = (matrix.rows, matrix.columns);
            if found != expected {
                violations.push(Violation::Shape {
                    grid,
                    expected,
                    found,
                });
            }
        }
        if !violations.is_empty() {
            return Err(violations);
        }
        violations.extend(
            self.constraints()
                .into_iter()
                .filter(|c| !c.holds(solution))
                .map(Violation::Unsatisfied),
        );
        if !violations.is_empty() {
            return Err(violations);
        }
        Ok((0..self.teams())
            .map(|t| self.team_goodness(t, &solution.members(t)))
            .min()
            .unwrap_or(0))
    }
}
