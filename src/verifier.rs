//! Schema and value-domain checks run on raw tables before any model is built.
//!
//! Checks are independent: every issue found is collected and reported together.

use crate::config::Config;
use crate::error::ValidationError;
use crate::loaders::{PROJECT_COLUMNS, PROJECT_ID, STUDENT_ID, Table, student_non_skill_columns};
use std::collections::{BTreeMap, HashSet};

pub fn verify(students: &Table, projects: &Table, config: &Config) -> Result<(), ValidationError> {
    let mut issues = Vec::new();
    check_project_columns(projects, &mut issues);
    check_student_columns(students, config, &mut issues);
    check_row_lengths("Student", students, &mut issues);
    check_row_lengths("Company", projects, &mut issues);
    check_availability(students, config, &mut issues);
    check_skills(students, projects, config, &mut issues);
    check_ratings("Company", projects, &PROJECT_COLUMNS, &config.company_mapping, &mut issues);
    check_ratings(
        "Student",
        students,
        &student_non_skill_columns(config),
        &config.student_mapping,
        &mut issues,
    );
    check_partition(students, projects, config, &mut issues);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(issues))
    }
}

fn check_required(table: &Table, columns: &[&str], issues: &mut Vec<String>) {
    for column in columns {
        if table.column(column).is_none() {
            issues.push(format!("Missing required column: {column}"));
        }
    }
}

fn check_not_empty(table: &Table, column: &str, issues: &mut Vec<String>) {
    if let Some(c) = table.column(column) {
        for row in 0..table.rows.len() {
            if table.cell(row, c).unwrap_or_default().is_empty() {
                issues.push(format!("{column} cannot be empty at row {row}"));
            }
        }
    }
}

fn check_unique(table: &Table, column: &str, issues: &mut Vec<String>) {
    if let Some(c) = table.column(column) {
        let mut seen = HashSet::new();
        for row in 0..table.rows.len() {
            match table.cell(row, c) {
                Some(v) if !v.is_empty() && !seen.insert(v) => {
                    issues.push(format!("Duplicate {column} {v:?} at row {row}"));
                }
                _ => {}
            }
        }
    }
}

fn check_project_columns(projects: &Table, issues: &mut Vec<String>) {
    check_required(projects, &PROJECT_COLUMNS, issues);
    for column in PROJECT_COLUMNS {
        check_not_empty(projects, column, issues);
    }
    check_unique(projects, PROJECT_ID, issues);
    if projects.rows.is_empty() {
        issues.push("The company file has no projects".into());
    }
}

fn check_student_columns(students: &Table, config: &Config, issues: &mut Vec<String>) {
    check_required(students, &student_non_skill_columns(config), issues);
    check_not_empty(students, STUDENT_ID, issues);
    check_unique(students, STUDENT_ID, issues);
    if students.rows.is_empty() {
        issues.push("The student file has no students".into());
    }
}

fn check_row_lengths(side: &str, table: &Table, issues: &mut Vec<String>) {
    for (row, cells) in table.rows.iter().enumerate() {
        if cells.len() != table.headers.len() {
            issues.push(format!(
                "Error: {side} - row {row} has {} cells but the header has {}",
                cells.len(),
                table.headers.len()
            ));
        }
    }
}

fn check_availability(students: &Table, config: &Config, issues: &mut Vec<String>) {
    let slots = config
        .time_availability
        .iter()
        .filter_map(|slot| students.column(slot).map(|c| (c, slot)))
        .collect::<Vec<_>>();
    if slots.is_empty() {
        return;
    }
    let eid = students.column(STUDENT_ID);
    for row in 0..students.rows.len() {
        let mut available = false;
        for &(c, slot) in &slots {
            match students.cell(row, c) {
                Some("1") => available = true,
                Some("0") | None => {}
                Some(v) => issues.push(format!(
                    "Error: Student - value {v:?} at row index {row} in column '{slot}' must be 0 or 1"
                )),
            }
        }
        if !available {
            let who = eid
                .and_then(|c| students.cell(row, c))
                .filter(|v| !v.is_empty())
                .map_or_else(|| format!("at row {row}"), |v| format!("EID {v}"));
            issues.push(format!("Error: Student - {who} has no available time slots"));
        }
    }
}

fn check_skills(students: &Table, projects: &Table, config: &Config, issues: &mut Vec<String>) {
    let non_skill = student_non_skill_columns(config);
    let student_skills = students
        .remaining_columns(&non_skill)
        .into_iter()
        .map(|(_, s)| s)
        .collect::<Vec<_>>();
    let company_skills = projects
        .remaining_columns(&PROJECT_COLUMNS)
        .into_iter()
        .map(|(_, s)| s)
        .collect::<Vec<_>>();
    if student_skills.is_empty() {
        issues.push("The student file has no skill columns".into());
    }
    if company_skills.len() != student_skills.len() {
        issues.push("The number of skills in the company and student files do not match".into());
    } else if company_skills != student_skills {
        issues.push("The skills in the company file and student file do not match".into());
    }
    for skill in config.skill_importance.keys() {
        if !company_skills.contains(&skill.as_str()) {
            issues.push(format!("Skill '{skill}' is not present in the company file"));
        }
        if !student_skills.contains(&skill.as_str()) {
            issues.push(format!("Skill '{skill}' is not present in the student file"));
        }
    }
}

fn check_ratings(
    side: &str,
    table: &Table,
    excluded: &[&str],
    mapping: &BTreeMap<i64, i64>,
    issues: &mut Vec<String>,
) {
    let columns = table.remaining_columns(excluded);
    for row in 0..table.rows.len() {
        for &(c, column) in &columns {
            let Some(value) = table.cell(row, c) else {
                continue;
            };
            match value.parse::<i64>() {
                Ok(n) if mapping.contains_key(&n) => {}
                Ok(_) => issues.push(format!(
                    "Error: {side} - value {value} at row index {row} in column '{column}' must be one of {:?}",
                    mapping.keys().collect::<Vec<_>>()
                )),
                Err(_) => issues.push(format!(
                    "Error: {side} - value {value:?} at row index {row} in column '{column}' is not numeric"
                )),
            }
        }
    }
}

fn check_partition(students: &Table, projects: &Table, config: &Config, issues: &mut Vec<String>) {
    let (n, teams) = (students.rows.len(), projects.rows.len());
    let bounds = config.group_size;
    if teams == 0 || n == 0 {
        return;
    }
    // No product means no upper limit for `max` and an impossible split for `min`.
    let too_few = teams.checked_mul(bounds.min).is_none_or(|least| n < least);
    let too_many = teams.checked_mul(bounds.max).is_some_and(|most| n > most);
    if too_few || too_many {
        issues.push(format!(
            "Cannot split {n} students into {teams} teams of {} to {} members",
            bounds.min, bounds.max
        ));
    }
}
