pub use self::table::Table;

use crate::config::Config;
use crate::error::{Error, Result, ValidationError};
use crate::model::{ProjectId, ProjectRecord, StudentId, StudentRecord};
use crate::verifier;
use std::path::{Path, PathBuf};
use tracing::debug;

mod table;

pub const STUDENT_ID: &str = "EID";
pub const STUDENT_NAME: &str = "Name";
pub const PROJECT_ID: &str = "Project_ID";
pub const PROJECT_COMPANY: &str = "Company";
pub const PROJECT_TITLE: &str = "Project_Title";
pub const PROJECT_COLUMNS: [&str; 3] = [PROJECT_ID, PROJECT_COMPANY, PROJECT_TITLE];

/// Columns of the student table which are not skills.
pub fn student_non_skill_columns(config: &Config) -> Vec<&str> {
    [STUDENT_ID, STUDENT_NAME]
        .into_iter()
        .chain(config.time_availability.iter().map(String::as_str))
        .collect()
}

/// Verified students, projects and the shared ordered skill list.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub skills: Vec<String>,
    pub students: Vec<StudentRecord>,
    pub projects: Vec<ProjectRecord>,
}

/// Locations of the two input tables.
#[derive(Clone, Debug)]
pub struct Loader {
    pub students: PathBuf,
    pub projects: PathBuf,
}

impl Loader {
    pub fn new(students: impl Into<PathBuf>, projects: impl Into<PathBuf>) -> Self {
        Self {
            students: students.into(),
            projects: projects.into(),
        }
    }

    /// Read both tables fresh from disk.
    pub fn load_tables(&self) -> Result<(Table, Table)> {
        let students = read_table(&self.students, "student table")?;
        let projects = read_table(&self.projects, "project table")?;
        debug!(
            students = students.rows.len(),
            projects = projects.rows.len(),
            "loaded input tables"
        );
        Ok((students, projects))
    }

    /// Read, verify and convert both tables.
    pub fn load(&self, config: &Config) -> Result<Dataset> {
        let (students, projects) = self.load_tables()?;
        Dataset::from_tables(&students, &projects, config)
    }
}

fn read_table(path: &Path, what: &str) -> Result<Table> {
    if !path.exists() {
        return Err(Error::NotFound {
            what: format!("{what} {}", path.display()),
        });
    }
    Table::from_path(path)
}

impl Dataset {
    pub fn from_tables(students: &Table, projects: &Table, config: &Config) -> Result<Dataset> {
        verifier::verify(students, projects, config)?;
        let non_skill = student_non_skill_columns(config);
        let skill_columns = students.remaining_columns(&non_skill);
        let skills = skill_columns
            .iter()
            .map(|&(_, s)| s.to_owned())
            .collect::<Vec<_>>();
        let project_skill_columns = projects.remaining_columns(&PROJECT_COLUMNS);
        let eid = required(students, STUDENT_ID)?;
        let name = required(students, STUDENT_NAME)?;
        let slots = config
            .time_availability
            .iter()
            .map(|slot| required(students, slot))
            .collect::<Result<Vec<_>>>()?;
        let students = (0..students.rows.len())
            .map(|row| {
                Ok(StudentRecord {
                    id: StudentId(row),
                    eid: text(students, row, eid),
                    name: text(students, row, name),
                    availability: slots
                        .iter()
                        .map(|&c| Ok(integer(students, row, c)? == 1))
                        .collect::<Result<_>>()?,
                    ratings: skill_columns
                        .iter()
                        .map(|&(c, _)| integer(students, row, c))
                        .collect::<Result<_>>()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let key = required(projects, PROJECT_ID)?;
        let company = required(projects, PROJECT_COMPANY)?;
        let title = required(projects, PROJECT_TITLE)?;
        let projects = (0..projects.rows.len())
            .map(|row| {
                Ok(ProjectRecord {
                    id: ProjectId(row),
                    key: text(projects, row, key),
                    company: text(projects, row, company),
                    title: text(projects, row, title),
                    requirements: project_skill_columns
                        .iter()
                        .map(|&(c, _)| integer(projects, row, c))
                        .collect::<Result<_>>()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Dataset {
            skills,
            students,
            projects,
        })
    }
}

fn required(table: &Table, column: &str) -> Result<usize> {
    table
        .column(column)
        .ok_or_else(|| ValidationError::single(format!("Missing required column: {column}")).into())
}

fn text(table: &Table, row: usize, column: usize) -> String {
    table.cell(row, column).unwrap_or_default().to_owned()
}

fn integer(table: &Table, row: usize, column: usize) -> Result<i64> {
    let value = table.cell(row, column).unwrap_or_default();
    value.parse().map_err(|_| {
        ValidationError::single(format!(
            "value {value:?} at row {row} in column '{}' is not numeric",
            table.headers[column]
        ))
        .into()
    })
}
