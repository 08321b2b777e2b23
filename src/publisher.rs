//! Result records, their durable store and their tabular export.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::loaders::Dataset;
use crate::solver::Solution;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, trace};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentEntry {
    pub name: String,
    pub eid: String,
    /// Remapped value per skill index.
    pub skill_set: BTreeMap<usize, i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub name: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub title: String,
    /// Remapped requirement times importance, per skill index, for display.
    pub skill_req: BTreeMap<usize, f64>,
}

/// One published improvement. The default value is the empty placeholder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    #[serde(default)]
    pub students: Vec<StudentEntry>,
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
    #[serde(default)]
    pub skills: BTreeMap<usize, String>,
    /// Team index to the indices of its students.
    #[serde(default)]
    pub matching: BTreeMap<usize, Vec<usize>>,
    /// Team index to the label of its meeting slot.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub time_slot: BTreeMap<usize, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl SolveResult {
    pub fn is_placeholder(&self) -> bool {
        self.matching.is_empty()
    }

    /// Team display name, falling back to the index for hand-edited records.
    pub fn team_name(&self, team: usize) -> String {
        self.projects
            .get(team)
            .map_or_else(|| team.to_string(), |p| p.name.clone())
    }

    pub fn student_name(&self, student: usize) -> String {
        self.students
            .get(student)
            .map_or_else(|| student.to_string(), |s| s.name.clone())
    }
}

/// Turns solver solutions into records sharing the job's static parts.
#[derive(Clone, Debug)]
pub struct RecordBuilder {
    template: SolveResult,
    slots: Vec<String>,
}

impl RecordBuilder {
    pub fn new(data: &Dataset, config: &Config) -> Self {
        let lookup =
            |map: &BTreeMap<i64, i64>, ordinal: i64| map.get(&ordinal).copied().unwrap_or(0);
        let students = data
            .students
            .iter()
            .map(|s| StudentEntry {
                name: s.name.clone(),
                eid: s.eid.clone(),
                skill_set: s
                    .ratings
                    .iter()
                    .map(|&r| lookup(&config.student_mapping, r))
                    .enumerate()
                    .collect(),
            })
            .collect();
        let projects = data
            .projects
            .iter()
            .map(|p| ProjectEntry {
                name: p.name().to_owned(),
                company: p.company.clone(),
                title: p.title.clone(),
                skill_req: p
                    .requirements
                    .iter()
                    .zip(&data.skills)
                    .map(|(&r, skill)| {
                        let value = lookup(&config.company_mapping, r) as f64;
                        config
                            .importance(skill)
                            .map_or(value, |w| value * w.numer() as f64 / w.denom() as f64)
                    })
                    .enumerate()
                    .collect(),
            })
            .collect();
        Self {
            template: SolveResult {
                students,
                projects,
                skills: data.skills.iter().cloned().enumerate().collect(),
                ..SolveResult::default()
            },
            slots: config.time_availability.clone(),
        }
    }

    pub fn build(&self, solution: &Solution, sequence: u64) -> SolveResult {
        let teams = solution.time_slot.rows;
        SolveResult {
            matching: (0..teams).map(|t| (t, solution.members(t))).collect(),
            time_slot: (0..teams)
                .filter_map(|t| {
                    let slot = solution.slot_of(t)?;
                    Some((t, self.slots.get(slot)?.clone()))
                })
                .collect(),
            objective: Some(solution.objective),
            sequence: Some(sequence),
            ..self.template.clone()
        }
    }
}

/// Durable storage of the last result, replaced atomically on every write.
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The persisted result, `None` if nothing was ever stored.
    pub async fn load(&self) -> Result<Option<SolveResult>> {
        match tokio::fs::read(&self.path).await {
            Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, result: &SolveResult) -> Result<()> {
        let content = serde_json::to_vec_pretty(result)?;
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        let persistence = |source| Error::Persistence {
            path: self.path.clone(),
            source,
        };
        tokio::task::spawn_blocking(move || write_atomically(&path, &content))
            .await
            .map_err(|e| persistence(std::io::Error::other(e)))?
            .map_err(persistence)?;
        trace!(path = %self.path.display(), sequence = ?result.sequence, "result persisted");
        Ok(())
    }
}

/// Write to a temporary file next to `path`, then rename it over `path`.
pub fn write_atomically(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(content)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), bytes = content.len(), "replaced file");
    Ok(())
}

/// `Team, Meet time, Student Names` export, `None` for the placeholder.
pub fn to_csv(result: &SolveResult) -> Result<Option<String>> {
    if result.is_placeholder() {
        return Ok(None);
    }
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    writer.write_record(["Team", "Meet time", "Student Names"])?;
    for (&team, students) in &result.matching {
        let mut row = vec![
            result.team_name(team),
            result.time_slot.get(&team).cloned().unwrap_or_default(),
        ];
        row.extend(students.iter().map(|&s| result.student_name(s)));
        writer.write_record(&row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}
