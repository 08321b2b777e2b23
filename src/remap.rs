use crate::model::{ProjectRecord, StudentRecord};
use pathfinding::matrix::Matrix;
use std::collections::BTreeMap;

/// Remap raw ordinals through a value map into a `rows × skills` matrix.
/// Ordinals absent from the map have been rejected by the verifier; they map
/// to `None` here so the caller decides.
fn remap_rows<'a, I>(
    rows: I,
    count: usize,
    skills: usize,
    map: &BTreeMap<i64, i64>,
) -> Option<Matrix<i64>>
where
    I: IntoIterator<Item = &'a [i64]>,
{
    let mut matrix = Matrix::new(count, skills, 0);
    for (r, ratings) in rows.into_iter().enumerate() {
        for (k, ordinal) in ratings.iter().enumerate() {
            matrix[(r, k)] = *map.get(ordinal)?;
        }
    }
    Some(matrix)
}

pub fn remap_students(
    students: &[StudentRecord],
    skills: usize,
    map: &BTreeMap<i64, i64>,
) -> Option<Matrix<i64>> {
    remap_rows(
        students.iter().map(|s| s.ratings.as_slice()),
        students.len(),
        skills,
        map,
    )
}

pub fn remap_projects(
    projects: &[ProjectRecord],
    skills: usize,
    map: &BTreeMap<i64, i64>,
) -> Option<Matrix<i64>> {
    remap_rows(
        projects.iter().map(|p| p.requirements.as_slice()),
        projects.len(),
        skills,
        map,
    )
}
