use std::fmt;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ProjectId(pub usize);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectRecord {
    pub id: ProjectId,
    /// Identifier from the `Project_ID` column, also used as display name.
    pub key: String,
    pub company: String,
    pub title: String,
    /// Raw ordinal requirement per skill, in skill order.
    pub requirements: Vec<i64>,
}

impl ProjectRecord {
    pub fn name(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ProjectRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}: {})", self.key, self.company, self.title)
    }
}
