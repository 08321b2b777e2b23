pub use self::project::{ProjectId, ProjectRecord};
pub use self::student::{StudentId, StudentRecord};

mod project;
mod student;
