use std::fmt;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StudentId(pub usize);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudentRecord {
    pub id: StudentId,
    pub eid: String,
    pub name: String,
    /// One flag per configured time slot, in configuration order.
    pub availability: Vec<bool>,
    /// Raw ordinal rating per skill, in skill order.
    pub ratings: Vec<i64>,
}

impl StudentRecord {
    pub fn is_available(&self, slot: usize) -> bool {
        self.availability.get(slot).copied().unwrap_or(false)
    }
}

impl fmt::Display for StudentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.eid)
    }
}

#[test]
fn test_availability() {
    let s = StudentRecord {
        id: StudentId(0),
        eid: "ab123".into(),
        name: "Ada".into(),
        availability: vec![true, false, true],
        ratings: vec![3],
    };
    assert!(s.is_available(2));
    assert!(!s.is_available(1));
    assert!(!s.is_available(7));
    assert_eq!(s.to_string(), "Ada (ab123)");
}
