use crate::error::Result;
use csv::{ReaderBuilder, Trim};
use std::io::Read;
use std::path::Path;

/// Raw tabular input: a header row and string cells, nothing interpreted yet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn from_reader<R: Read>(reader: R) -> Result<Table> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);
        let headers = reader.headers()?.iter().map(String::from).collect();
        let rows = reader
            .records()
            .map(|r| r.map(|r| r.iter().map(String::from).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        Ok(Table { headers, rows })
    }

    pub fn from_path(path: &Path) -> Result<Table> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Headers that are not part of `excluded`, in table order.
    pub fn remaining_columns(&self, excluded: &[&str]) -> Vec<(usize, &str)> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !excluded.contains(&h.as_str()))
            .map(|(i, h)| (i, h.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_reader_trims_and_keeps_ragged_rows() {
        let content = "EID, Name ,Python\n a1 ,Ada,3\nb2,Bob\n";
        let table = Table::from_reader(content.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["EID", "Name", "Python"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.cell(0, 0), Some("a1"));
        assert_eq!(table.cell(1, 2), None);
        assert_eq!(table.column("Python"), Some(2));
        assert_eq!(table.remaining_columns(&["EID", "Name"]), vec![(2, "Python")]);
    }
}
