use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("Failed to read label table '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Line {line}: invalid class index '{value}'")]
    InvalidIndex { line: usize, value: String },

    #[error("Line {line}: no label after class index")]
    MissingLabel { line: usize },

    #[error("Label table contains no entries")]
    Empty,
}

/// Class index to display label, loaded once at startup.
///
/// The file format is one `"<index> <label>"` entry per line; the label is
/// everything after the first space. Blank lines are ignored and a repeated
/// index overrides the earlier entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTable {
    labels: BTreeMap<usize, String>,
}

impl LabelTable {
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        let content = std::fs::read_to_string(path).map_err(|source| LabelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, LabelError> {
        let mut labels = BTreeMap::new();

        for (i, line) in content.lines().enumerate() {
            let line_no = i + 1;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let (index, label) = line
                .split_once(' ')
                .ok_or(LabelError::MissingLabel { line: line_no })?;

            let index = index
                .trim()
                .parse::<usize>()
                .map_err(|_| LabelError::InvalidIndex {
                    line: line_no,
                    value: index.to_string(),
                })?;

            labels.insert(index, label.to_string());
        }

        if labels.is_empty() {
            return Err(LabelError::Empty);
        }

        Ok(Self { labels })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(&index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.labels.iter().map(|(i, l)| (*i, l.as_str()))
    }
}

impl<S: Into<String>> FromIterator<(usize, S)> for LabelTable {
    fn from_iter<I: IntoIterator<Item = (usize, S)>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().map(|(i, l)| (i, l.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parses_teachable_machine_format() {
        let table = LabelTable::parse("0 cat\n1 dog\n2 empty room\n").unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0), Some("cat"));
        assert_eq!(table.get(1), Some("dog"));
        assert_eq!(table.get(2), Some("empty room"));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn test_strips_windows_line_endings() {
        let table = LabelTable::parse("0 cat\r\n1 dog\r\n").unwrap();

        assert_eq!(table.get(0), Some("cat"));
        assert_eq!(table.get(1), Some("dog"));
    }

    #[test]
    fn test_skips_blank_lines() {
        let table = LabelTable::parse("\n0 cat\n\n   \n1 dog").unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_later_duplicate_wins() {
        let table = LabelTable::parse("0 cat\n0 kitten\n").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0), Some("kitten"));
    }

    #[test]
    fn test_rejects_non_numeric_index() {
        let err = LabelTable::parse("0 cat\nx dog\n").unwrap_err();

        match err {
            LabelError::InvalidIndex { line, value } => {
                assert_eq!(line, 2);
                assert_eq!(value, "x");
            }
            other => panic!("Expected InvalidIndex, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_line_without_label() {
        let err = LabelTable::parse("0 cat\n1\n").unwrap_err();
        assert!(matches!(err, LabelError::MissingLabel { line: 2 }));
    }

    #[test]
    fn test_rejects_empty_table() {
        assert!(matches!(LabelTable::parse("\n\n"), Err(LabelError::Empty)));
    }

    #[test]
    fn test_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0 cat").unwrap();
        writeln!(file, "1 dog").unwrap();

        let table = LabelTable::load(file.path()).unwrap();

        assert_eq!(
            table.iter().collect::<Vec<_>>(),
            vec![(0, "cat"), (1, "dog")]
        );
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = LabelTable::load(Path::new("/nonexistent/labels.txt")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/labels.txt"));
    }
}
