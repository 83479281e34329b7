//! JSONL reading and writing for harvested [`DocumentRecord`]s.
//!
//! The harvested file holds exactly one JSON object per line:
//!
//! ```text
//! {"title":"install.md","body":"...","source":{"owner":"octo","repo":"docs"}}
//! ```

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::models::DocumentRecord;

/// Append-only writer for a harvested JSONL file.
pub struct RecordWriter {
    path: PathBuf,
    out: BufWriter<File>,
    written: u64,
}

impl RecordWriter {
    /// Open `path` for appending, creating it if needed.
    pub fn append(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open output file: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn write(&mut self, record: &DocumentRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        self.out
            .write_all(line.as_bytes())
            .and_then(|_| self.out.write_all(b"\n"))
            .with_context(|| format!("Failed to write record to {}", self.path.display()))?;
        self.written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<u64> {
        self.out
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        Ok(self.written)
    }
}

/// Load every record from a JSONL file. Blank lines are skipped; a line that
/// is not a valid record fails the load.
pub fn load_records(path: &Path) -> Result<Vec<DocumentRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open records file: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: DocumentRecord = serde_json::from_str(&line)
            .with_context(|| format!("Invalid record on line {} of {}", i + 1, path.display()))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordSource;

    fn record(title: &str, body: &str) -> DocumentRecord {
        DocumentRecord {
            title: title.to_string(),
            body: body.to_string(),
            source: RecordSource {
                owner: "octo".to_string(),
                repo: "docs".to_string(),
            },
        }
    }

    #[test]
    fn writes_one_object_per_line() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("out.jsonl");

        let mut writer = RecordWriter::append(&path).unwrap();
        writer.write(&record("a.md", "alpha")).unwrap();
        writer.write(&record("b.mdx", "beta")).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["title"], "a.md");
        assert_eq!(first["body"], "alpha");
        assert_eq!(first["source"]["owner"], "octo");
        assert_eq!(first["source"]["repo"], "docs");
    }

    #[test]
    fn load_skips_blank_lines() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.jsonl");
        let line = serde_json::to_string(&record("a.md", "alpha")).unwrap();
        std::fs::write(&path, format!("{}\n\n{}\n", line, line)).unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], record("a.md", "alpha"));
    }

    #[test]
    fn load_reports_bad_line_number() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.jsonl");
        let line = serde_json::to_string(&record("a.md", "alpha")).unwrap();
        std::fs::write(&path, format!("{}\n{{not json\n", line)).unwrap();

        let err = load_records(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }
}
