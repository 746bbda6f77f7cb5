//! Per-deployment record persistence
//!
//! Each sampling cycle appends one header-less CSV row to
//! `<record_dir>/<deployment>.csv`: the aggregated values followed by the cpu
//! limit, memory limit and replica count. Rows are never rewritten.

use crate::error::Result;
use crate::models::{AggregatedSequence, ResourceSnapshot};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Row terminator, matching the records written by earlier collectors
const ROW_TERMINATOR: &str = "\r\n";

/// One persisted row: a sequence correlated with a complete snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    pub deployment: String,
    pub sequence: AggregatedSequence,
    pub cpu_limit: String,
    pub memory_limit: String,
    pub replica_count: i32,
}

impl RecordRow {
    /// Build a row, or `None` if `snapshot` is missing a required field
    pub fn new(sequence: AggregatedSequence, snapshot: &ResourceSnapshot) -> Option<Self> {
        Some(Self {
            deployment: snapshot.deployment_name.clone()?,
            cpu_limit: snapshot.cpu_limit.clone()?,
            memory_limit: snapshot.memory_limit.clone()?,
            replica_count: snapshot.replica_count?,
            sequence,
        })
    }

    /// Fields of the row in file order
    pub fn fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .sequence
            .values()
            .iter()
            .map(ToString::to_string)
            .collect();
        fields.push(self.cpu_limit.clone());
        fields.push(self.memory_limit.clone());
        fields.push(self.replica_count.to_string());
        fields
    }

    /// The row as one CSV line, terminator included
    pub fn to_csv_line(&self) -> String {
        let mut line = self
            .fields()
            .iter()
            .map(|field| escape_field(field))
            .collect::<Vec<_>>()
            .join(",");
        line.push_str(ROW_TERMINATOR);
        line
    }
}

/// Quote a field if it contains a delimiter, quote or line break
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Trait for record persistence
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Append `row` to its deployment's record, returning the record's path
    async fn append(&self, row: &RecordRow) -> Result<PathBuf>;
}

/// Appends rows to `<deployment>.csv` files in a directory
pub struct CsvRecordSink {
    dir: PathBuf,
    // Serializes appends issued from this process
    write_lock: Mutex<()>,
}

impl CsvRecordSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the record file for `deployment`
    pub fn path_for(&self, deployment: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", deployment))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl RecordSink for CsvRecordSink {
    async fn append(&self, row: &RecordRow) -> Result<PathBuf> {
        let path = self.path_for(&row.deployment);
        let line = row.to_csv_line();

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(
            path = %path.display(),
            values = row.sequence.len(),
            "Appended record row"
        );

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SampleValue;
    use tempfile::TempDir;

    fn snapshot() -> ResourceSnapshot {
        ResourceSnapshot {
            cpu_limit: Some("500m".to_string()),
            memory_limit: Some("256Mi".to_string()),
            replica_count: Some(3),
            deployment_name: Some("game".to_string()),
        }
    }

    fn sequence() -> AggregatedSequence {
        AggregatedSequence::new(vec![
            SampleValue::Integer(10),
            SampleValue::Fractional(4.0),
            SampleValue::Integer(7),
        ])
    }

    #[test]
    fn test_row_layout() {
        let row = RecordRow::new(sequence(), &snapshot()).unwrap();
        assert_eq!(row.to_csv_line(), "10,4.0,7,500m,256Mi,3\r\n");
    }

    #[test]
    fn test_empty_sequence_row() {
        let row = RecordRow::new(AggregatedSequence::default(), &snapshot()).unwrap();
        assert_eq!(row.to_csv_line(), "500m,256Mi,3\r\n");
    }

    #[test]
    fn test_incomplete_snapshot_has_no_row() {
        let mut missing_cpu = snapshot();
        missing_cpu.cpu_limit = None;
        assert!(RecordRow::new(sequence(), &missing_cpu).is_none());

        let mut missing_replicas = snapshot();
        missing_replicas.replica_count = None;
        assert!(RecordRow::new(sequence(), &missing_replicas).is_none());

        let mut missing_name = snapshot();
        missing_name.deployment_name = None;
        assert!(RecordRow::new(sequence(), &missing_name).is_none());
    }

    #[test]
    fn test_fields_are_quoted_when_needed() {
        assert_eq!(escape_field("500m"), "500m");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[tokio::test]
    async fn test_sink_appends_rows() {
        let temp_dir = TempDir::new().unwrap();
        let sink = CsvRecordSink::new(temp_dir.path());

        let first = RecordRow::new(sequence(), &snapshot()).unwrap();
        let mut scaled = snapshot();
        scaled.replica_count = Some(4);
        let second = RecordRow::new(AggregatedSequence::default(), &scaled).unwrap();

        let path = sink.append(&first).await.unwrap();
        sink.append(&second).await.unwrap();

        assert_eq!(path, temp_dir.path().join("game.csv"));
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "10,4.0,7,500m,256Mi,3\r\n500m,256Mi,4\r\n");
    }

    #[tokio::test]
    async fn test_sink_fails_for_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let sink = CsvRecordSink::new(temp_dir.path().join("missing"));

        let row = RecordRow::new(sequence(), &snapshot()).unwrap();
        assert!(sink.append(&row).await.is_err());
    }
}
