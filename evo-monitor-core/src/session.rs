//! Operation history and generation-session aggregation
//!
//! Every recorded operation lands in a bounded FIFO history. Creates are
//! additionally buffered until the session window goes quiet, at which
//! point the buffer becomes one [`GenerationSession`].

use crate::monitor::{FileCategory, Operation, OperationClassifier, OperationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use uuid::Uuid;

/// Most recent operations, oldest evicted first
#[derive(Debug, Clone)]
pub struct OperationHistory {
    entries: VecDeque<Operation>,
    capacity: usize,
}

impl OperationHistory {
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::with_capacity(capacity.min(4096)), capacity: capacity.max(1) }
    }

    /// Append an operation, returning the evicted one when full
    pub fn push(&mut self, operation: Operation) -> Option<Operation> {
        let evicted =
            if self.entries.len() >= self.capacity { self.entries.pop_front() } else { None };
        self.entries.push_back(operation);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.entries.iter()
    }

    /// The last `count` operations in recording order
    pub fn recent(&self, count: usize) -> Vec<Operation> {
        let skip = self.entries.len().saturating_sub(count);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

/// Free-form description supplied by callers that record sessions themselves
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationContext {
    pub description: Option<String>,
    pub source: Option<String>,
}

/// A file produced programmatically, with or without its contents in hand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub content: Option<String>,
}

impl GeneratedFile {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self { path: path.into(), content: Some(content.into()) }
    }

    /// A file whose contents should be read from disk
    pub fn on_disk(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), content: None }
    }
}

/// One member file of a generation session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFile {
    pub path: PathBuf,
    pub content_type: FileCategory,
    pub size_bytes: u64,
    /// Contents for analysis; absent when unreadable or too large
    #[serde(skip)]
    pub content: Option<String>,
}

impl SessionFile {
    /// Describe a file from disk. Read failures leave the content empty.
    pub fn from_disk(path: &Path, classifier: &OperationClassifier, max_bytes: u64) -> Self {
        let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let content = if size_bytes <= max_bytes {
            match std::fs::read_to_string(path) {
                Ok(content) => Some(content),
                Err(e) => {
                    trace!("No content for {:?}: {}", path, e);
                    None
                }
            }
        } else {
            debug!("Skipping contents of {:?} ({} bytes)", path, size_bytes);
            None
        };

        Self { path: path.to_path_buf(), content_type: classifier.category(path), size_bytes, content }
    }

    pub fn from_generated(file: GeneratedFile, classifier: &OperationClassifier, max_bytes: u64) -> Self {
        match file.content {
            Some(content) => Self {
                content_type: classifier.category(&file.path),
                size_bytes: content.len() as u64,
                path: file.path,
                content: Some(content),
            },
            None => Self::from_disk(&file.path, classifier, max_bytes),
        }
    }
}

/// Creates believed to form one logical generation act
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSession {
    pub id: Uuid,
    pub files: Vec<SessionFile>,
    pub operations: Vec<Operation>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub context: Option<GenerationContext>,
}

impl GenerationSession {
    /// Package create operations into a session, loading file contents.
    ///
    /// Returns `None` when there are no operations. Directories keep their
    /// operation but are not listed as files.
    pub fn from_operations(
        operations: Vec<Operation>,
        files: Vec<SessionFile>,
        context: Option<GenerationContext>,
    ) -> Option<Self> {
        let window_start = operations.iter().map(|op| op.timestamp).min()?;
        let window_end = operations.iter().map(|op| op.timestamp).max()?;

        Some(Self { id: Uuid::new_v4(), files, operations, window_start, window_end, context })
    }

    /// Build a session from creates observed on disk
    pub fn from_creates(
        operations: Vec<Operation>,
        classifier: &OperationClassifier,
        max_bytes: u64,
    ) -> Option<Self> {
        let files = operations
            .iter()
            .filter(|op| !op.path.is_dir())
            .map(|op| SessionFile::from_disk(&op.path, classifier, max_bytes))
            .collect();
        Self::from_operations(operations, files, None)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// Buffers creates until the session window closes
#[derive(Debug, Default)]
pub struct SessionAggregator {
    recent_creates: Vec<Operation>,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a create. Other operation types are ignored.
    ///
    /// Returns true when the operation joined the buffer, which means the
    /// session timer must be restarted.
    pub fn push(&mut self, operation: &Operation) -> bool {
        if operation.operation_type != OperationType::Create {
            return false;
        }
        self.recent_creates.push(operation.clone());
        true
    }

    pub fn pending(&self) -> usize {
        self.recent_creates.len()
    }

    /// Drain the buffered creates
    pub fn take(&mut self) -> Vec<Operation> {
        std::mem::take(&mut self.recent_creates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_history_evicts_oldest_first() {
        let mut history = OperationHistory::new(1000);

        let mut evicted = None;
        for i in 0..1001 {
            evicted = history.push(Operation::modify(format!("file{i}.rs")));
        }

        assert_eq!(history.len(), 1000);
        assert_eq!(evicted.unwrap().path, PathBuf::from("file0.rs"));
        assert!(history.iter().all(|op| op.path != PathBuf::from("file0.rs")));
        assert_eq!(history.iter().next().unwrap().path, PathBuf::from("file1.rs"));
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let mut history = OperationHistory::new(10);
        for i in 0..5 {
            history.push(Operation::create(format!("{i}.js")));
        }

        let recent: Vec<PathBuf> = history.recent(2).into_iter().map(|op| op.path).collect();
        assert_eq!(recent, vec![PathBuf::from("3.js"), PathBuf::from("4.js")]);
        assert_eq!(history.recent(50).len(), 5);
    }

    #[test]
    fn test_aggregator_only_buffers_creates() {
        let mut aggregator = SessionAggregator::new();

        assert!(aggregator.push(&Operation::create("a.js")));
        assert!(!aggregator.push(&Operation::modify("a.js")));
        assert!(!aggregator.push(&Operation::delete("b.js")));
        assert!(aggregator.push(&Operation::create("c.js")));

        assert_eq!(aggregator.pending(), 2);
        assert_eq!(aggregator.take().len(), 2);
        assert_eq!(aggregator.pending(), 0);
    }

    #[test]
    fn test_empty_session_is_discarded() {
        let classifier = OperationClassifier::new();
        assert!(GenerationSession::from_creates(Vec::new(), &classifier, 1024).is_none());
    }

    #[test]
    fn test_session_reads_files_and_skips_directories() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("service.js");
        let nested = dir.path().join("models");
        std::fs::write(&file, "const x = 1;\n").unwrap();
        std::fs::create_dir(&nested).unwrap();

        let classifier = OperationClassifier::new();
        let ops = vec![Operation::create(&file), Operation::create(&nested)];
        let session = GenerationSession::from_creates(ops, &classifier, 1024).unwrap();

        assert_eq!(session.operations.len(), 2);
        assert_eq!(session.file_count(), 1);
        let member = &session.files[0];
        assert_eq!(member.content_type, FileCategory::Implementation);
        assert_eq!(member.size_bytes, 13);
        assert_eq!(member.content.as_deref(), Some("const x = 1;\n"));
        assert!(session.window_start <= session.window_end);
    }

    #[test]
    fn test_oversized_files_have_no_content() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bundle.js");
        std::fs::write(&file, "x".repeat(64)).unwrap();

        let member = SessionFile::from_disk(&file, &OperationClassifier::new(), 16);
        assert_eq!(member.size_bytes, 64);
        assert!(member.content.is_none());
    }
}
