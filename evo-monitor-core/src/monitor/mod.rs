//! Filesystem monitoring and operation classification
//!
//! This module turns native filesystem notifications into semantic
//! operation records:
//! - Per-directory watching that skips hidden and ignored subtrees
//! - Event debouncing keyed by event kind and path
//! - Create/modify/delete classification with a stat() check
//! - Path-based content categories for generated files

pub mod classifier;
pub mod debouncer;
pub mod watcher;

pub use classifier::{FileCategory, OperationClassifier};
pub use debouncer::{Debouncer, DebouncerConfig};
pub use watcher::{FileWatcher, WatchHandle};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Watch root does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid ignore pattern: {0}")]
    IgnorePattern(#[from] ignore::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;

/// Raw notification kinds, mirroring what a platform watcher can tell us
/// before we look at the disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawEventKind {
    /// Something appeared, disappeared or changed its name
    Rename,
    /// Contents or metadata changed
    Change,
    /// Anything else (access, unknown)
    Other,
}

/// A filtered notification waiting to be debounced and classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: RawEventKind,
    pub path: PathBuf,
}

impl RawEvent {
    pub fn new(kind: RawEventKind, path: impl Into<PathBuf>) -> Self {
        Self { kind, path: path.into() }
    }
}

/// Types of observed file operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Modify,
    Delete,
    /// Only produced by callers that record renames themselves; the watcher
    /// reports a rename on disk as a create
    Rename,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Modify => "modify",
            OperationType::Delete => "delete",
            OperationType::Rename => "rename",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed filesystem action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_type: OperationType,
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<PathBuf>,
}

impl Operation {
    pub fn new(operation_type: OperationType, path: impl Into<PathBuf>) -> Self {
        Self { operation_type, path: path.into(), timestamp: Utc::now(), previous_path: None }
    }

    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self::new(OperationType::Create, path)
    }

    pub fn modify(path: impl Into<PathBuf>) -> Self {
        Self::new(OperationType::Modify, path)
    }

    pub fn delete(path: impl Into<PathBuf>) -> Self {
        Self::new(OperationType::Delete, path)
    }

    pub fn rename(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self { previous_path: Some(from.into()), ..Self::new(OperationType::Rename, to) }
    }

    /// Final path component, lossily converted
    pub fn file_name(&self) -> String {
        self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }
}

/// Configuration for the monitoring pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Directory to watch
    pub root: PathBuf,
    /// Watch subdirectories as well as the root
    pub recursive: bool,
    /// Include dot-directories and dotfiles
    pub watch_hidden: bool,
    /// Gitignore-style patterns for paths that are never watched
    pub ignore_patterns: Vec<String>,
    /// Quiet period before a raw event is forwarded
    pub debounce_ms: u64,
    /// Quiet period after the last operation before recent history is analyzed
    pub operation_window_ms: u64,
    /// Quiet period after the last create before a generation session closes
    pub generation_session_window_ms: u64,
    /// Operations kept in memory
    pub max_history: usize,
    /// Same-type operations in one window that count as a bulk operation
    pub bulk_operation_threshold: usize,
    /// Names longer than this are verbose
    pub verbose_name_length: usize,
    pub good_name_min: usize,
    pub good_name_max: usize,
    /// Sessions larger than this are logged as unusually long
    pub max_session_files_warning: usize,
    /// Files larger than this are analyzed without their contents
    pub max_file_bytes: u64,
    /// Markdown journal that receives lessons
    pub journal_path: PathBuf,
    /// Delivery attempts per lesson; 1 means no retry
    pub sink_max_attempts: u32,
    pub sink_retry_backoff_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            recursive: true,
            watch_hidden: false,
            ignore_patterns: vec![
                "node_modules/".to_string(),
                "target/".to_string(),
                "dist/".to_string(),
                "build/".to_string(),
                "coverage/".to_string(),
                "*.tmp".to_string(),
                "*.swp".to_string(),
            ],
            debounce_ms: 1000,
            operation_window_ms: 60_000,
            generation_session_window_ms: 60_000,
            max_history: 1000,
            bulk_operation_threshold: 10,
            verbose_name_length: 80,
            good_name_min: 20,
            good_name_max: 60,
            max_session_files_warning: 200,
            max_file_bytes: 1024 * 1024,
            journal_path: PathBuf::from("learning-journal.md"),
            sink_max_attempts: 1,
            sink_retry_backoff_ms: 500,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Reject settings that would make the pipeline meaningless
    pub fn validate(&self) -> Result<()> {
        if self.bulk_operation_threshold == 0 {
            return Err(MonitorError::Config("bulk_operation_threshold must be at least 1".into()));
        }
        if self.max_history == 0 {
            return Err(MonitorError::Config("max_history must be at least 1".into()));
        }
        if self.good_name_min > self.good_name_max {
            return Err(MonitorError::Config(format!(
                "good_name_min ({}) exceeds good_name_max ({})",
                self.good_name_min, self.good_name_max
            )));
        }
        Ok(())
    }
}
