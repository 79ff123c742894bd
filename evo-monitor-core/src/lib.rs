//! Core functionality for evo-monitor
//!
//! This crate watches a project tree, groups the files created in quick
//! succession into generation sessions, and turns recurring patterns in
//! those sessions into lessons written to a learning journal.

pub mod lessons;
pub mod monitor;
pub mod patterns;
pub mod pipeline;
pub mod session;
pub mod sink;

pub use lessons::{Lesson, match_to_lesson};
pub use monitor::{MonitorConfig, MonitorError, Operation, OperationType};
pub use patterns::{DetectorRegistry, PatternDetector, PatternMatch, PatternType};
pub use pipeline::{FileOperationMonitor, MonitorStatistics};
pub use session::{GeneratedFile, GenerationContext, GenerationSession};
pub use sink::{LearningSink, MarkdownJournalSink, RetryingSink};

#[cfg(test)]
mod tests;
