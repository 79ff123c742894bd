//! Destinations for captured lessons

use crate::lessons::Lesson;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Receives lessons produced by the monitor
#[async_trait]
pub trait LearningSink: Send + Sync {
    async fn capture_learning(&self, lesson: &Lesson) -> Result<()>;
}

/// Appends each lesson as a Markdown section to a journal file
pub struct MarkdownJournalSink {
    path: PathBuf,
}

impl MarkdownJournalSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(lesson: &Lesson) -> String {
        let mut section = format!(
            "\n### {} ({})\n\n**Question:** {}\n\n**Insight:** {}\n\n**Impact:** {}\n\n**Confidence:** {:.2}\n\n**Learning:**\n",
            lesson.pattern_type,
            lesson.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            lesson.question,
            lesson.insight,
            lesson.impact,
            lesson.confidence,
        );
        for item in &lesson.learning {
            section.push_str(&format!("- {item}\n"));
        }
        section
    }
}

#[async_trait]
impl LearningSink for MarkdownJournalSink {
    async fn capture_learning(&self, lesson: &Lesson) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create journal directory {}", parent.display()))?;
        }

        let is_new = !tokio::fs::try_exists(&self.path).await.unwrap_or(false);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open learning journal {}", self.path.display()))?;

        let mut entry = String::new();
        if is_new {
            entry.push_str("# Learning Journal\n");
        }
        entry.push_str(&Self::render(lesson));

        file.write_all(entry.as_bytes()).await.context("Failed to append lesson")?;
        file.flush().await?;

        debug!("Appended {} lesson to {:?}", lesson.pattern_type, self.path);
        Ok(())
    }
}

/// Retries a failing sink a bounded number of times with doubling backoff
pub struct RetryingSink {
    inner: Arc<dyn LearningSink>,
    max_attempts: u32,
    backoff: Duration,
}

impl RetryingSink {
    pub fn new(inner: Arc<dyn LearningSink>, max_attempts: u32, backoff: Duration) -> Self {
        Self { inner, max_attempts: max_attempts.max(1), backoff }
    }
}

#[async_trait]
impl LearningSink for RetryingSink {
    async fn capture_learning(&self, lesson: &Lesson) -> Result<()> {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match self.inner.capture_learning(lesson).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_attempts => {
                    warn!("Lesson delivery attempt {}/{} failed: {:#}", attempt, self.max_attempts, e);
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e.context(format!("Lesson delivery failed after {attempt} attempt(s)")));
                }
            }
        }
    }
}
