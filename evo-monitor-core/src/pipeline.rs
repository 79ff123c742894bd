//! The monitoring pipeline
//!
//! Raw notifications flow watcher -> debouncer -> classifier -> history.
//! Two quiet-period timers drive analysis:
//! - every recorded operation restarts the operation window; when it goes
//!   quiet, the slice of history recorded since the last pass is run through
//!   the file-operation detectors
//! - every create restarts the generation session; when it goes quiet, the
//!   session's files are run through the code-generation detectors
//!
//! Every match becomes a lesson handed to the learning sink.

use crate::lessons::{Lesson, match_to_lesson};
use crate::monitor::{
    self, Debouncer, DebouncerConfig, FileWatcher, MonitorConfig, Operation, OperationClassifier,
    OperationType, RawEvent, WatchHandle,
};
use crate::patterns::{DetectionWindow, DetectorRegistry, PatternMatch};
use crate::session::{
    GeneratedFile, GenerationContext, GenerationSession, OperationHistory, SessionAggregator,
    SessionFile,
};
use crate::sink::{LearningSink, MarkdownJournalSink, RetryingSink};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Counters describing what the monitor has seen so far
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorStatistics {
    pub total_operations: u64,
    pub creates: u64,
    pub modifies: u64,
    pub deletes: u64,
    pub renames: u64,
    pub operation_windows_analyzed: u64,
    pub sessions_finalized: u64,
    pub session_files: u64,
    pub average_session_size: f64,
    pub patterns_detected: u64,
    pub lessons_captured: u64,
    pub sink_failures: u64,
    pub detector_failures: u64,
    pub history_len: usize,
    pub monitoring: bool,
}

struct MonitorState {
    history: OperationHistory,
    aggregator: SessionAggregator,
    /// Operations at the tail of `history` not yet seen by the operation detectors
    unanalyzed: usize,
    stats: MonitorStatistics,
}

impl MonitorState {
    /// Append to history. Returns true when the create joined the open session.
    fn record(&mut self, operation: Operation) -> bool {
        let buffered = self.aggregator.push(&operation);
        self.push_history(operation);
        buffered
    }

    fn push_history(&mut self, operation: Operation) {
        self.stats.total_operations += 1;
        match operation.operation_type {
            OperationType::Create => self.stats.creates += 1,
            OperationType::Modify => self.stats.modifies += 1,
            OperationType::Delete => self.stats.deletes += 1,
            OperationType::Rename => self.stats.renames += 1,
        }

        if let Some(evicted) = self.history.push(operation) {
            trace!("History full, evicted {:?}", evicted.path);
        }
        self.unanalyzed += 1;
    }

    /// The history slice recorded since the previous operation pass
    fn take_operation_window(&mut self) -> Vec<Operation> {
        let count = std::mem::take(&mut self.unanalyzed).min(self.history.len());
        self.history.recent(count)
    }
}

type TimerSlot = Mutex<Option<JoinHandle<()>>>;

struct Shared {
    config: MonitorConfig,
    classifier: OperationClassifier,
    registry: Arc<DetectorRegistry>,
    sink: Arc<dyn LearningSink>,
    state: Mutex<MonitorState>,
    operation_timer: TimerSlot,
    session_timer: TimerSlot,
    monitoring: AtomicBool,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(self: &Arc<Self>, operation: Operation) {
        debug!("{} {:?}", operation.operation_type, operation.path);
        let buffered = self.state().record(operation);
        self.restart_timer(&self.operation_timer, self.config.operation_window_ms, Self::operations_quiet);
        if buffered {
            self.restart_timer(&self.session_timer, self.config.generation_session_window_ms, Self::session_quiet);
        }
    }

    /// Abort the pending timer in `slot` and arm a new one.
    ///
    /// `on_quiet` runs synchronously once the window elapses, so aborting a
    /// timer can never interrupt it halfway.
    fn restart_timer(self: &Arc<Self>, slot: &TimerSlot, window_ms: u64, on_quiet: fn(Arc<Shared>)) {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No async runtime, analysis waits until flushed");
                return;
            }
        };

        let shared = Arc::clone(self);
        let mut timer = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(window_ms)).await;
            on_quiet(shared);
        }));
    }

    fn cancel_timer(slot: &TimerSlot) {
        if let Some(timer) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
            timer.abort();
        }
    }

    fn cancel_timers(&self) {
        Self::cancel_timer(&self.operation_timer);
        Self::cancel_timer(&self.session_timer);
    }

    fn operations_quiet(shared: Arc<Shared>) {
        let operations = shared.state().take_operation_window();
        if operations.is_empty() {
            return;
        }
        tokio::spawn(async move {
            shared.analyze_operations(operations).await;
        });
    }

    fn session_quiet(shared: Arc<Shared>) {
        let operations = shared.state().aggregator.take();
        if operations.is_empty() {
            return;
        }
        tokio::spawn(async move {
            shared.close_session(operations).await;
        });
    }

    async fn analyze_operations(&self, operations: Vec<Operation>) -> Vec<Lesson> {
        info!("Analyzing {} recent operation(s)", operations.len());
        let report = self.registry.detect_all(&DetectionWindow::operations(&operations));
        {
            let mut state = self.state();
            let stats = &mut state.stats;
            stats.operation_windows_analyzed += 1;
            stats.patterns_detected += report.matches.len() as u64;
            stats.detector_failures += report.failures as u64;
        }
        self.deliver(&report.matches).await
    }

    async fn close_session(&self, operations: Vec<Operation>) -> Vec<Lesson> {
        match GenerationSession::from_creates(operations, &self.classifier, self.config.max_file_bytes) {
            Some(session) => self.analyze_session(session).await,
            None => Vec::new(),
        }
    }

    async fn analyze_session(&self, session: GenerationSession) -> Vec<Lesson> {
        let file_count = session.file_count();
        if file_count > self.config.max_session_files_warning {
            debug!(
                "Generation session {} is unusually large ({} files, warning at {})",
                session.id, file_count, self.config.max_session_files_warning
            );
        }
        info!(
            "Analyzing generation session {} ({} operations, {} files)",
            session.id,
            session.operations.len(),
            file_count
        );

        let report = self.registry.detect_all(&DetectionWindow::files(&session.files));
        {
            let mut state = self.state();
            let stats = &mut state.stats;
            stats.sessions_finalized += 1;
            stats.session_files += file_count as u64;
            stats.patterns_detected += report.matches.len() as u64;
            stats.detector_failures += report.failures as u64;
        }
        self.deliver(&report.matches).await
    }

    async fn deliver(&self, matches: &[PatternMatch]) -> Vec<Lesson> {
        let mut lessons = Vec::with_capacity(matches.len());
        for found in matches {
            let lesson = match_to_lesson(found);
            match self.sink.capture_learning(&lesson).await {
                Ok(()) => {
                    self.state().stats.lessons_captured += 1;
                    debug!("Captured {} lesson {}", lesson.pattern_type, lesson.id);
                }
                Err(e) => {
                    self.state().stats.sink_failures += 1;
                    error!("Failed to capture {} lesson: {:#}", lesson.pattern_type, e);
                }
            }
            lessons.push(lesson);
        }
        lessons
    }
}

struct Running {
    watch: WatchHandle,
    event_loop: JoinHandle<()>,
}

/// Watches a directory tree and learns from the operations performed in it
pub struct FileOperationMonitor {
    shared: Arc<Shared>,
    running: Option<Running>,
}

impl FileOperationMonitor {
    pub fn new(config: MonitorConfig, registry: Arc<DetectorRegistry>, sink: Arc<dyn LearningSink>) -> Self {
        let state = MonitorState {
            history: OperationHistory::new(config.max_history),
            aggregator: SessionAggregator::new(),
            unanalyzed: 0,
            stats: MonitorStatistics::default(),
        };

        Self {
            shared: Arc::new(Shared {
                config,
                classifier: OperationClassifier::new(),
                registry,
                sink,
                state: Mutex::new(state),
                operation_timer: Mutex::new(None),
                session_timer: Mutex::new(None),
                monitoring: AtomicBool::new(false),
            }),
            running: None,
        }
    }

    /// Monitor with the built-in detectors and a Markdown journal at
    /// `config.journal_path`
    pub fn from_config(config: MonitorConfig) -> Self {
        let registry = Arc::new(DetectorRegistry::with_defaults(&config));
        let journal: Arc<dyn LearningSink> = Arc::new(MarkdownJournalSink::new(config.journal_path.clone()));
        let sink: Arc<dyn LearningSink> = if config.sink_max_attempts > 1 {
            Arc::new(RetryingSink::new(
                journal,
                config.sink_max_attempts,
                Duration::from_millis(config.sink_retry_backoff_ms),
            ))
        } else {
            journal
        };
        Self::new(config, registry, sink)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    pub fn is_monitoring(&self) -> bool {
        self.running.is_some()
    }

    /// Start watching the configured root.
    ///
    /// Must be called from within a tokio runtime. Calling it while already
    /// monitoring does nothing.
    pub fn start_monitoring(&mut self) -> monitor::Result<()> {
        if self.running.is_some() {
            debug!("Monitoring already active");
            return Ok(());
        }
        self.shared.config.validate()?;

        let debouncer =
            Debouncer::new(DebouncerConfig { delay_ms: self.shared.config.debounce_ms, ..Default::default() });
        let (raw_tx, debounced_rx) = debouncer.start();
        let watch = FileWatcher::new(self.shared.config.clone()).start(raw_tx)?;

        let event_loop = self.spawn_event_loop(debounced_rx, Some(watch.clone()));
        self.running = Some(Running { watch, event_loop });
        self.shared.monitoring.store(true, Ordering::SeqCst);

        info!("File operation monitoring started");
        Ok(())
    }

    /// Stop watching, drain in-flight events and flush pending analysis.
    ///
    /// Calling it while not monitoring does nothing.
    pub async fn stop_monitoring(&mut self) {
        let Some(Running { watch, mut event_loop }) = self.running.take() else {
            debug!("Monitoring not active");
            return;
        };

        watch.stop();
        let drain = Duration::from_millis(self.shared.config.debounce_ms.saturating_mul(2) + 500);
        if tokio::time::timeout(drain, &mut event_loop).await.is_err() {
            debug!("Event loop did not drain in {:?}, aborting", drain);
            event_loop.abort();
        }

        self.shared.monitoring.store(false, Ordering::SeqCst);
        self.flush_session().await;
        info!("File operation monitoring stopped");
    }

    /// Consume debounced events until the channel closes
    pub(crate) fn spawn_event_loop(
        &self,
        mut events: mpsc::UnboundedReceiver<RawEvent>,
        watch: Option<WatchHandle>,
    ) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(operation) = shared.classifier.classify(&event) else {
                    trace!("Ignoring {:?} event for {:?}", event.kind, event.path);
                    continue;
                };

                if operation.operation_type == OperationType::Create && operation.path.is_dir() {
                    if let Some(watch) = &watch {
                        let added = watch.add_directory_tree(&operation.path);
                        debug!("New directory {:?}, {} registration(s) added", operation.path, added);
                    }
                }

                shared.record(operation);
            }
            debug!("Event loop finished");
        })
    }

    /// Record an operation observed by some other means
    pub fn record_operation(&self, operation: Operation) {
        self.shared.record(operation);
    }

    /// Analyze a batch of files produced programmatically.
    ///
    /// The files are recorded as creates in the history, where the next
    /// operation pass sees them, and their contents are analyzed immediately
    /// as one session independent of the watcher's open session. Returns the
    /// lessons from that session.
    pub async fn record_code_generation_session(
        &self,
        files: Vec<GeneratedFile>,
        context: Option<GenerationContext>,
    ) -> Vec<Lesson> {
        let max_bytes = self.shared.config.max_file_bytes;
        let files: Vec<SessionFile> = files
            .into_iter()
            .map(|file| SessionFile::from_generated(file, &self.shared.classifier, max_bytes))
            .collect();
        let operations: Vec<Operation> = files.iter().map(|file| Operation::create(&file.path)).collect();

        if !operations.is_empty() {
            {
                let mut state = self.shared.state();
                for operation in &operations {
                    state.push_history(operation.clone());
                }
            }
            self.shared.restart_timer(
                &self.shared.operation_timer,
                self.shared.config.operation_window_ms,
                Shared::operations_quiet,
            );
        }

        match GenerationSession::from_operations(operations, files, context) {
            Some(session) => self.shared.analyze_session(session).await,
            None => Vec::new(),
        }
    }

    /// Analyze pending operations and close the open generation session now
    /// instead of waiting for their windows. Returns the lessons produced.
    pub async fn flush_session(&self) -> Vec<Lesson> {
        self.shared.cancel_timers();
        let (window, creates) = {
            let mut state = self.shared.state();
            (state.take_operation_window(), state.aggregator.take())
        };

        let mut lessons = Vec::new();
        if !window.is_empty() {
            lessons.extend(self.shared.analyze_operations(window).await);
        }
        if !creates.is_empty() {
            lessons.extend(self.shared.close_session(creates).await);
        }
        lessons
    }

    pub fn get_statistics(&self) -> MonitorStatistics {
        let state = self.shared.state();
        let mut stats = state.stats.clone();
        stats.history_len = state.history.len();
        stats.average_session_size = if stats.sessions_finalized == 0 {
            0.0
        } else {
            stats.session_files as f64 / stats.sessions_finalized as f64
        };
        stats.monitoring = self.shared.monitoring.load(Ordering::SeqCst);
        stats
    }

    /// The last `count` recorded operations, oldest first
    pub fn recent_operations(&self, count: usize) -> Vec<Operation> {
        self.shared.state().history.recent(count)
    }

    /// Creates waiting for the current session to close
    pub fn pending_session_operations(&self) -> usize {
        self.shared.state().aggregator.pending()
    }
}

impl Drop for FileOperationMonitor {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.watch.stop();
            running.event_loop.abort();
        }
        self.shared.cancel_timers();
    }
}
