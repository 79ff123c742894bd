//! End-to-end tests of the monitoring pipeline

use crate::lessons::Lesson;
use crate::monitor::{Debouncer, DebouncerConfig, MonitorConfig, MonitorError, Operation, RawEvent, RawEventKind};
use crate::patterns::{DetectorRegistry, PatternType};
use crate::pipeline::FileOperationMonitor;
use crate::session::{GeneratedFile, GenerationContext};
use crate::sink::LearningSink;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct CollectingSink {
    lessons: Mutex<Vec<Lesson>>,
    fail: bool,
}

impl CollectingSink {
    fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    fn lessons(&self) -> Vec<Lesson> {
        self.lessons.lock().unwrap().clone()
    }
}

#[async_trait]
impl LearningSink for CollectingSink {
    async fn capture_learning(&self, lesson: &Lesson) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("journal is read-only");
        }
        self.lessons.lock().unwrap().push(lesson.clone());
        Ok(())
    }
}

fn monitor_with(config: MonitorConfig, sink: Arc<CollectingSink>) -> FileOperationMonitor {
    let registry = Arc::new(DetectorRegistry::with_defaults(&config));
    FileOperationMonitor::new(config, registry, sink)
}

#[tokio::test(start_paused = true)]
async fn test_session_closes_after_quiet_window() {
    let sink = Arc::new(CollectingSink::default());
    let monitor = monitor_with(MonitorConfig::default(), sink.clone());

    monitor.record_operation(Operation::create("first.js"));
    tokio::time::sleep(Duration::from_secs(10)).await;
    monitor.record_operation(Operation::create("second.js"));
    tokio::time::sleep(Duration::from_secs(55)).await;
    monitor.record_operation(Operation::create("third.js"));

    // 124s: still inside the window restarted at 65s
    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(monitor.get_statistics().sessions_finalized, 0);
    assert_eq!(monitor.pending_session_operations(), 3);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let stats = monitor.get_statistics();
    assert_eq!(stats.sessions_finalized, 1);
    assert_eq!(stats.session_files, 3);
    assert_eq!(stats.average_session_size, 3.0);
    assert_eq!(monitor.pending_session_operations(), 0);
    assert!(sink.lessons().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_bulk_creation_yields_one_high_impact_lesson() {
    let sink = Arc::new(CollectingSink::default());
    let monitor = monitor_with(MonitorConfig::default(), sink.clone());

    for i in 1..=12 {
        monitor.record_operation(Operation::create(format!("a{i}.js")));
        tokio::time::sleep(Duration::from_millis(400)).await;
    }
    tokio::time::sleep(Duration::from_secs(61)).await;

    let lessons = sink.lessons();
    assert_eq!(lessons.len(), 1);
    assert_eq!(lessons[0].pattern_type, PatternType::BulkOperation);
    assert!(lessons[0].impact.contains("High"));

    let stats = monitor.get_statistics();
    assert_eq!(stats.creates, 12);
    assert_eq!(stats.operation_windows_analyzed, 1);
    assert_eq!(stats.patterns_detected, 1);
    assert_eq!(stats.lessons_captured, 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_creates_do_not_open_a_session() {
    let sink = Arc::new(CollectingSink::default());
    let monitor = monitor_with(MonitorConfig::default(), sink.clone());

    monitor.record_operation(Operation::modify("a.js"));
    monitor.record_operation(Operation::delete("b.js"));
    tokio::time::sleep(Duration::from_secs(120)).await;

    let stats = monitor.get_statistics();
    assert_eq!(stats.total_operations, 2);
    assert_eq!(stats.modifies, 1);
    assert_eq!(stats.deletes, 1);
    assert_eq!(stats.sessions_finalized, 0);
    assert_eq!(stats.operation_windows_analyzed, 1);
    assert!(sink.lessons().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_recent_history_yields_operation_lessons() {
    let sink = Arc::new(CollectingSink::default());
    let monitor = monitor_with(MonitorConfig::default(), sink.clone());

    monitor.record_operation(Operation::create("attempt.js"));
    monitor.record_operation(Operation::modify("attempt.js"));
    monitor.record_operation(Operation::delete("attempt.js"));
    monitor.record_operation(Operation::rename("draft.md", "meeting-notes-2024-03-18.md"));
    monitor.record_operation(Operation::rename("notes.md", "meeting-notes-2024-03-18.md"));
    for i in 0..12 {
        monitor.record_operation(Operation::delete(format!("stale{i}.js")));
    }
    tokio::time::sleep(Duration::from_secs(120)).await;

    let lessons = sink.lessons();
    let types: Vec<PatternType> = lessons.iter().map(|l| l.pattern_type).collect();
    assert!(types.contains(&PatternType::RefinementLoop));
    assert!(types.contains(&PatternType::LearningOpportunity));
    assert!(types.contains(&PatternType::NamingQuality));
    assert!(types.contains(&PatternType::BulkOperation));

    let bulk = lessons.iter().find(|l| l.pattern_type == PatternType::BulkOperation).unwrap();
    assert!(bulk.question.contains("13 delete"));
    let naming = lessons.iter().find(|l| l.pattern_type == PatternType::NamingQuality).unwrap();
    assert!(naming.insight.contains("2 unclear"));

    let stats = monitor.get_statistics();
    assert_eq!(stats.operation_windows_analyzed, 1);
    assert_eq!(stats.sessions_finalized, 1);
}

#[tokio::test(start_paused = true)]
async fn test_bulk_deletes_are_analyzed_once() {
    let sink = Arc::new(CollectingSink::default());
    let monitor = monitor_with(MonitorConfig::default(), sink.clone());

    for i in 0..10 {
        monitor.record_operation(Operation::delete(format!("old/report{i}.md")));
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    tokio::time::sleep(Duration::from_secs(58)).await;
    assert!(sink.lessons().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let lessons = sink.lessons();
    assert_eq!(lessons.len(), 1);
    assert_eq!(lessons[0].pattern_type, PatternType::BulkOperation);
    assert!(lessons[0].question.contains("10 delete"));

    // Later windows only see what was recorded after the previous pass
    monitor.record_operation(Operation::modify("old/index.md"));
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(sink.lessons().len(), 1);

    let stats = monitor.get_statistics();
    assert_eq!(stats.operation_windows_analyzed, 2);
    assert_eq!(stats.sessions_finalized, 0);
}

#[tokio::test(start_paused = true)]
async fn test_flush_analyzes_pending_operations() {
    let sink = Arc::new(CollectingSink::default());
    let monitor = monitor_with(MonitorConfig::default(), sink.clone());

    monitor.record_operation(Operation::create("scratch.js"));
    monitor.record_operation(Operation::delete("scratch.js"));
    let lessons = monitor.flush_session().await;

    assert!(lessons.iter().any(|l| l.pattern_type == PatternType::LearningOpportunity));
    assert_eq!(sink.lessons().len(), lessons.len());

    // Nothing is left for the timers once flushed
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(sink.lessons().len(), lessons.len());
    assert_eq!(monitor.get_statistics().operation_windows_analyzed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_debounced_changes_record_one_modify() {
    let sink = Arc::new(CollectingSink::default());
    let monitor = monitor_with(MonitorConfig::default(), sink);

    let (input, output) = Debouncer::new(DebouncerConfig { delay_ms: 100, ..Default::default() }).start();
    let event_loop = monitor.spawn_event_loop(output, None);

    for _ in 0..5 {
        input.send(RawEvent::new(RawEventKind::Change, "src/app.js")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    input.send(RawEvent::new(RawEventKind::Other, "src/app.js")).unwrap();
    drop(input);
    event_loop.await.unwrap();

    let stats = monitor.get_statistics();
    assert_eq!(stats.total_operations, 1);
    assert_eq!(stats.modifies, 1);
    assert_eq!(monitor.recent_operations(10)[0].path, PathBuf::from("src/app.js"));
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_is_counted() {
    let sink = Arc::new(CollectingSink::failing());
    let monitor = monitor_with(MonitorConfig::default(), sink);

    for i in 0..12 {
        monitor.record_operation(Operation::create(format!("batch{i}.js")));
    }
    let lessons = monitor.flush_session().await;

    assert_eq!(lessons.len(), 1);
    let stats = monitor.get_statistics();
    assert_eq!(stats.sink_failures, 1);
    assert_eq!(stats.lessons_captured, 0);
    assert_eq!(stats.sessions_finalized, 1);

    // The monitor keeps working after the failure
    monitor.record_operation(Operation::modify("batch0.js"));
    assert_eq!(monitor.get_statistics().total_operations, 13);
}

#[tokio::test]
async fn test_flush_with_nothing_pending() {
    let monitor = monitor_with(MonitorConfig::default(), Arc::new(CollectingSink::default()));
    assert!(monitor.flush_session().await.is_empty());
    assert_eq!(monitor.get_statistics().sessions_finalized, 0);
}

#[tokio::test]
async fn test_recorded_generation_session_is_analyzed_immediately() {
    let sink = Arc::new(CollectingSink::default());
    let monitor = monitor_with(MonitorConfig::default(), sink.clone());

    let files = vec![
        GeneratedFile::new("src/models/user.js", "import db from '../db';\nexport const user = 'u';\n"),
        GeneratedFile::new("src/services/user-service.js", "import { user } from '../models/user';\n"),
        GeneratedFile::new("src/models/user.test.js", "import { user } from './user';\n"),
        GeneratedFile::new("README.md", "# Users\n"),
    ];
    let context = GenerationContext { description: Some("user module".into()), source: None };
    let lessons = monitor.record_code_generation_session(files, Some(context)).await;

    let types: Vec<PatternType> = lessons.iter().map(|l| l.pattern_type).collect();
    assert!(types.contains(&PatternType::CodeStructure));
    assert!(types.contains(&PatternType::Architecture));
    assert!(types.contains(&PatternType::ImportStyle));
    assert!(types.contains(&PatternType::SuccessHeuristics));
    assert!(!types.contains(&PatternType::BulkOperation));
    assert_eq!(sink.lessons().len(), lessons.len());

    let stats = monitor.get_statistics();
    assert_eq!(stats.creates, 4);
    assert_eq!(stats.history_len, 4);
    assert_eq!(monitor.pending_session_operations(), 0);
}

#[tokio::test]
async fn test_missing_root_fails_to_start() {
    let config = MonitorConfig { root: PathBuf::from("/definitely/not/here"), ..Default::default() };
    let mut monitor = monitor_with(config, Arc::new(CollectingSink::default()));

    assert!(matches!(monitor.start_monitoring(), Err(MonitorError::RootNotFound(_))));
    assert!(!monitor.is_monitoring());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_records_operations_on_disk() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = TempDir::new().unwrap();
    let config = MonitorConfig {
        root: dir.path().to_path_buf(),
        debounce_ms: 50,
        operation_window_ms: 200,
        generation_session_window_ms: 200,
        ..Default::default()
    };
    let sink = Arc::new(CollectingSink::default());
    let mut monitor = monitor_with(config, sink);

    monitor.start_monitoring().unwrap();
    monitor.start_monitoring().unwrap();
    assert!(monitor.get_statistics().monitoring);

    std::fs::create_dir(dir.path().join("models")).unwrap();
    wait_for(&monitor, |ops| ops.iter().any(|op| op.path.ends_with("models"))).await;

    std::fs::write(dir.path().join("models/user.js"), "export const user = 1;\n").unwrap();
    std::fs::create_dir(dir.path().join("node_modules")).unwrap();
    std::fs::write(dir.path().join("node_modules/dep.js"), "").unwrap();
    wait_for(&monitor, |ops| ops.iter().any(|op| op.path.ends_with("models/user.js"))).await;

    monitor.stop_monitoring().await;
    monitor.stop_monitoring().await;

    let stats = monitor.get_statistics();
    assert!(!stats.monitoring);
    assert!(stats.sessions_finalized >= 1);
    assert!(monitor.recent_operations(100).iter().all(|op| !op.path.ends_with("node_modules/dep.js")));
}

async fn wait_for(monitor: &FileOperationMonitor, seen: impl Fn(&[Operation]) -> bool) {
    for _ in 0..100 {
        if seen(&monitor.recent_operations(100)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("operation not observed: {:?}", monitor.recent_operations(100));
}
