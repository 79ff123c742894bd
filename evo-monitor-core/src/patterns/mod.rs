//! Pattern detection over operation windows and generation sessions
//!
//! Detectors are independent and pure: each sees a [`DetectionWindow`] and
//! returns an optional confidence-scored [`PatternMatch`]. The
//! [`DetectorRegistry`] runs all of them, logs failures individually and
//! keeps going.

pub mod generation;
pub mod operations;

pub use generation::{
    ArchitectureDetector, CodeStructureDetector, ImportStyleDetector, NamingConventionsDetector,
    StyleConsistencyDetector, SuccessHeuristicsDetector,
};
pub use operations::{
    BulkOperationDetector, LearningOpportunityDetector, NamingQualityDetector, RefinementLoopDetector,
};

use crate::monitor::{FileCategory, MonitorConfig, Operation, OperationType};
use crate::session::SessionFile;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Every kind of pattern the pipeline can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    BulkOperation,
    RefinementLoop,
    NamingQuality,
    LearningOpportunity,
    CodeStructure,
    ImportStyle,
    NamingConventions,
    Architecture,
    StyleConsistency,
    SuccessHeuristics,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::BulkOperation => "bulk_operation",
            PatternType::RefinementLoop => "refinement_loop",
            PatternType::NamingQuality => "naming_quality",
            PatternType::LearningOpportunity => "learning_opportunity",
            PatternType::CodeStructure => "code_structure",
            PatternType::ImportStyle => "import_style",
            PatternType::NamingConventions => "naming_conventions",
            PatternType::Architecture => "architecture",
            PatternType::StyleConsistency => "style_consistency",
            PatternType::SuccessHeuristics => "success_heuristics",
        }
    }
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations on one path that look like iterative rework
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementSequence {
    pub path: PathBuf,
    pub sequence: Vec<OperationType>,
}

/// Agreement on one formatting dimension across files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleScore {
    pub dominant: String,
    pub consistency: f64,
    pub observations: usize,
}

/// Structured findings, one variant per detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternFindings {
    BulkOperation {
        operation_type: OperationType,
        count: usize,
        threshold: usize,
    },
    RefinementLoop {
        sequences: Vec<RefinementSequence>,
    },
    NamingQuality {
        verbose: Vec<String>,
        unclear: Vec<String>,
        good: Vec<String>,
        good_min: usize,
        good_max: usize,
    },
    LearningOpportunity {
        abandoned: Vec<PathBuf>,
    },
    CodeStructure {
        categories: BTreeMap<FileCategory, usize>,
        directories: usize,
        has_tests: bool,
        has_docs: bool,
        has_config: bool,
    },
    ImportStyle {
        es_modules: usize,
        commonjs: usize,
        rust_use: usize,
        dominant: String,
        consistency: f64,
    },
    NamingConventions {
        counts: BTreeMap<String, usize>,
        dominant: String,
        consistency: f64,
    },
    Architecture {
        layers: Vec<String>,
    },
    StyleConsistency {
        quotes: Option<StyleScore>,
        semicolons: Option<StyleScore>,
        braces: Option<StyleScore>,
    },
    SuccessHeuristics {
        implementation_files: usize,
        test_files: usize,
        documentation_files: usize,
    },
}

impl PatternFindings {
    pub fn pattern_type(&self) -> PatternType {
        match self {
            PatternFindings::BulkOperation { .. } => PatternType::BulkOperation,
            PatternFindings::RefinementLoop { .. } => PatternType::RefinementLoop,
            PatternFindings::NamingQuality { .. } => PatternType::NamingQuality,
            PatternFindings::LearningOpportunity { .. } => PatternType::LearningOpportunity,
            PatternFindings::CodeStructure { .. } => PatternType::CodeStructure,
            PatternFindings::ImportStyle { .. } => PatternType::ImportStyle,
            PatternFindings::NamingConventions { .. } => PatternType::NamingConventions,
            PatternFindings::Architecture { .. } => PatternType::Architecture,
            PatternFindings::StyleConsistency { .. } => PatternType::StyleConsistency,
            PatternFindings::SuccessHeuristics { .. } => PatternType::SuccessHeuristics,
        }
    }
}

/// Result of one detector run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub confidence: f64,
    pub insights: Vec<String>,
    pub findings: PatternFindings,
}

impl PatternMatch {
    pub fn new(confidence: f64, findings: PatternFindings) -> Self {
        Self { confidence: confidence.clamp(0.0, 1.0), insights: Vec::new(), findings }
    }

    pub fn with_insight(mut self, insight: impl Into<String>) -> Self {
        self.insights.push(insight.into());
        self
    }

    pub fn pattern_type(&self) -> PatternType {
        self.findings.pattern_type()
    }
}

/// The input a detection pass sees
#[derive(Debug, Clone, Copy)]
pub struct DetectionWindow<'a> {
    pub operations: &'a [Operation],
    pub files: &'a [SessionFile],
}

impl<'a> DetectionWindow<'a> {
    pub fn operations(operations: &'a [Operation]) -> Self {
        Self { operations, files: &[] }
    }

    pub fn files(files: &'a [SessionFile]) -> Self {
        Self { operations: &[], files }
    }
}

/// A pure function from a window to an optional finding
pub trait PatternDetector: Send + Sync {
    /// Registry key; registering a second detector with the same name replaces the first
    fn name(&self) -> &'static str;

    /// Matches below this confidence are dropped
    fn min_confidence(&self) -> f64 {
        0.6
    }

    fn detect(&self, window: &DetectionWindow<'_>) -> anyhow::Result<Option<PatternMatch>>;
}

/// Outcome of running every registered detector over one window
#[derive(Debug, Default)]
pub struct DetectionReport {
    pub matches: Vec<PatternMatch>,
    pub failures: usize,
}

/// Fixed set of detectors, built once and injected into the monitor
#[derive(Default)]
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn PatternDetector>>,
}

impl DetectorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in detectors configured from `config`
    pub fn with_defaults(config: &MonitorConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(BulkOperationDetector::new(config.bulk_operation_threshold)));
        registry.register(Box::new(RefinementLoopDetector));
        registry.register(Box::new(NamingQualityDetector::new(
            config.verbose_name_length,
            config.good_name_min..=config.good_name_max,
        )));
        registry.register(Box::new(LearningOpportunityDetector));
        registry.register(Box::new(CodeStructureDetector));
        registry.register(Box::new(ImportStyleDetector));
        registry.register(Box::new(NamingConventionsDetector));
        registry.register(Box::new(ArchitectureDetector));
        registry.register(Box::new(StyleConsistencyDetector));
        registry.register(Box::new(SuccessHeuristicsDetector));
        registry
    }

    pub fn register(&mut self, detector: Box<dyn PatternDetector>) {
        if let Some(existing) = self.detectors.iter_mut().find(|d| d.name() == detector.name()) {
            debug!("Replacing detector {}", detector.name());
            *existing = detector;
        } else {
            self.detectors.push(detector);
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every detector over `window`.
    ///
    /// A detector that errors or panics is logged and counted; the others
    /// still run.
    pub fn detect_all(&self, window: &DetectionWindow<'_>) -> DetectionReport {
        let mut report = DetectionReport::default();

        for detector in &self.detectors {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(window))) {
                Ok(outcome) => outcome,
                Err(payload) => Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref()))),
            };
            match outcome {
                Ok(Some(found)) if found.confidence >= detector.min_confidence() => {
                    debug!("{} matched with confidence {:.2}", detector.name(), found.confidence);
                    report.matches.push(found);
                }
                Ok(Some(found)) => {
                    debug!(
                        "{} below threshold ({:.2} < {:.2}), discarded",
                        detector.name(),
                        found.confidence,
                        detector.min_confidence()
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Detector {} failed: {:#}", detector.name(), e);
                    report.failures += 1;
                }
            }
        }

        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Fraction of observations that agree with the most common value, with the value.
/// Ties go to the first key in order.
pub(crate) fn consistency<K: Clone + Ord>(counts: &BTreeMap<K, usize>) -> Option<(K, f64)> {
    let total: usize = counts.values().sum();
    if total == 0 {
        return None;
    }
    let (key, best) = counts
        .iter()
        .fold(None::<(&K, usize)>, |best, (key, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((key, count)),
        })?;
    Some((key.clone(), best as f64 / total as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    struct FaultyDetector;

    impl PatternDetector for FaultyDetector {
        fn name(&self) -> &'static str {
            "faulty"
        }

        fn detect(&self, _window: &DetectionWindow<'_>) -> anyhow::Result<Option<PatternMatch>> {
            bail!("detector exploded")
        }
    }

    struct PanickingDetector;

    impl PatternDetector for PanickingDetector {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn detect(&self, window: &DetectionWindow<'_>) -> anyhow::Result<Option<PatternMatch>> {
            let first = &window.files[0];
            Ok(Some(PatternMatch::new(1.0, PatternFindings::Architecture {
                layers: vec![first.path.display().to_string()],
            })))
        }
    }

    struct FixedDetector(f64);

    impl PatternDetector for FixedDetector {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn min_confidence(&self) -> f64 {
            0.7
        }

        fn detect(&self, _window: &DetectionWindow<'_>) -> anyhow::Result<Option<PatternMatch>> {
            Ok(Some(PatternMatch::new(
                self.0,
                PatternFindings::Architecture { layers: vec!["services".into(), "models".into()] },
            )))
        }
    }

    fn creates(count: usize) -> Vec<Operation> {
        (1..=count).map(|i| Operation::create(format!("a{i}.js"))).collect()
    }

    #[test]
    fn test_faulty_detector_does_not_stop_siblings() {
        let mut registry = DetectorRegistry::new();
        registry.register(Box::new(FaultyDetector));
        registry.register(Box::new(BulkOperationDetector::new(10)));
        registry.register(Box::new(FixedDetector(0.9)));

        let ops = creates(12);
        let report = registry.detect_all(&DetectionWindow::operations(&ops));

        assert_eq!(report.failures, 1);
        let types: Vec<PatternType> = report.matches.iter().map(|m| m.pattern_type()).collect();
        assert_eq!(types, vec![PatternType::BulkOperation, PatternType::Architecture]);
    }

    #[test]
    fn test_panicking_detector_does_not_stop_siblings() {
        let mut registry = DetectorRegistry::new();
        registry.register(Box::new(BulkOperationDetector::new(10)));
        registry.register(Box::new(PanickingDetector));
        registry.register(Box::new(FixedDetector(0.9)));

        let ops = creates(12);
        let report = registry.detect_all(&DetectionWindow::operations(&ops));

        assert_eq!(report.failures, 1);
        let types: Vec<PatternType> = report.matches.iter().map(|m| m.pattern_type()).collect();
        assert_eq!(types, vec![PatternType::BulkOperation, PatternType::Architecture]);
    }

    #[test]
    fn test_low_confidence_matches_are_discarded() {
        let mut registry = DetectorRegistry::new();
        registry.register(Box::new(FixedDetector(0.65)));

        let report = registry.detect_all(&DetectionWindow::operations(&[]));
        assert!(report.matches.is_empty());
        assert_eq!(report.failures, 0);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = DetectorRegistry::new();
        registry.register(Box::new(FixedDetector(0.65)));
        registry.register(Box::new(FixedDetector(0.95)));

        assert_eq!(registry.len(), 1);
        let report = registry.detect_all(&DetectionWindow::operations(&[]));
        assert_eq!(report.matches.len(), 1);
    }

    #[test]
    fn test_default_registry_has_every_detector() {
        let registry = DetectorRegistry::with_defaults(&MonitorConfig::default());
        assert_eq!(registry.len(), 10);
        assert!(registry.names().contains(&"bulk_operation"));
        assert!(registry.names().contains(&"style_consistency"));
    }

    #[test]
    fn test_consistency_is_mode_over_total() {
        let mut counts = BTreeMap::new();
        counts.insert("single", 3);
        counts.insert("double", 1);
        assert_eq!(consistency(&counts), Some(("single", 0.75)));

        let mut lone = BTreeMap::new();
        lone.insert("snake_case", 1);
        assert_eq!(consistency(&lone), Some(("snake_case", 1.0)));

        assert_eq!(consistency::<&str>(&BTreeMap::new()), None);
    }
}
