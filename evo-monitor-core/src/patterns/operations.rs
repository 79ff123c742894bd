//! Detectors over recorded file operations

use super::{DetectionWindow, PatternDetector, PatternFindings, PatternMatch, RefinementSequence};
use crate::monitor::OperationType;
use regex_utils::naming;
use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use std::path::PathBuf;

/// Many operations of a single type in one window
pub struct BulkOperationDetector {
    threshold: usize,
}

impl BulkOperationDetector {
    pub fn new(threshold: usize) -> Self {
        Self { threshold: threshold.max(1) }
    }
}

impl PatternDetector for BulkOperationDetector {
    fn name(&self) -> &'static str {
        "bulk_operation"
    }

    fn min_confidence(&self) -> f64 {
        0.7
    }

    fn detect(&self, window: &DetectionWindow<'_>) -> anyhow::Result<Option<PatternMatch>> {
        let mut counts: HashMap<OperationType, usize> = HashMap::new();
        for op in window.operations {
            *counts.entry(op.operation_type).or_default() += 1;
        }

        // Fixed order keeps ties deterministic
        let largest = [
            OperationType::Create,
            OperationType::Modify,
            OperationType::Delete,
            OperationType::Rename,
        ]
        .into_iter()
        .filter_map(|t| counts.get(&t).map(|&count| (t, count)))
        .fold(None::<(OperationType, usize)>, |best, candidate| match best {
            Some(b) if b.1 >= candidate.1 => Some(b),
            _ => Some(candidate),
        });

        let Some((operation_type, count)) = largest else {
            return Ok(None);
        };
        if count < self.threshold {
            return Ok(None);
        }

        let confidence = (count as f64 / self.threshold as f64).min(1.0);
        Ok(Some(
            PatternMatch::new(
                confidence,
                PatternFindings::BulkOperation { operation_type, count, threshold: self.threshold },
            )
            .with_insight(format!("{count} {operation_type} operations in a single window"))
            .with_insight(format!("Threshold for batch work is {}", self.threshold)),
        ))
    }
}

/// Repeated operations on the same file that suggest iterating towards a result
pub struct RefinementLoopDetector;

impl RefinementLoopDetector {
    fn is_refinement(sequence: &[OperationType]) -> bool {
        let step_pattern = sequence.windows(2).any(|pair| {
            matches!(
                (pair[0], pair[1]),
                (OperationType::Rename, OperationType::Rename) | (OperationType::Create, OperationType::Modify)
            )
        });
        if step_pattern {
            return true;
        }

        let mut per_type: HashMap<OperationType, usize> = HashMap::new();
        sequence.iter().any(|t| {
            let count = per_type.entry(*t).or_default();
            *count += 1;
            *count >= 2
        })
    }
}

impl PatternDetector for RefinementLoopDetector {
    fn name(&self) -> &'static str {
        "refinement_loop"
    }

    fn detect(&self, window: &DetectionWindow<'_>) -> anyhow::Result<Option<PatternMatch>> {
        let mut by_path: BTreeMap<&PathBuf, Vec<OperationType>> = BTreeMap::new();
        for op in window.operations {
            by_path.entry(&op.path).or_default().push(op.operation_type);
        }

        let sequences: Vec<RefinementSequence> = by_path
            .into_iter()
            .filter(|(_, sequence)| sequence.len() >= 2 && Self::is_refinement(sequence))
            .map(|(path, sequence)| RefinementSequence { path: path.clone(), sequence })
            .collect();

        if sequences.is_empty() {
            return Ok(None);
        }

        let mut found = PatternMatch::new(0.75, PatternFindings::RefinementLoop { sequences: Vec::new() })
            .with_insight(format!("{} file(s) went through repeated edits", sequences.len()));
        for refinement in &sequences {
            let steps: Vec<&str> = refinement.sequence.iter().map(|t| t.as_str()).collect();
            found = found.with_insight(format!("{}: {}", refinement.path.display(), steps.join(" -> ")));
        }
        found.findings = PatternFindings::RefinementLoop { sequences };

        Ok(Some(found))
    }
}

/// Quality of names chosen when files are renamed
pub struct NamingQualityDetector {
    verbose_length: usize,
    good_range: RangeInclusive<usize>,
}

/// Where a single file name lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameQuality {
    Verbose,
    Unclear,
    Good,
    Unremarkable,
}

impl NamingQualityDetector {
    pub fn new(verbose_length: usize, good_range: RangeInclusive<usize>) -> Self {
        Self { verbose_length, good_range }
    }

    pub fn assess(&self, name: &str) -> NameQuality {
        let length = name.chars().count();
        if length > self.verbose_length {
            NameQuality::Verbose
        } else if naming::is_unclear(name) {
            NameQuality::Unclear
        } else if self.good_range.contains(&length) {
            NameQuality::Good
        } else {
            NameQuality::Unremarkable
        }
    }
}

impl PatternDetector for NamingQualityDetector {
    fn name(&self) -> &'static str {
        "naming_quality"
    }

    fn detect(&self, window: &DetectionWindow<'_>) -> anyhow::Result<Option<PatternMatch>> {
        let (mut verbose, mut unclear, mut good) = (Vec::new(), Vec::new(), Vec::new());

        for op in window.operations.iter().filter(|op| op.operation_type == OperationType::Rename) {
            let name = op.file_name();
            match self.assess(&name) {
                NameQuality::Verbose => verbose.push(name),
                NameQuality::Unclear => unclear.push(name),
                NameQuality::Good => good.push(name),
                NameQuality::Unremarkable => {}
            }
        }

        if verbose.is_empty() && unclear.is_empty() && good.is_empty() {
            return Ok(None);
        }

        let confidence = if verbose.is_empty() && unclear.is_empty() { 0.7 } else { 0.8 };
        let (good_min, good_max) = (*self.good_range.start(), *self.good_range.end());
        let mut found = PatternMatch::new(confidence, PatternFindings::NamingQuality {
            verbose: Vec::new(),
            unclear: Vec::new(),
            good: Vec::new(),
            good_min,
            good_max,
        });
        if !verbose.is_empty() {
            found = found.with_insight(format!(
                "{} name(s) longer than {} characters",
                verbose.len(),
                self.verbose_length
            ));
        }
        if !unclear.is_empty() {
            found = found.with_insight(format!("{} name(s) rely on dates or generic words", unclear.len()));
        }
        if !good.is_empty() {
            found = found.with_insight(format!("{} name(s) are descriptive and concise", good.len()));
        }
        found.findings = PatternFindings::NamingQuality { verbose, unclear, good, good_min, good_max };

        Ok(Some(found))
    }
}

/// Files created and then thrown away inside the same window
pub struct LearningOpportunityDetector;

impl PatternDetector for LearningOpportunityDetector {
    fn name(&self) -> &'static str {
        "learning_opportunity"
    }

    fn min_confidence(&self) -> f64 {
        0.7
    }

    fn detect(&self, window: &DetectionWindow<'_>) -> anyhow::Result<Option<PatternMatch>> {
        let mut created: Vec<&PathBuf> = Vec::new();
        let mut abandoned: Vec<PathBuf> = Vec::new();

        for op in window.operations {
            match op.operation_type {
                OperationType::Create => created.push(&op.path),
                OperationType::Delete if created.contains(&&op.path) && !abandoned.contains(&op.path) => {
                    abandoned.push(op.path.clone());
                }
                _ => {}
            }
        }

        if abandoned.is_empty() {
            return Ok(None);
        }

        Ok(Some(
            PatternMatch::new(0.7, PatternFindings::LearningOpportunity { abandoned: abandoned.clone() })
                .with_insight(format!("{} file(s) were created and deleted again", abandoned.len())),
        ))
    }
}
