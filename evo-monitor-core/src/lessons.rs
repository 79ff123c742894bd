//! Turning detected patterns into human-readable lessons

use crate::patterns::{PatternFindings, PatternMatch, PatternType, StyleScore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A templated record derived from exactly one pattern match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub confidence: f64,
    pub question: String,
    pub insight: String,
    pub impact: String,
    pub learning: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

fn impact_level(confidence: f64) -> &'static str {
    if confidence >= 0.9 {
        "High"
    } else if confidence >= 0.75 {
        "Medium"
    } else {
        "Low"
    }
}

fn percent(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}

fn describe_score(dimension: &str, score: &Option<StyleScore>) -> Option<String> {
    score.as_ref().map(|s| {
        format!("{dimension}: {} ({} consistent across {} file(s))", s.dominant, percent(s.consistency), s.observations)
    })
}

/// Build the lesson for a match. Every finding kind has its own template.
pub fn match_to_lesson(found: &PatternMatch) -> Lesson {
    let level = impact_level(found.confidence);
    let summary = found.insights.first().cloned().unwrap_or_default();

    let (question, insight, impact, mut learning) = match &found.findings {
        PatternFindings::BulkOperation { operation_type, count, threshold } => (
            format!("Why were {count} {operation_type} operations performed at once?"),
            format!(
                "A batch of {count} {operation_type} operations crossed the bulk threshold of {threshold}, \
                 which points to one logical change applied across many files."
            ),
            "High - batch changes touch many files at once and need a matching review strategy".to_string(),
            vec![
                "Group related file operations into one reviewable change".to_string(),
                "Confirm every file in the batch follows the same template".to_string(),
                format!("Watch for batches larger than {threshold} files as candidates for automation"),
            ],
        ),
        PatternFindings::RefinementLoop { sequences } => (
            "Why did these files need several passes?".to_string(),
            format!("{} file(s) were created and then reworked inside one window.", sequences.len()),
            format!("{level} - repeated edits suggest the first attempt missed requirements"),
            vec![
                "Clarify the target shape of a file before creating it".to_string(),
                "Treat create-then-modify loops as a signal to plan more up front".to_string(),
            ],
        ),
        PatternFindings::NamingQuality { verbose, unclear, good, good_min, good_max } => (
            "Do the chosen file names describe their contents?".to_string(),
            format!(
                "Renamed files: {} verbose, {} unclear, {} well named.",
                verbose.len(),
                unclear.len(),
                good.len()
            ),
            if verbose.is_empty() && unclear.is_empty() {
                format!("{level} - naming stays descriptive and concise")
            } else {
                format!("{level} - unclear or overlong names slow down navigation")
            },
            vec![
                format!("Keep file names between {good_min} and {good_max} characters where possible"),
                "Avoid dates and generic words like 'temp' or 'new' as the whole name".to_string(),
                "Name files after what they contain, not when they were made".to_string(),
            ],
        ),
        PatternFindings::LearningOpportunity { abandoned } => (
            "What made these files short-lived?".to_string(),
            format!("{} file(s) were created and deleted again in the same window.", abandoned.len()),
            format!("{level} - abandoned attempts cost time without leaving a trace of why"),
            vec![
                "Record why an approach was abandoned before deleting its files".to_string(),
                "Prototype in a scratch area rather than the main tree".to_string(),
            ],
        ),
        PatternFindings::CodeStructure { categories, directories, has_tests, has_docs, has_config } => (
            "How was the generated code organized?".to_string(),
            format!(
                "The session produced {} kind(s) of files across {directories} director(ies).",
                categories.len()
            ),
            format!("{level} - a deliberate layout makes generated code easier to extend"),
            [
                (*has_tests, "Keep tests next to the code they cover"),
                (*has_docs, "Ship documentation in the same change as the code"),
                (*has_config, "Keep configuration changes reviewable alongside code"),
            ]
            .into_iter()
            .filter(|(present, _)| *present)
            .map(|(_, advice)| advice.to_string())
            .chain(std::iter::once("Separate concerns into dedicated directories".to_string()))
            .collect(),
        ),
        PatternFindings::ImportStyle { es_modules, commonjs, rust_use, dominant, consistency } => (
            "Which module system does the generated code use?".to_string(),
            format!(
                "Imports: {es_modules} ES module, {commonjs} CommonJS, {rust_use} Rust use; \
                 {dominant} accounts for {}.",
                percent(*consistency)
            ),
            if *es_modules > 0 && *commonjs > 0 {
                format!("{level} - mixing module systems complicates bundling and tooling")
            } else {
                format!("{level} - a single module system keeps imports predictable")
            },
            vec![
                format!("Prefer {dominant} imports in new files"),
                "Do not mix import and require in one codebase".to_string(),
            ],
        ),
        PatternFindings::NamingConventions { counts, dominant, consistency } => (
            "Which naming convention do generated files follow?".to_string(),
            format!("{} convention(s) seen; {dominant} covers {}.", counts.len(), percent(*consistency)),
            if counts.len() > 1 {
                format!("{level} - mixed conventions make files harder to find")
            } else {
                format!("{level} - consistent naming keeps the tree navigable")
            },
            vec![
                format!("Name new files in {dominant}"),
                "Rename outliers when touching them".to_string(),
            ],
        ),
        PatternFindings::Architecture { layers } => (
            "What architecture does the generated code imply?".to_string(),
            format!("Files were placed into {} layer(s): {}.", layers.len(), layers.join(", ")),
            format!("{level} - layering decides where future code belongs"),
            vec![
                "Keep each layer's responsibility narrow".to_string(),
                "Add new code to the existing layer that owns the concern".to_string(),
            ],
        ),
        PatternFindings::StyleConsistency { quotes, semicolons, braces } => {
            let described: Vec<String> = [
                describe_score("quotes", quotes),
                describe_score("semicolons", semicolons),
                describe_score("braces", braces),
            ]
            .into_iter()
            .flatten()
            .collect();
            let weakest = [quotes, semicolons, braces]
                .into_iter()
                .flatten()
                .map(|s| s.consistency)
                .fold(1.0_f64, f64::min);
            (
                "Is the generated code formatted consistently?".to_string(),
                format!("Style across files: {}.", described.join("; ")),
                if weakest < 1.0 {
                    format!("{level} - inconsistent formatting adds noise to reviews")
                } else {
                    format!("{level} - formatting is uniform across the session")
                },
                vec![
                    "Run a formatter as part of generation".to_string(),
                    "Match the dominant style of the surrounding files".to_string(),
                ],
            )
        }
        PatternFindings::SuccessHeuristics { implementation_files, test_files, documentation_files } => (
            "What made this generation session complete?".to_string(),
            format!(
                "{implementation_files} implementation file(s) came with {test_files} test(s) \
                 and {documentation_files} documentation file(s)."
            ),
            format!("{level} - code delivered with tests and docs needs less follow-up"),
            vec![
                "Write tests in the same session as the implementation".to_string(),
                "Document public behavior while it is fresh".to_string(),
            ],
        ),
    };

    if !summary.is_empty() {
        learning.push(format!("Observed: {summary}"));
    }

    Lesson {
        id: Uuid::new_v4(),
        pattern_type: found.pattern_type(),
        confidence: found.confidence,
        question,
        insight,
        impact,
        learning,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::OperationType;
    use std::collections::BTreeMap;

    #[test]
    fn test_bulk_lesson_is_high_impact() {
        let found = PatternMatch::new(
            1.0,
            PatternFindings::BulkOperation { operation_type: OperationType::Create, count: 12, threshold: 10 },
        )
        .with_insight("12 create operations in a single window");

        let lesson = match_to_lesson(&found);
        assert_eq!(lesson.pattern_type, PatternType::BulkOperation);
        assert!(lesson.impact.contains("High"));
        assert!(lesson.question.contains("12 create"));
        assert_eq!(lesson.learning.last().unwrap(), "Observed: 12 create operations in a single window");
    }

    #[test]
    fn test_impact_follows_confidence() {
        let medium = PatternMatch::new(0.8, PatternFindings::Architecture { layers: vec!["api".into()] });
        assert!(match_to_lesson(&medium).impact.starts_with("Medium"));

        let low = PatternMatch::new(0.7, PatternFindings::LearningOpportunity { abandoned: vec![] });
        assert!(match_to_lesson(&low).impact.starts_with("Low"));
    }

    #[test]
    fn test_lesson_serializes_type_name() {
        let found = PatternMatch::new(0.75, PatternFindings::NamingConventions {
            counts: BTreeMap::from([("kebab-case".to_string(), 3)]),
            dominant: "kebab-case".into(),
            consistency: 1.0,
        });

        let json = serde_json::to_value(match_to_lesson(&found)).unwrap();
        assert_eq!(json["type"], "naming_conventions");
        assert!(json["learning"].as_array().unwrap().iter().any(|l| l == "Name new files in kebab-case"));
    }

    #[test]
    fn test_style_lesson_flags_inconsistency() {
        let found = PatternMatch::new(0.8, PatternFindings::StyleConsistency {
            quotes: Some(StyleScore { dominant: "single".into(), consistency: 0.5, observations: 4 }),
            semicolons: None,
            braces: None,
        });

        let lesson = match_to_lesson(&found);
        assert!(lesson.insight.contains("quotes: single (50% consistent across 4 file(s))"));
        assert!(lesson.impact.contains("inconsistent"));
    }

    #[test]
    fn test_naming_lesson_uses_configured_range() {
        let found = PatternMatch::new(0.7, PatternFindings::NamingQuality {
            verbose: vec![],
            unclear: vec![],
            good: vec!["order-history-service.js".into()],
            good_min: 12,
            good_max: 40,
        });

        let lesson = match_to_lesson(&found);
        assert!(lesson.learning.iter().any(|l| l == "Keep file names between 12 and 40 characters where possible"));
        assert!(lesson.learning.iter().all(|l| !l.contains("between 20 and 60")));
    }

    #[test]
    fn test_empty_insights_add_nothing() {
        let found = PatternMatch::new(0.85, PatternFindings::SuccessHeuristics {
            implementation_files: 2,
            test_files: 1,
            documentation_files: 0,
        });

        let lesson = match_to_lesson(&found);
        assert_eq!(lesson.learning.len(), 2);
        assert!(lesson.insight.starts_with("2 implementation file(s)"));
    }
}
