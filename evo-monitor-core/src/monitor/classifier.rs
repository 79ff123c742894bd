//! Operation classification and path-based content categories

use crate::monitor::{Operation, OperationType, RawEvent, RawEventKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::trace;

/// What kind of content a file holds, judged from its path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Test,           // *_test.rs, *.test.js, tests/*
    Documentation,  // *.md, docs/*
    Configuration,  // package.json, *.toml, *.yaml
    Implementation, // *.rs, *.js, *.py
    Other,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Test => "test",
            FileCategory::Documentation => "documentation",
            FileCategory::Configuration => "configuration",
            FileCategory::Implementation => "implementation",
            FileCategory::Other => "other",
        }
    }
}

struct Pattern {
    pattern_type: PatternType,
    value: &'static str,
}

enum PatternType {
    Extension,    // File extension match
    Filename,     // Exact filename match
    PathContains, // Path contains a directory component
    Prefix,       // Filename starts with
    Suffix,       // Filename ends with
}

const fn pattern(pattern_type: PatternType, value: &'static str) -> Pattern {
    Pattern { pattern_type, value }
}

/// Turns settled raw events into operation records and tags paths with a category
pub struct OperationClassifier {
    patterns: HashMap<FileCategory, Vec<Pattern>>,
}

impl OperationClassifier {
    /// Create a classifier with the default category patterns
    pub fn new() -> Self {
        use PatternType::*;

        let mut patterns = HashMap::new();

        patterns.insert(
            FileCategory::Test,
            vec![
                pattern(Suffix, "_test.rs"),
                pattern(Suffix, "_test.py"),
                pattern(Suffix, "_test.go"),
                pattern(Suffix, ".test.js"),
                pattern(Suffix, ".test.ts"),
                pattern(Suffix, ".spec.js"),
                pattern(Suffix, ".spec.ts"),
                pattern(Prefix, "test_"),
                pattern(PathContains, "tests"),
                pattern(PathContains, "__tests__"),
                pattern(PathContains, "test"),
            ],
        );

        patterns.insert(
            FileCategory::Documentation,
            vec![
                pattern(Extension, "md"),
                pattern(Extension, "rst"),
                pattern(Extension, "adoc"),
                pattern(PathContains, "docs"),
                pattern(PathContains, "documentation"),
                pattern(Filename, "readme"),
                pattern(Filename, "license"),
            ],
        );

        patterns.insert(
            FileCategory::Configuration,
            vec![
                pattern(Filename, "package.json"),
                pattern(Filename, "tsconfig.json"),
                pattern(Filename, "dockerfile"),
                pattern(Filename, "makefile"),
                pattern(Prefix, ".env"),
                pattern(Prefix, ".eslintrc"),
                pattern(Prefix, ".prettierrc"),
                pattern(Extension, "toml"),
                pattern(Extension, "yaml"),
                pattern(Extension, "yml"),
                pattern(Extension, "ini"),
                pattern(Extension, "cfg"),
                pattern(Extension, "json"),
            ],
        );

        patterns.insert(
            FileCategory::Implementation,
            [
                "rs", "py", "js", "mjs", "cjs", "ts", "jsx", "tsx", "go", "java", "kt", "rb", "c",
                "h", "cpp", "hpp", "cs", "swift", "php", "sh", "css", "scss", "html", "vue",
            ]
            .into_iter()
            .map(|ext| pattern(Extension, ext))
            .collect(),
        );

        Self { patterns }
    }

    /// Classify a settled raw event.
    ///
    /// A rename whose path still exists is a create (true renames and new
    /// files are indistinguishable here); one whose path is gone is a delete.
    /// Changes are always modifications. Other kinds yield `None`.
    pub fn classify(&self, event: &RawEvent) -> Option<Operation> {
        let operation_type = match event.kind {
            RawEventKind::Rename => {
                if std::fs::symlink_metadata(&event.path).is_ok() {
                    OperationType::Create
                } else {
                    OperationType::Delete
                }
            }
            RawEventKind::Change => OperationType::Modify,
            RawEventKind::Other => {
                trace!("Ignoring unrecognized event for {:?}", event.path);
                return None;
            }
        };

        Some(Operation::new(operation_type, event.path.clone()))
    }

    /// Categorize a file based on its path
    pub fn category(&self, path: &Path) -> FileCategory {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_lowercase();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        let stem = file_name.split('.').next().unwrap_or("");
        let directories: Vec<String> = path
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        // Tests win over everything, then docs and config, then code
        let priority_order = [
            FileCategory::Test,
            FileCategory::Documentation,
            FileCategory::Configuration,
            FileCategory::Implementation,
        ];

        for category in priority_order {
            let Some(patterns) = self.patterns.get(&category) else {
                continue;
            };
            for pattern in patterns {
                let matched = match pattern.pattern_type {
                    PatternType::Extension => extension == pattern.value,
                    PatternType::Filename => file_name == pattern.value || stem == pattern.value,
                    PatternType::PathContains => directories.iter().any(|d| d == pattern.value),
                    PatternType::Prefix => file_name.starts_with(pattern.value),
                    PatternType::Suffix => file_name.ends_with(pattern.value),
                };
                if matched {
                    return category;
                }
            }
        }

        FileCategory::Other
    }
}

impl Default for OperationClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rename_of_existing_path_is_create() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("fresh.js");
        std::fs::write(&file, "export default 1;").unwrap();

        let classifier = OperationClassifier::new();
        let op = classifier.classify(&RawEvent::new(RawEventKind::Rename, &file)).unwrap();

        assert_eq!(op.operation_type, OperationType::Create);
        assert_eq!(op.path, file);
    }

    #[test]
    fn test_rename_of_missing_path_is_delete() {
        let dir = TempDir::new().unwrap();
        let gone = dir.path().join("gone.js");

        let classifier = OperationClassifier::new();
        let op = classifier.classify(&RawEvent::new(RawEventKind::Rename, &gone)).unwrap();

        assert_eq!(op.operation_type, OperationType::Delete);
    }

    #[test]
    fn test_change_is_always_modify() {
        let classifier = OperationClassifier::new();
        // The path does not need to exist for a change
        let op = classifier
            .classify(&RawEvent::new(RawEventKind::Change, "/nowhere/at/all.rs"))
            .unwrap();

        assert_eq!(op.operation_type, OperationType::Modify);
    }

    #[test]
    fn test_unrecognized_kind_yields_none() {
        let classifier = OperationClassifier::new();
        assert!(classifier.classify(&RawEvent::new(RawEventKind::Other, "a.rs")).is_none());
    }

    #[test]
    fn test_categories() {
        let classifier = OperationClassifier::new();

        assert_eq!(classifier.category(Path::new("src/auth_test.rs")), FileCategory::Test);
        assert_eq!(classifier.category(Path::new("app.test.js")), FileCategory::Test);
        assert_eq!(classifier.category(Path::new("tests/integration.rs")), FileCategory::Test);
        assert_eq!(classifier.category(Path::new("README.md")), FileCategory::Documentation);
        assert_eq!(classifier.category(Path::new("docs/guide.html")), FileCategory::Documentation);
        assert_eq!(classifier.category(Path::new("package.json")), FileCategory::Configuration);
        assert_eq!(classifier.category(Path::new("Cargo.toml")), FileCategory::Configuration);
        assert_eq!(classifier.category(Path::new("src/main.rs")), FileCategory::Implementation);
        assert_eq!(classifier.category(Path::new("a1.js")), FileCategory::Implementation);
        assert_eq!(classifier.category(Path::new("logo.png")), FileCategory::Other);
    }

    #[test]
    fn test_priority_order() {
        let classifier = OperationClassifier::new();

        // A markdown file under tests/ is a test fixture, not documentation
        assert_eq!(classifier.category(Path::new("tests/fixtures/case.md")), FileCategory::Test);
        // "latest" must not match the "test" directory rule
        assert_eq!(classifier.category(Path::new("latest/app.js")), FileCategory::Implementation);
    }
}
