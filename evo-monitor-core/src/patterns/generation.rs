//! Detectors over the files of a generation session

use super::{
    DetectionWindow, PatternDetector, PatternFindings, PatternMatch, StyleScore, consistency,
};
use crate::monitor::FileCategory;
use crate::session::SessionFile;
use regex_utils::{case, imports, style};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Directory names that indicate an architectural layer
const LAYERS: &[&str] = &[
    "components", "services", "models", "controllers", "utils", "lib", "api", "routes", "handlers",
    "views", "tests", "middleware", "hooks", "store",
];

fn is_source(file: &SessionFile) -> bool {
    matches!(file.content_type, FileCategory::Implementation | FileCategory::Test)
}

fn stem(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()?.split('.').next().filter(|s| !s.is_empty())
}

fn common_ancestor<'a>(mut dirs: impl Iterator<Item = &'a Path>) -> Option<PathBuf> {
    let mut base = dirs.next()?.to_path_buf();
    for dir in dirs {
        while !dir.starts_with(&base) {
            if !base.pop() {
                break;
            }
        }
    }
    Some(base)
}

/// Spread of a session across content categories and directories
pub struct CodeStructureDetector;

impl PatternDetector for CodeStructureDetector {
    fn name(&self) -> &'static str {
        "code_structure"
    }

    fn detect(&self, window: &DetectionWindow<'_>) -> anyhow::Result<Option<PatternMatch>> {
        if window.files.len() < 2 {
            return Ok(None);
        }

        let mut categories: BTreeMap<FileCategory, usize> = BTreeMap::new();
        let mut directories = HashSet::new();
        for file in window.files {
            *categories.entry(file.content_type).or_default() += 1;
            directories.insert(file.path.parent().unwrap_or(Path::new("")));
        }

        if categories.len() < 2 && directories.len() < 2 {
            return Ok(None);
        }

        let has_tests = categories.contains_key(&FileCategory::Test);
        let has_docs = categories.contains_key(&FileCategory::Documentation);
        let has_config = categories.contains_key(&FileCategory::Configuration);

        let tally: Vec<String> =
            categories.iter().map(|(category, count)| format!("{count} {}", category.as_str())).collect();
        let mut found = PatternMatch::new(0.8, PatternFindings::CodeStructure {
            categories: categories.clone(),
            directories: directories.len(),
            has_tests,
            has_docs,
            has_config,
        })
        .with_insight(format!("Files span {} director(ies): {}", directories.len(), tally.join(", ")));

        for (present, label) in
            [(has_tests, "tests"), (has_docs, "documentation"), (has_config, "configuration")]
        {
            if present {
                found = found.with_insight(format!("Session ships {label} alongside code"));
            }
        }

        Ok(Some(found))
    }
}

/// Which module system the generated code relies on
pub struct ImportStyleDetector;

impl PatternDetector for ImportStyleDetector {
    fn name(&self) -> &'static str {
        "import_style"
    }

    fn detect(&self, window: &DetectionWindow<'_>) -> anyhow::Result<Option<PatternMatch>> {
        let (mut es_modules, mut commonjs, mut rust_use) = (0, 0, 0);
        for file in window.files.iter().filter(|f| is_source(f)) {
            let Some(content) = &file.content else { continue };
            let (es, cjs, rs) = imports::tally(content);
            es_modules += es;
            commonjs += cjs;
            rust_use += rs;
        }

        let mut counts = BTreeMap::new();
        for (label, count) in [("es_modules", es_modules), ("commonjs", commonjs), ("rust_use", rust_use)] {
            if count > 0 {
                counts.insert(label, count);
            }
        }
        let Some((dominant, score)) = consistency(&counts) else {
            return Ok(None);
        };

        let mut found = PatternMatch::new(0.75, PatternFindings::ImportStyle {
            es_modules,
            commonjs,
            rust_use,
            dominant: dominant.to_string(),
            consistency: score,
        })
        .with_insight(format!("Dominant import style is {dominant} ({:.0}% of imports)", score * 100.0));
        if es_modules > 0 && commonjs > 0 {
            found = found.with_insight(format!(
                "Mixed module systems: {es_modules} ES import(s) and {commonjs} require call(s)"
            ));
        }

        Ok(Some(found))
    }
}

/// Case conventions used for file names
pub struct NamingConventionsDetector;

impl PatternDetector for NamingConventionsDetector {
    fn name(&self) -> &'static str {
        "naming_conventions"
    }

    fn detect(&self, window: &DetectionWindow<'_>) -> anyhow::Result<Option<PatternMatch>> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for file in window.files {
            if let Some(convention) = stem(&file.path).and_then(case::classify) {
                *counts.entry(convention.as_str().to_string()).or_default() += 1;
            }
        }

        let classified: usize = counts.values().sum();
        let Some((dominant, score)) = consistency(&counts) else {
            return Ok(None);
        };

        let insight = if counts.len() == 1 {
            format!("All {classified} file names use {dominant}")
        } else {
            format!("{} naming conventions in use; {dominant} covers {:.0}%", counts.len(), score * 100.0)
        };

        Ok(Some(
            PatternMatch::new(0.75, PatternFindings::NamingConventions {
                counts,
                dominant,
                consistency: score,
            })
            .with_insight(insight),
        ))
    }
}

/// Layered directory layout among the generated files
pub struct ArchitectureDetector;

impl PatternDetector for ArchitectureDetector {
    fn name(&self) -> &'static str {
        "architecture"
    }

    fn min_confidence(&self) -> f64 {
        0.7
    }

    fn detect(&self, window: &DetectionWindow<'_>) -> anyhow::Result<Option<PatternMatch>> {
        // Only directories below the shared ancestor say anything about layout
        let Some(base) = common_ancestor(window.files.iter().filter_map(|f| f.path.parent())) else {
            return Ok(None);
        };

        let mut layers = BTreeSet::new();
        for file in window.files {
            let Some(parent) = file.path.parent() else { continue };
            let Ok(relative) = parent.strip_prefix(&base) else { continue };
            for component in relative.components() {
                let name = component.as_os_str().to_string_lossy().to_lowercase();
                if let Some(layer) = LAYERS.iter().find(|layer| **layer == name) {
                    layers.insert(*layer);
                }
            }
        }

        if layers.len() < 2 {
            return Ok(None);
        }

        let layers: Vec<String> = layers.into_iter().map(str::to_string).collect();
        Ok(Some(
            PatternMatch::new(0.7, PatternFindings::Architecture { layers: layers.clone() })
                .with_insight(format!("Layered layout across: {}", layers.join(", "))),
        ))
    }
}

/// Formatting agreement across the generated source files
pub struct StyleConsistencyDetector;

impl StyleConsistencyDetector {
    /// Dominant value of one dimension within one file
    fn file_preference(pairs: [(&'static str, usize); 2]) -> Option<&'static str> {
        let [(first, a), (second, b)] = pairs;
        match (a, b) {
            (0, 0) => None,
            _ if a >= b => Some(first),
            _ => Some(second),
        }
    }

    fn score(votes: &BTreeMap<&'static str, usize>) -> Option<StyleScore> {
        let (dominant, consistency) = consistency(votes)?;
        Some(StyleScore {
            dominant: dominant.to_string(),
            consistency,
            observations: votes.values().sum(),
        })
    }
}

impl PatternDetector for StyleConsistencyDetector {
    fn name(&self) -> &'static str {
        "style_consistency"
    }

    fn detect(&self, window: &DetectionWindow<'_>) -> anyhow::Result<Option<PatternMatch>> {
        let mut quotes = BTreeMap::new();
        let mut semicolons = BTreeMap::new();
        let mut braces = BTreeMap::new();

        for file in window.files.iter().filter(|f| is_source(f)) {
            let Some(content) = &file.content else { continue };

            let quote = Self::file_preference([
                ("single", style::SINGLE_QUOTED.find_iter(content).count()),
                ("double", style::DOUBLE_QUOTED.find_iter(content).count()),
            ]);
            let (terminated, bare) = style::statement_lines(content)
                .fold((0, 0), |(t, b), line| if line.ends_with(';') { (t + 1, b) } else { (t, b + 1) });
            let semicolon = Self::file_preference([("always", terminated), ("omitted", bare)]);
            let brace = Self::file_preference([
                ("same_line", style::BRACE_SAME_LINE.find_iter(content).count()),
                ("next_line", style::BRACE_NEXT_LINE.find_iter(content).count()),
            ]);

            for (votes, preference) in
                [(&mut quotes, quote), (&mut semicolons, semicolon), (&mut braces, brace)]
            {
                if let Some(preference) = preference {
                    *votes.entry(preference).or_insert(0usize) += 1;
                }
            }
        }

        let quotes = Self::score(&quotes);
        let semicolons = Self::score(&semicolons);
        let braces = Self::score(&braces);
        if quotes.is_none() && semicolons.is_none() && braces.is_none() {
            return Ok(None);
        }

        let mut found = PatternMatch::new(0.8, PatternFindings::StyleConsistency {
            quotes: quotes.clone(),
            semicolons: semicolons.clone(),
            braces: braces.clone(),
        });
        for (dimension, score) in [("quotes", &quotes), ("semicolons", &semicolons), ("braces", &braces)] {
            if let Some(score) = score {
                found = found.with_insight(format!(
                    "{dimension}: {} in {:.0}% of {} file(s)",
                    score.dominant,
                    score.consistency * 100.0,
                    score.observations
                ));
            }
        }

        Ok(Some(found))
    }
}

/// Sessions that deliver code together with tests or documentation
pub struct SuccessHeuristicsDetector;

impl PatternDetector for SuccessHeuristicsDetector {
    fn name(&self) -> &'static str {
        "success_heuristics"
    }

    fn min_confidence(&self) -> f64 {
        0.7
    }

    fn detect(&self, window: &DetectionWindow<'_>) -> anyhow::Result<Option<PatternMatch>> {
        let count = |category: FileCategory| window.files.iter().filter(|f| f.content_type == category).count();
        let implementation_files = count(FileCategory::Implementation);
        let test_files = count(FileCategory::Test);
        let documentation_files = count(FileCategory::Documentation);

        if implementation_files == 0 || (test_files == 0 && documentation_files == 0) {
            return Ok(None);
        }

        let mut found = PatternMatch::new(0.85, PatternFindings::SuccessHeuristics {
            implementation_files,
            test_files,
            documentation_files,
        });
        if test_files > 0 {
            found = found.with_insight(format!("{test_files} test file(s) accompany the implementation"));
        }
        if documentation_files > 0 {
            found = found.with_insight(format!("{documentation_files} documentation file(s) were written"));
        }

        Ok(Some(found))
    }
}
