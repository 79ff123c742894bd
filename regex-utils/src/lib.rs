//! Regex utilities for the evolution monitor
//! Extracted to a separate crate for compilation optimization

use once_cell::sync::Lazy;
use regex::Regex;

/// File name quality patterns
pub mod naming {
    use super::*;

    /// Date-like fragments such as `2024-05-01`, `20240501` or `2024_05_01`
    pub static DATE_LIKE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"\d{4}[-_.]?\d{2}[-_.]?\d{2}").expect("Invalid regex pattern")
    });

    /// Stems that say nothing about the file's contents
    pub const GENERIC_WORDS: &[&str] = &[
        "temp", "tmp", "test", "new", "file", "untitled", "document", "stuff", "misc", "copy",
        "data", "output", "final", "draft",
    ];

    /// Check whether a stem is exactly one generic word
    pub fn is_generic(stem: &str) -> bool {
        let stem = stem.to_lowercase();
        GENERIC_WORDS.iter().any(|word| *word == stem)
    }

    /// A name is unclear if it carries a date or its stem is a lone generic word
    pub fn is_unclear(file_name: &str) -> bool {
        if DATE_LIKE.is_match(file_name) {
            return true;
        }

        let stem = file_name.split('.').next().unwrap_or(file_name);
        is_generic(stem)
    }
}

/// Identifier case classification for file stems
pub mod case {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum IdentifierCase {
        Camel,
        Pascal,
        Snake,
        Kebab,
    }

    impl IdentifierCase {
        pub fn as_str(&self) -> &'static str {
            match self {
                IdentifierCase::Camel => "camelCase",
                IdentifierCase::Pascal => "PascalCase",
                IdentifierCase::Snake => "snake_case",
                IdentifierCase::Kebab => "kebab-case",
            }
        }
    }

    static CAMEL: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[a-z][a-z0-9]*(?:[A-Z][a-z0-9]*)+$").expect("Invalid regex pattern")
    });

    static PASCAL: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)*$").expect("Invalid regex pattern")
    });

    static SNAKE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[a-z][a-z0-9]*(?:_[a-z0-9]+)+$").expect("Invalid regex pattern")
    });

    static KEBAB: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[a-z][a-z0-9]*(?:-[a-z0-9]+)+$").expect("Invalid regex pattern")
    });

    /// Classify a stem; single lowercase words have no recognizable case
    pub fn classify(stem: &str) -> Option<IdentifierCase> {
        if KEBAB.is_match(stem) {
            Some(IdentifierCase::Kebab)
        } else if SNAKE.is_match(stem) {
            Some(IdentifierCase::Snake)
        } else if CAMEL.is_match(stem) {
            Some(IdentifierCase::Camel)
        } else if PASCAL.is_match(stem) {
            Some(IdentifierCase::Pascal)
        } else {
            None
        }
    }
}

/// Module import styles
pub mod imports {
    use super::*;

    pub static ES_MODULE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?m)^\s*import\s+(?:.+\s+from\s+)?['"]"#).expect("Invalid regex pattern")
    });

    pub static COMMONJS: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"\brequire\s*\(\s*['"]"#).expect("Invalid regex pattern")
    });

    pub static RUST_USE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+[\w:{}*, ]+;").expect("Invalid regex pattern")
    });

    /// Counts of (es module, commonjs, rust use) statements
    pub fn tally(content: &str) -> (usize, usize, usize) {
        (
            ES_MODULE.find_iter(content).count(),
            COMMONJS.find_iter(content).count(),
            RUST_USE.find_iter(content).count(),
        )
    }
}

/// Formatting style patterns
pub mod style {
    use super::*;

    pub static SINGLE_QUOTED: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"'[^'\n]*'").expect("Invalid regex pattern"));

    pub static DOUBLE_QUOTED: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#""[^"\n]*""#).expect("Invalid regex pattern"));

    /// Opening brace at the end of a line that also holds the header
    pub static BRACE_SAME_LINE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)\S[ \t]*\{[ \t]*$").expect("Invalid regex pattern"));

    /// Opening brace alone on its own line
    pub static BRACE_NEXT_LINE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)^[ \t]*\{[ \t]*$").expect("Invalid regex pattern"));

    /// Lines that look like statements: not blank, not comments, not block delimiters
    pub fn statement_lines(content: &str) -> impl Iterator<Item = &str> {
        content.lines().map(str::trim_end).filter(|line| {
            let trimmed = line.trim_start();
            !trimmed.is_empty()
                && !trimmed.starts_with("//")
                && !trimmed.starts_with('*')
                && !trimmed.starts_with("/*")
                && !trimmed.starts_with('#')
                && !matches!(trimmed.chars().last(), Some('{' | '}' | ',' | '(' | '[' | ':'))
        })
    }
}
