//! Wildcard URL pattern matching shared by every policy.
//!
//! A pattern is a plain string where `*` stands for "any run of characters,
//! possibly empty". Everything else matches literally. Matching is anchored at
//! both ends and case-insensitive, so `*.example.com*` matches
//! `https://a.example.com/x` but `example.com` does not.

use regex::{Regex, RegexBuilder};

/// A pattern compiled once and reusable across many subjects.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    regex: Option<Regex>,
}

impl CompiledPattern {
    pub fn new(pattern: &str) -> Self {
        let regex = if pattern.is_empty() {
            None
        } else {
            match RegexBuilder::new(&to_regex_source(pattern))
                .case_insensitive(true)
                .build()
            {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::warn!(pattern, error = %e, "pattern failed to compile");
                    None
                }
            }
        };
        Self {
            source: pattern.to_string(),
            regex,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, subject: &str) -> bool {
        if subject.is_empty() {
            return false;
        }
        self.regex.as_ref().is_some_and(|r| r.is_match(subject))
    }
}

/// Translate a wildcard pattern into an anchored regex source.
fn to_regex_source(pattern: &str) -> String {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    let mut buf = [0u8; 4];
    for ch in pattern.chars() {
        if ch == '*' {
            source.push_str(".*");
        } else {
            source.push_str(&regex::escape(ch.encode_utf8(&mut buf)));
        }
    }
    source.push('$');
    source
}

/// Returns true when `subject` matches `pattern` as a whole.
///
/// Empty patterns and empty subjects never match.
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    if pattern.is_empty() || subject.is_empty() {
        return false;
    }
    let matched = CompiledPattern::new(pattern).is_match(subject);
    if matched {
        tracing::trace!(pattern, subject, "pattern matched");
    }
    matched
}

/// Returns true when any of `patterns` matches `subject`.
pub fn matches_any<S: AsRef<str>>(patterns: &[S], subject: &str) -> bool {
    patterns.iter().any(|p| matches_pattern(p.as_ref(), subject))
}
