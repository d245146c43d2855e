//! Line classification against the configured match / ignore patterns.

use regex::Regex;

/// Result of classifying one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
  Error,
  Normal,
}

/// Compiled match/ignore pattern pair. Classification is a pure predicate;
/// pattern compilation (and its failure mode) lives in config loading.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
  match_pattern: Regex,
  ignore_pattern: Option<Regex>,
}

impl PatternMatcher {
  pub fn new(match_pattern: Regex, ignore_pattern: Option<Regex>) -> Self {
    Self {
      match_pattern,
      ignore_pattern,
    }
  }

  /// A line is an error iff it matches the match pattern and does not match
  /// the ignore pattern. Ignore wins over match.
  pub fn classify(&self, line: &str) -> LineClass {
    if let Some(ignore) = &self.ignore_pattern {
      if ignore.is_match(line) {
        return LineClass::Normal;
      }
    }
    if self.match_pattern.is_match(line) {
      LineClass::Error
    } else {
      LineClass::Normal
    }
  }

  pub fn is_error(&self, line: &str) -> bool {
    self.classify(line) == LineClass::Error
  }
}
