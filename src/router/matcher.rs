//! Destination pattern matchers.
//!
//! All destination rules in routing data are regular expressions tested
//! unanchored against the dialed number:
//! - rate prefixes match as `<prefix>.*`
//! - BYO routes match as `<prefix><match>`
//! - host priority prefixes match as written

use regex::Regex;
use std::sync::Arc;

/// Type of destination pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternKind {
    /// Provider rate row prefix.
    RatePrefix(String),
    /// BYO carrier route rule.
    ByoRule { prefix: String, pattern: String },
    /// Host priority prefix.
    Priority(String),
}

impl PatternKind {
    /// Regular expression source for this pattern.
    pub fn expression(&self) -> String {
        match self {
            PatternKind::RatePrefix(prefix) => format!("{}.*", prefix),
            PatternKind::ByoRule { prefix, pattern } => format!("{}{}", prefix, pattern),
            PatternKind::Priority(p) => p.clone(),
        }
    }
}

/// A compiled destination pattern.
#[derive(Clone)]
pub struct CompiledPattern {
    kind: PatternKind,
    regex: Arc<Regex>,
}

impl std::fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("kind", &self.kind)
            .finish()
    }
}

impl CompiledPattern {
    pub fn new(kind: PatternKind) -> Result<Self, regex::Error> {
        let regex = Regex::new(&kind.expression())?;
        Ok(Self {
            kind,
            regex: Arc::new(regex),
        })
    }

    pub fn rate_prefix(prefix: &str) -> Result<Self, regex::Error> {
        Self::new(PatternKind::RatePrefix(prefix.to_string()))
    }

    pub fn byo_rule(prefix: &str, pattern: &str) -> Result<Self, regex::Error> {
        Self::new(PatternKind::ByoRule {
            prefix: prefix.to_string(),
            pattern: pattern.to_string(),
        })
    }

    pub fn priority(pattern: &str) -> Result<Self, regex::Error> {
        Self::new(PatternKind::Priority(pattern.to_string()))
    }

    /// Check if the destination matches.
    pub fn matches(&self, destination: &str) -> bool {
        self.regex.is_match(destination)
    }

    pub fn kind(&self) -> &PatternKind {
        &self.kind
    }
}
