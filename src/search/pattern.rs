use crate::error::SearchError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the pattern text is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternSyntax {
    #[default]
    Regex,
    /// Match the text literally
    FixedString,
}

/// A compiled search pattern
#[derive(Debug, Clone)]
pub struct SearchPattern {
    text: String,
    syntax: PatternSyntax,
    case_sensitive: bool,
    regex: Regex,
}

impl SearchPattern {
    /// Compile a regular expression
    pub fn new(pattern: &str, case_sensitive: bool) -> Result<Self, SearchError> {
        Self::with_syntax(pattern, PatternSyntax::Regex, case_sensitive)
    }

    /// Compile a pattern matched literally
    pub fn fixed(pattern: &str, case_sensitive: bool) -> Result<Self, SearchError> {
        Self::with_syntax(pattern, PatternSyntax::FixedString, case_sensitive)
    }

    pub fn with_syntax(
        pattern: &str,
        syntax: PatternSyntax,
        case_sensitive: bool,
    ) -> Result<Self, SearchError> {
        Ok(Self {
            text: pattern.to_string(),
            syntax,
            case_sensitive,
            regex: compile(pattern, syntax, case_sensitive)?,
        })
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    /// Byte span of the first match in `line`
    pub fn find(&self, line: &str) -> Option<(usize, usize)> {
        self.regex.find(line).map(|m| (m.start(), m.end()))
    }

    /// All non-overlapping match spans in `line`
    pub fn find_all(&self, line: &str) -> Vec<(usize, usize)> {
        self.regex.find_iter(line).map(|m| (m.start(), m.end())).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn syntax(&self) -> PatternSyntax {
        self.syntax
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}

/// Patterns are equal when they would match the same lines
impl PartialEq for SearchPattern {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
            && self.syntax == other.syntax
            && self.case_sensitive == other.case_sensitive
    }
}

impl Eq for SearchPattern {}

impl fmt::Display for SearchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub(crate) fn compile(
    pattern: &str,
    syntax: PatternSyntax,
    case_sensitive: bool,
) -> Result<Regex, SearchError> {
    let source = match syntax {
        PatternSyntax::Regex => pattern.to_string(),
        PatternSyntax::FixedString => regex::escape(pattern),
    };
    RegexBuilder::new(&source)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|source| SearchError::PatternInvalid {
            pattern: pattern.to_string(),
            source,
        })
}
