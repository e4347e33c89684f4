//! Highlight filters: ordered pattern rules that pick a line's colours.

use crate::data::{LineNumber, LinesCount};
use crate::error::SearchError;
use crate::index::reader::read_lines;
use crate::index::source::ByteSource;
use crate::index::types::IndexedFile;
use crate::search::engine::SearchConfig;
use crate::search::pattern::{PatternSyntax, compile};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Pattern given to a freshly added filter
pub const DEFAULT_PATTERN: &str = "New Filter";

#[derive(Debug, Error)]
#[error("invalid colour {0:?}, expected #RRGGBB")]
pub struct InvalidColour(String);

/// An RGB colour, written `#RRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Colour {
    pub const BLACK: Colour = Colour::rgb(0, 0, 0);
    pub const WHITE: Colour = Colour::rgb(0xff, 0xff, 0xff);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl FromStr for Colour {
    type Err = InvalidColour;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidColour(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Colour::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for Colour {
    type Error = InvalidColour;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Colour> for String {
    fn from(colour: Colour) -> Self {
        colour.to_string()
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Colours a line is drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterColours {
    pub foreground: Colour,
    pub background: Colour,
}

impl Default for FilterColours {
    fn default() -> Self {
        Self {
            foreground: Colour::BLACK,
            background: Colour::WHITE,
        }
    }
}

fn default_fore() -> Colour {
    Colour::BLACK
}

fn default_back() -> Colour {
    Colour::WHITE
}

fn default_enabled() -> bool {
    true
}

/// One highlight rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub pattern: String,
    #[serde(default)]
    pub ignore_case: bool,
    #[serde(default = "default_fore")]
    pub fore_colour: Colour,
    #[serde(default = "default_back")]
    pub back_colour: Colour,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Filter {
    pub fn new(pattern: impl Into<String>, ignore_case: bool, fore: Colour, back: Colour) -> Self {
        Self {
            pattern: pattern.into(),
            ignore_case,
            fore_colour: fore,
            back_colour: back,
            enabled: true,
        }
    }

    pub fn colours(&self) -> FilterColours {
        FilterColours {
            foreground: self.fore_colour,
            background: self.back_colour,
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::new(DEFAULT_PATTERN, false, Colour::BLACK, Colour::WHITE)
    }
}

/// Ordered filters; the first enabled one that matches a line wins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Filter> {
        self.filters.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Filter> {
        self.filters.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    /// Append a filter, returning its position
    pub fn add(&mut self, filter: Filter) -> usize {
        self.filters.push(filter);
        self.filters.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> Option<Filter> {
        (index < self.filters.len()).then(|| self.filters.remove(index))
    }

    /// Swap a filter with the one above it; false when already first
    pub fn move_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.filters.len() {
            return false;
        }
        self.filters.swap(index - 1, index);
        true
    }

    /// Swap a filter with the one below it; false when already last
    pub fn move_down(&mut self, index: usize) -> bool {
        if index + 1 >= self.filters.len() {
            return false;
        }
        self.filters.swap(index, index + 1);
        true
    }
}

struct CompiledFilter {
    regex: Regex,
    colours: FilterColours,
}

/// Snapshot of a filter set's enabled rules, ready to evaluate
pub struct CompiledFilterSet {
    rules: Vec<CompiledFilter>,
}

impl CompiledFilterSet {
    /// Compile every enabled filter, failing on the first bad pattern
    pub fn compile(set: &FilterSet) -> Result<Self, SearchError> {
        let rules = set
            .iter()
            .filter(|filter| filter.enabled)
            .map(|filter| {
                Ok(CompiledFilter {
                    regex: compile(&filter.pattern, PatternSyntax::Regex, !filter.ignore_case)?,
                    colours: filter.colours(),
                })
            })
            .collect::<Result<Vec<_>, SearchError>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Colours of the first rule matching `line`
    pub fn evaluate(&self, line: &str) -> Option<FilterColours> {
        self.rules
            .iter()
            .find(|rule| rule.regex.is_match(line))
            .map(|rule| rule.colours)
    }
}

/// Colours for `count` lines from `first`; `None` means default colours.
///
/// Lines past the end of the snapshot are not reported.
pub fn colourise(
    snapshot: &IndexedFile,
    source: &dyn ByteSource,
    filters: &CompiledFilterSet,
    first: LineNumber,
    count: LinesCount,
    config: &SearchConfig,
) -> Result<Vec<Option<FilterColours>>, SearchError> {
    let available = snapshot.line_count().as_usize().saturating_sub(first.index());
    let total = count.as_usize().min(available);
    let chunk_lines = config.chunk_lines.max(1);
    let read_config = config.read_config();

    let mut colours = Vec::with_capacity(total);
    let mut done = 0;
    while done < total {
        let take = chunk_lines.min(total - done);
        let lines = read_lines(
            snapshot,
            source,
            first + LinesCount::from_len(done),
            LinesCount::from_len(take),
            &read_config,
        )?;
        let chunk: Vec<Option<FilterColours>> =
            lines.par_iter().map(|line| filters.evaluate(line)).collect();
        colours.extend(chunk);
        done += take;
    }
    Ok(colours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build::index_full;
    use crate::index::source::MemorySource;
    use crate::index::types::IndexConfig;
    use crate::utils::cancel::CancelToken;
    use pretty_assertions::assert_eq;

    const RED: Colour = Colour::rgb(0xff, 0, 0);
    const YELLOW: Colour = Colour::rgb(0xff, 0xff, 0);

    fn error_and_warn() -> FilterSet {
        let mut set = FilterSet::new();
        set.add(Filter::new("ERROR", false, Colour::WHITE, RED));
        set.add(Filter::new("WARN", false, Colour::BLACK, YELLOW));
        set
    }

    #[test]
    fn test_first_matching_filter_wins() {
        let compiled = CompiledFilterSet::compile(&error_and_warn()).unwrap();
        assert_eq!(
            compiled.evaluate("WARN: ERROR seen"),
            Some(FilterColours {
                foreground: Colour::WHITE,
                background: RED
            })
        );
        assert_eq!(compiled.evaluate("WARN: disk low").map(|c| c.background), Some(YELLOW));
        assert_eq!(compiled.evaluate("all good"), None);
    }

    #[test]
    fn test_order_decides_after_move() {
        let mut set = error_and_warn();
        assert!(set.move_down(0));
        assert_eq!(set.get(0).unwrap().pattern, "WARN");
        let compiled = CompiledFilterSet::compile(&set).unwrap();
        assert_eq!(compiled.evaluate("WARN: ERROR seen").map(|c| c.background), Some(YELLOW));
    }

    #[test]
    fn test_disabled_filters_skipped() {
        let mut set = error_and_warn();
        set.get_mut(0).unwrap().enabled = false;
        let compiled = CompiledFilterSet::compile(&set).unwrap();
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled.evaluate("WARN: ERROR seen").map(|c| c.background), Some(YELLOW));
        assert_eq!(compiled.evaluate("ERROR only"), None);
    }

    #[test]
    fn test_case_flag_respected() {
        let mut set = FilterSet::new();
        set.add(Filter::new("error", false, Colour::WHITE, RED));
        set.add(Filter::new("warn", true, Colour::BLACK, YELLOW));
        let compiled = CompiledFilterSet::compile(&set).unwrap();
        assert!(compiled.evaluate("ERROR").is_none());
        assert!(compiled.evaluate("error").is_some());
        assert!(compiled.evaluate("WARN").is_some());
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let compiled = CompiledFilterSet::compile(&FilterSet::new()).unwrap();
        assert!(compiled.is_empty());
        assert_eq!(compiled.evaluate("anything"), None);
    }

    #[test]
    fn test_invalid_pattern_fails_compile() {
        let mut set = error_and_warn();
        set.add(Filter::new("[broken", false, Colour::BLACK, Colour::WHITE));
        assert!(matches!(
            CompiledFilterSet::compile(&set),
            Err(SearchError::PatternInvalid { .. })
        ));
    }

    #[test]
    fn test_editing_operations() {
        let mut set = FilterSet::new();
        assert_eq!(set.add(Filter::default()), 0);
        assert_eq!(set.add(Filter::new("b", false, RED, YELLOW)), 1);
        assert_eq!(set.get(0).unwrap().pattern, DEFAULT_PATTERN);

        assert!(!set.move_up(0));
        assert!(!set.move_down(1));
        assert!(!set.move_down(7));
        assert!(set.move_up(1));
        assert_eq!(set.get(0).unwrap().pattern, "b");

        assert_eq!(set.remove(0).map(|f| f.pattern), Some("b".to_string()));
        assert_eq!(set.remove(3), None);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_json_defaults_and_colours() {
        let set = FilterSet::from_json(r##"{"filters": [{"pattern": "ERROR", "back_colour": "#ff0000"}]}"##).unwrap();
        let filter = set.get(0).unwrap();
        assert!(!filter.ignore_case);
        assert!(filter.enabled);
        assert_eq!(filter.fore_colour, Colour::BLACK);
        assert_eq!(filter.back_colour, RED);

        let json = set.to_json().unwrap();
        assert!(json.contains("\"#FF0000\""));
        assert_eq!(FilterSet::from_json(&json).unwrap(), set);
    }

    #[test]
    fn test_colour_parsing_rejects_garbage() {
        assert!("#12345".parse::<Colour>().is_err());
        assert!("123456".parse::<Colour>().is_err());
        assert!("#GG0000".parse::<Colour>().is_err());
        assert_eq!("#0a0B0c".parse::<Colour>().unwrap(), Colour::rgb(10, 11, 12));
    }

    #[test]
    fn test_colourise_range() {
        let source = MemorySource::new(b"boot\nWARN low\nERROR bad\nok\n".to_vec());
        let file = index_full(&source, &IndexConfig::default(), None, &CancelToken::new(), |_| {})
            .unwrap()
            .completed()
            .unwrap();
        let compiled = CompiledFilterSet::compile(&error_and_warn()).unwrap();
        let config = SearchConfig {
            chunk_lines: 2,
            ..SearchConfig::default()
        };

        let colours = colourise(
            &file,
            &source,
            &compiled,
            LineNumber::new(1),
            LinesCount::new(10),
            &config,
        )
        .unwrap();

        let backgrounds: Vec<Option<Colour>> =
            colours.iter().map(|c| c.map(|c| c.background)).collect();
        assert_eq!(backgrounds, vec![Some(YELLOW), Some(RED), None]);
    }
}
