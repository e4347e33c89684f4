//! Searching and colouring a log file through the reader.

use logcrawl::data::{LineNumber, LinesCount};
use logcrawl::index::{ByteSource, LocalFile, LogReader};
use logcrawl::search::{
    Colour, Filter, FilterSet, SearchEvent, SearchLimits, SearchPattern, SearchStatus, StopReason,
};
use logcrawl::utils::AppConfig;
use logcrawl::{IndexError, SearchError};
use pretty_assertions::assert_eq;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const SAMPLE: &str = "\
2024-03-01 12:00:00 INFO  service started
2024-03-01 12:00:01 WARN  cache miss ratio high
2024-03-01 12:00:02 ERROR upstream timeout after 30s
2024-03-01 12:00:03 INFO  request served
2024-03-01 12:00:04 WARN: ERROR seen in retry path
2024-03-01 12:00:05 INFO  Timeout raised to 60s
";

fn open_indexed(path: &Path) -> LogReader {
    let config = AppConfig {
        search_chunk_lines: 2,
        ..AppConfig::default()
    };
    let source: Arc<dyn ByteSource> = Arc::new(LocalFile::open(path).unwrap());
    let reader = LogReader::new(source, &config);
    reader.start_indexing();
    reader.wait_for_index();
    reader
}

fn sample_file() -> (TempDir, LogReader) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("service.log");
    fs::write(&path, SAMPLE).unwrap();
    let reader = open_indexed(&path);
    (dir, reader)
}

fn lines(values: &[u32]) -> Vec<LineNumber> {
    values.iter().copied().map(LineNumber::new).collect()
}

#[test]
fn test_case_insensitive_search_over_file() {
    let (_dir, reader) = sample_file();
    let pattern = SearchPattern::new("timeout", false).unwrap();
    let result = reader.search(pattern, SearchLimits::none()).wait().unwrap();

    assert_eq!(result.matches(), lines(&[2, 5]).as_slice());
    assert!(result.is_complete());
    assert_eq!(result.next_match(LineNumber::new(2)), Some(LineNumber::new(5)));
}

#[test]
fn test_search_events_arrive_in_order() {
    let (_dir, reader) = sample_file();
    let pattern = SearchPattern::new("WARN|ERROR", true).unwrap();
    let task = reader.search(pattern, SearchLimits::none());

    let mut streamed = Vec::new();
    let mut last_percent = 0;
    for event in task.events().iter() {
        match event {
            SearchEvent::Matches { lines, percent } => {
                assert!(percent >= last_percent);
                last_percent = percent;
                streamed.extend(lines);
            }
            SearchEvent::Completed(result) => {
                assert_eq!(result.matches(), streamed.as_slice());
                break;
            }
            SearchEvent::Failed(message) => panic!("search failed: {message}"),
        }
    }
    assert_eq!(streamed, lines(&[1, 2, 4]));
    assert_eq!(last_percent, 100);
}

#[test]
fn test_match_limit_keeps_earliest_matches() {
    let (_dir, reader) = sample_file();
    let pattern = SearchPattern::fixed("INFO", true).unwrap();
    let limits = SearchLimits::none().with_max_matches(2);
    let result = reader.search(pattern, limits).wait().unwrap();

    assert_eq!(result.matches(), lines(&[0, 3]).as_slice());
    assert_eq!(result.status(), SearchStatus::Incomplete(StopReason::MatchLimit));
}

#[test]
fn test_invalid_pattern_rejected_before_scanning() {
    let err = SearchPattern::new("ERROR(", true).unwrap_err();
    assert!(matches!(err, SearchError::PatternInvalid { .. }));
}

#[test]
fn test_refresh_search_after_append() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("growing.log");
    fs::write(&path, SAMPLE).unwrap();
    let reader = open_indexed(&path);

    let pattern = SearchPattern::new("ERROR", true).unwrap();
    let first = reader.search(pattern, SearchLimits::none()).wait().unwrap();
    assert_eq!(first.matches(), lines(&[2, 4]).as_slice());

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"2024-03-01 12:00:06 ERROR disk full\n").unwrap();
    reader.refresh().unwrap();
    reader.wait_for_index();

    // The old result no longer describes the current snapshot
    let snapshot = reader.snapshot();
    assert!(matches!(
        first.check_current(&snapshot),
        Err(IndexError::IndexStale { .. })
    ));
    assert!(reader.ensure_current(first.generation()).is_err());

    let refreshed = reader.refresh_search(first, SearchLimits::none()).wait().unwrap();
    assert_eq!(refreshed.matches(), lines(&[2, 4, 6]).as_slice());
    assert_eq!(refreshed.generation(), snapshot.generation());
}

#[test]
fn test_filters_from_json_first_match_wins() {
    let (dir, reader) = sample_file();
    let filters_path = dir.path().join("filters.json");
    fs::write(
        &filters_path,
        r##"{
            "filters": [
                {"pattern": "ERROR", "fore_colour": "#FFFFFF", "back_colour": "#FF0000"},
                {"pattern": "WARN", "fore_colour": "#000000", "back_colour": "#FFFF00"},
                {"pattern": "info", "ignore_case": true, "back_colour": "#E0E0E0", "enabled": false}
            ]
        }"##,
    )
    .unwrap();
    let filters = FilterSet::from_json(&fs::read_to_string(&filters_path).unwrap()).unwrap();

    let colours = reader
        .colourise(&filters, LineNumber::new(0), LinesCount::new(6))
        .unwrap();
    let backgrounds: Vec<Option<Colour>> = colours.iter().map(|c| c.map(|c| c.background)).collect();

    let red = Some(Colour::rgb(0xff, 0, 0));
    let yellow = Some(Colour::rgb(0xff, 0xff, 0));
    assert_eq!(backgrounds, vec![None, yellow, red, None, red, None]);
}

#[test]
fn test_filter_edits_apply_on_next_pass() {
    let (_dir, reader) = sample_file();
    let mut filters = FilterSet::new();
    filters.add(Filter::new("ERROR", false, Colour::WHITE, Colour::rgb(0xff, 0, 0)));
    filters.add(Filter::new("WARN", false, Colour::BLACK, Colour::rgb(0xff, 0xff, 0)));

    let before = reader.colourise(&filters, LineNumber::new(4), LinesCount::new(1)).unwrap();
    assert_eq!(before[0].map(|c| c.foreground), Some(Colour::WHITE));

    filters.move_up(1);
    let after = reader.colourise(&filters, LineNumber::new(4), LinesCount::new(1)).unwrap();
    assert_eq!(after[0].map(|c| c.foreground), Some(Colour::BLACK));

    filters.add(Filter::new("[", false, Colour::BLACK, Colour::WHITE));
    assert!(matches!(
        reader.colourise(&filters, LineNumber::new(0), LinesCount::new(1)),
        Err(SearchError::PatternInvalid { .. })
    ));
}
