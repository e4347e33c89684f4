//! Line boundary scanning: builds and extends [`IndexedFile`]s.
//!
//! Content is read in fixed-size blocks; the cancel token is checked between
//! blocks and progress is reported after each one.

use crate::data::{LineLength, LineOffset};
use crate::error::{IndexError, Outcome};
use crate::index::encoding::{DETECTION_SAMPLE_BYTES, Detection, Encoding, detect_encoding};
use crate::index::source::{ByteSource, SourceMetadata};
use crate::index::types::{IndexConfig, IndexedFile, OffsetTable};
use crate::utils::cancel::{CancelToken, percent};
use std::thread;
use std::time::Duration;

/// Accumulates line starts while bytes are fed to it in file order
#[derive(Debug)]
pub struct IndexBuilder {
    /// Starts of terminated lines
    offsets: OffsetTable,
    /// Start of the run of bytes not yet terminated
    tail_start: u64,
    /// Absolute position of the next byte to feed
    end: u64,
    encoding: Encoding,
    encoding_guessed: bool,
    max_line_units: u64,
}

impl IndexBuilder {
    pub fn new(detection: Detection) -> Self {
        Self {
            offsets: OffsetTable::new(),
            tail_start: 0,
            end: 0,
            encoding: detection.encoding,
            encoding_guessed: detection.guessed,
            max_line_units: 0,
        }
    }

    /// Continue from an existing index.
    ///
    /// A trailing partial line is dropped and scanning restarts at its first
    /// byte, so it is replaced once more content arrives.
    pub fn resume(previous: &IndexedFile) -> Self {
        let mut offsets = previous.offsets.clone();
        let tail_start = if previous.last_line_terminated {
            previous.indexed_size
        } else {
            offsets.pop().map_or(0, LineOffset::as_u64)
        };

        Self {
            offsets,
            tail_start,
            end: tail_start,
            encoding: previous.encoding,
            encoding_guessed: previous.encoding_guessed,
            max_line_units: u64::try_from(previous.max_line_length.get()).unwrap_or(0),
        }
    }

    /// Absolute position the next fed bytes must start at
    pub fn scan_position(&self) -> u64 {
        self.end
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Scan bytes located at [`Self::scan_position`]
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), IndexError> {
        let width = self.encoding.unit_width();
        let offsets = &mut self.offsets;
        let tail_start = &mut self.tail_start;
        let max_line_units = &mut self.max_line_units;

        self.encoding.scan_line_ends(bytes, self.end, |line_end| {
            offsets.try_push(LineOffset::from_u64(*tail_start))?;
            // Terminator unit excluded
            let units = ((line_end - *tail_start) / width).saturating_sub(1);
            *max_line_units = (*max_line_units).max(units);
            *tail_start = line_end;
            Ok::<(), IndexError>(())
        })?;

        self.end += bytes.len() as u64;
        Ok(())
    }

    /// Seal the index; unterminated trailing bytes become the last line
    pub fn finish(mut self, metadata: Option<SourceMetadata>) -> Result<IndexedFile, IndexError> {
        let last_line_terminated = self.tail_start >= self.end;
        if !last_line_terminated {
            self.offsets.try_push(LineOffset::from_u64(self.tail_start))?;
            let units = (self.end - self.tail_start) / self.encoding.unit_width();
            self.max_line_units = self.max_line_units.max(units);
        }

        Ok(IndexedFile {
            offsets: self.offsets,
            encoding: self.encoding,
            encoding_guessed: self.encoding_guessed,
            indexed_size: self.end,
            last_line_terminated,
            max_line_length: LineLength::from_units(self.max_line_units),
            source_metadata: metadata,
            ..IndexedFile::default()
        })
    }
}

/// Index a source from its first byte.
///
/// `forced` skips detection and uses the given encoding.
pub fn index_full(
    source: &dyn ByteSource,
    config: &IndexConfig,
    forced: Option<Encoding>,
    cancel: &CancelToken,
    on_progress: impl FnMut(u8),
) -> Result<Outcome<IndexedFile>, IndexError> {
    let metadata = source.metadata()?;

    let detection = match forced {
        Some(encoding) => Detection {
            encoding,
            guessed: false,
        },
        None => {
            let sample_end = metadata.size.min(DETECTION_SAMPLE_BYTES as u64);
            let sample = read_with_retry(source, 0, sample_end, config)?;
            detect_encoding(&sample)
        }
    };
    if detection.guessed {
        tracing::warn!(
            path = %source.path().display(),
            fallback = %detection.encoding,
            "encoding could not be detected, using fallback"
        );
    }

    tracing::debug!(
        path = %source.path().display(),
        size = metadata.size,
        encoding = %detection.encoding,
        "full index started"
    );
    scan(IndexBuilder::new(detection), source, metadata, config, cancel, on_progress)
}

/// Extend `previous` with the bytes appended since it was built.
///
/// The caller has established that the source only grew; nothing before the
/// previous last line is read again.
pub fn index_incremental(
    previous: &IndexedFile,
    source: &dyn ByteSource,
    config: &IndexConfig,
    cancel: &CancelToken,
    on_progress: impl FnMut(u8),
) -> Result<Outcome<IndexedFile>, IndexError> {
    let metadata = source.metadata()?;
    let builder = IndexBuilder::resume(previous);

    tracing::debug!(
        path = %source.path().display(),
        from = builder.scan_position(),
        to = metadata.size,
        "incremental index started"
    );
    scan(builder, source, metadata, config, cancel, on_progress)
}

fn scan(
    mut builder: IndexBuilder,
    source: &dyn ByteSource,
    metadata: SourceMetadata,
    config: &IndexConfig,
    cancel: &CancelToken,
    mut on_progress: impl FnMut(u8),
) -> Result<Outcome<IndexedFile>, IndexError> {
    let target = metadata.size;
    let start = builder.scan_position();
    let block = config.effective_block_bytes() as u64;
    let mut reported = None;

    while builder.scan_position() < target {
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let position = builder.scan_position();
        let block_end = target.min(position + block);
        let bytes = read_with_retry(source, position, block_end, config)?;
        if bytes.is_empty() {
            // Shrunk while we were reading; index what we have
            tracing::debug!(position, target, "source ended before expected size");
            break;
        }
        builder.feed(&bytes)?;

        let done = percent(builder.scan_position() - start, target - start);
        if reported != Some(done) {
            on_progress(done);
            reported = Some(done);
        }
    }

    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }
    if reported.is_none() {
        on_progress(100);
    }
    builder.finish(Some(metadata)).map(Outcome::Completed)
}

/// Read `[start, end)`, retrying failed reads up to `config.read_retries` times
pub(crate) fn read_with_retry(
    source: &dyn ByteSource,
    start: u64,
    end: u64,
    config: &IndexConfig,
) -> Result<Vec<u8>, IndexError> {
    let mut attempt = 0;
    loop {
        match source.read_range(start, end) {
            Ok(bytes) => return Ok(bytes),
            Err(e) if attempt < config.read_retries => {
                attempt += 1;
                tracing::warn!(
                    path = %source.path().display(),
                    start,
                    attempt,
                    error = %e,
                    "read failed, retrying"
                );
                thread::sleep(Duration::from_millis(config.retry_delay_ms));
            }
            Err(e) => return Err(e),
        }
    }
}
