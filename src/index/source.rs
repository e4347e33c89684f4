//! Byte sources the indexer and search engine read from.
//!
//! [`ByteSource`] is the only way the core touches file content. Three
//! implementations are provided:
//!
//! - [`LocalFile`] - reads a path, reopening it when the file is rotated
//! - [`MappedFile`] - memory-maps a file that is not being rewritten
//! - [`MemorySource`] - an in-memory buffer that can grow, shrink or be replaced

use crate::error::IndexError;
use memmap2::Mmap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

/// What makes a file the same file across renames and rewrites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileIdentity {
    /// Device and inode numbers
    Inode { device: u64, inode: u64 },
    /// Creation time, where inodes are not available
    Created(SystemTime),
    /// Counter owned by an in-memory source
    Token(u64),
    Unknown,
}

impl FileIdentity {
    fn from_metadata(metadata: &fs::Metadata) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            FileIdentity::Inode {
                device: metadata.dev(),
                inode: metadata.ino(),
            }
        }
        #[cfg(not(unix))]
        {
            metadata
                .created()
                .map(FileIdentity::Created)
                .unwrap_or(FileIdentity::Unknown)
        }
    }
}

/// Size and identity of a source at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMetadata {
    pub size: u64,
    pub identity: FileIdentity,
    pub modified: Option<SystemTime>,
}

impl SourceMetadata {
    fn from_fs(metadata: &fs::Metadata) -> Self {
        Self {
            size: metadata.len(),
            identity: FileIdentity::from_metadata(metadata),
            modified: metadata.modified().ok(),
        }
    }
}

/// Random-access reads of a (possibly growing) file
pub trait ByteSource: Send + Sync {
    /// Path used in error messages
    fn path(&self) -> &Path;

    /// Current size and identity
    fn metadata(&self) -> Result<SourceMetadata, IndexError>;

    /// Read up to `buf.len()` bytes at `offset`; returns 0 at end of file
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, IndexError>;

    /// Read the bytes in `[start, end)`.
    ///
    /// The result is shorter than requested when the file ends first, which
    /// happens when it is truncated while being read.
    fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>, IndexError> {
        let len = usize::try_from(end.saturating_sub(start)).unwrap_or(usize::MAX);
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let read = self.read_at(start + filled as u64, &mut buf[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

struct OpenFile {
    file: File,
    identity: FileIdentity,
}

/// A file read through a regular handle.
///
/// The handle is dropped and reopened by path when [`ByteSource::metadata`]
/// sees that the file at the path is no longer the one held open.
pub struct LocalFile {
    path: PathBuf,
    handle: Mutex<Option<OpenFile>>,
}

impl LocalFile {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let path = path.into();
        let open = Self::open_handle(&path)?;
        Ok(Self {
            path,
            handle: Mutex::new(Some(open)),
        })
    }

    fn open_handle(path: &Path) -> Result<OpenFile, IndexError> {
        let file = File::open(path).map_err(|e| IndexError::unreadable(path, e))?;
        let metadata = file.metadata().map_err(|e| IndexError::unreadable(path, e))?;
        Ok(OpenFile {
            file,
            identity: FileIdentity::from_metadata(&metadata),
        })
    }
}

impl ByteSource for LocalFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn metadata(&self) -> Result<SourceMetadata, IndexError> {
        let metadata = fs::metadata(&self.path).map_err(|e| IndexError::unreadable(&self.path, e))?;
        let current = SourceMetadata::from_fs(&metadata);

        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.as_ref().is_some_and(|open| open.identity != current.identity) {
            tracing::debug!(path = %self.path.display(), "file replaced, reopening");
            *handle = None;
        }
        Ok(current)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, IndexError> {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.is_none() {
            *handle = Some(Self::open_handle(&self.path)?);
        }
        let Some(open) = handle.as_mut() else {
            return Ok(0);
        };

        let read = open
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| open.file.read(buf));
        read.map_err(|e| IndexError::unreadable(&self.path, e))
    }
}

/// A memory-mapped file.
///
/// Suited to files that only grow or stay put; the map is refreshed when
/// [`ByteSource::metadata`] reports a new size. Rotation is not followed.
pub struct MappedFile {
    path: PathBuf,
    file: File,
    map: RwLock<Option<Mmap>>,
}

impl MappedFile {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let path = path.into();
        let file = File::open(&path).map_err(|e| IndexError::unreadable(&path, e))?;
        let map = Self::map_file(&path, &file)?;
        Ok(Self {
            path,
            file,
            map: RwLock::new(map),
        })
    }

    fn map_file(path: &Path, file: &File) -> Result<Option<Mmap>, IndexError> {
        let len = file.metadata().map_err(|e| IndexError::unreadable(path, e))?.len();
        if len == 0 {
            // Zero-length maps are rejected on some platforms
            return Ok(None);
        }
        // SAFETY: the map is only read through bounds-checked slices and is
        // replaced whenever the size observed through metadata() changes.
        let map = unsafe { Mmap::map(file) }.map_err(|e| IndexError::unreadable(path, e))?;
        Ok(Some(map))
    }
}

impl ByteSource for MappedFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn metadata(&self) -> Result<SourceMetadata, IndexError> {
        let metadata = self
            .file
            .metadata()
            .map_err(|e| IndexError::unreadable(&self.path, e))?;
        let current = SourceMetadata::from_fs(&metadata);

        let mapped_len = self
            .map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |map| map.len() as u64);
        if mapped_len != current.size {
            let remapped = Self::map_file(&self.path, &self.file)?;
            *self.map.write().unwrap_or_else(PoisonError::into_inner) = remapped;
        }
        Ok(current)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, IndexError> {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        let Some(map) = map.as_ref() else {
            return Ok(0);
        };
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= map.len() {
            return Ok(0);
        }
        let end = map.len().min(start + buf.len());
        let chunk = &map[start..end];
        buf[..chunk.len()].copy_from_slice(chunk);
        Ok(chunk.len())
    }
}

/// An in-memory byte source.
///
/// Used for content that never lived on disk (piped input) and to drive
/// growth, truncation and rotation deterministically.
pub struct MemorySource {
    path: PathBuf,
    data: RwLock<Vec<u8>>,
    identity: AtomicU64,
    version: AtomicU64,
    /// Reads at or past this offset fail, for exercising retries
    fail_reads_from: RwLock<Option<(u64, u32)>>,
    read_delay_nanos: AtomicU64,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: PathBuf::from("<memory>"),
            data: RwLock::new(data.into()),
            identity: AtomicU64::new(0),
            version: AtomicU64::new(0),
            fail_reads_from: RwLock::new(None),
            read_delay_nanos: AtomicU64::new(0),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Append bytes, as a writer would
    pub fn append(&self, bytes: &[u8]) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Cut the content down to `len` bytes, keeping its identity
    pub fn truncate(&self, len: usize) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .truncate(len);
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Replace the content with a new file, as log rotation does
    pub fn rotate(&self, data: impl Into<Vec<u8>>) {
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = data.into();
        self.identity.fetch_add(1, Ordering::SeqCst);
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Make the next `times` reads at or past `offset` fail
    pub fn fail_reads(&self, offset: u64, times: u32) {
        *self.fail_reads_from.write().unwrap_or_else(PoisonError::into_inner) = Some((offset, times));
    }

    /// Sleep for `delay` before every read, like a slow disk
    pub fn slow_reads(&self, delay: Duration) {
        let nanos = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        self.read_delay_nanos.store(nanos, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_injected_failure(&self, offset: u64) -> bool {
        let mut failure = self.fail_reads_from.write().unwrap_or_else(PoisonError::into_inner);
        match failure.as_mut() {
            Some((from, remaining)) if offset >= *from && *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

impl ByteSource for MemorySource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn metadata(&self) -> Result<SourceMetadata, IndexError> {
        Ok(SourceMetadata {
            size: self.len() as u64,
            identity: FileIdentity::Token(self.identity.load(Ordering::SeqCst)),
            modified: SystemTime::UNIX_EPOCH
                .checked_add(Duration::from_nanos(self.version.load(Ordering::SeqCst))),
        })
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, IndexError> {
        let delay = self.read_delay_nanos.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_nanos(delay));
        }
        if self.take_injected_failure(offset) {
            return Err(IndexError::unreadable(
                &self.path,
                io::Error::new(io::ErrorKind::Interrupted, "injected read failure"),
            ));
        }

        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= data.len() {
            return Ok(0);
        }
        let end = data.len().min(start + buf.len());
        buf[..end - start].copy_from_slice(&data[start..end]);
        Ok(end - start)
    }
}
