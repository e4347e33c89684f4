use crate::index::types::IndexedFile;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Summary of one index snapshot
#[derive(Debug, Clone, Serialize)]
pub struct FileStats {
    pub path: PathBuf,
    pub size: u64,
    pub lines: u32,
    pub encoding: String,
    pub encoding_guessed: bool,
    pub max_line_length: i32,
    pub last_line_terminated: bool,
    pub generation: u64,
    pub offset_blocks: usize,
    #[serde(skip)]
    pub elapsed: Option<Duration>,
}

impl FileStats {
    pub fn collect(path: &Path, snapshot: &IndexedFile, elapsed: Option<Duration>) -> Self {
        Self {
            path: path.to_path_buf(),
            size: snapshot.indexed_size(),
            lines: snapshot.line_count().get(),
            encoding: snapshot.encoding().name().to_string(),
            encoding_guessed: snapshot.encoding_guessed(),
            max_line_length: snapshot.max_line_length().get(),
            last_line_terminated: snapshot.is_last_line_terminated(),
            generation: snapshot.generation().get(),
            offset_blocks: snapshot.offset_table().block_count(),
            elapsed,
        }
    }
}

impl fmt::Display for FileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Index Statistics")?;
        writeln!(f, "================")?;
        writeln!(f)?;
        writeln!(f, "File:             {}", self.path.display())?;
        writeln!(f, "Size:             {}", format_size(self.size))?;
        writeln!(f, "Lines:            {}", self.lines)?;
        let guessed = if self.encoding_guessed { " (guessed)" } else { "" };
        writeln!(f, "Encoding:         {}{}", self.encoding, guessed)?;
        writeln!(f, "Longest line:     {}", self.max_line_length)?;
        let ending = if self.last_line_terminated {
            "terminated"
        } else {
            "partial"
        };
        writeln!(f, "Last line:        {}", ending)?;
        writeln!(f, "Generation:       {}", self.generation)?;
        writeln!(f, "Offset blocks:    {}", self.offset_blocks)?;
        if let Some(elapsed) = self.elapsed {
            writeln!(f, "Indexed in:       {:.2?}", elapsed)?;
        }
        Ok(())
    }
}

/// Format byte size to human readable
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build::index_full;
    use crate::index::source::MemorySource;
    use crate::index::types::IndexConfig;
    use crate::utils::cancel::CancelToken;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(12), "12 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_collect_and_display() {
        let source = MemorySource::new(b"short\na longer line\ntail".to_vec());
        let file = index_full(&source, &IndexConfig::default(), None, &CancelToken::new(), |_| {})
            .unwrap()
            .completed()
            .unwrap();

        let stats = FileStats::collect(Path::new("app.log"), &file, None);
        assert_eq!(stats.lines, 3);
        assert_eq!(stats.max_line_length, 13);
        assert!(!stats.last_line_terminated);
        assert_eq!(stats.encoding, "UTF-8");

        let text = stats.to_string();
        assert!(text.contains("Lines:            3"));
        assert!(text.contains("partial"));
        assert!(!text.contains("Indexed in"));
    }
}
