//! File operations for CPD.
//!
//! This module handles:
//! - The shared-file descriptor captured at session start
//! - Sequential chunked reads for streaming (memory-bounded)
//! - Whole-file checksums
//! - Collision-free target naming on the receiving side

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tokio::io::AsyncReadExt;
use xxhash_rust::xxh64::Xxh64;

use crate::error::{Error, Result};

/// Descriptor of the file a session shares.
///
/// Captured once at session start and immutable afterwards. The recorded
/// size must equal the length of the byte stream actually transmitted;
/// the receiver treats any disagreement as a failed transfer.
#[derive(Debug, Clone)]
pub struct SharedFile {
    /// Absolute or operator-supplied path to the file
    pub path: PathBuf,
    /// Name advertised to peers (final path component)
    pub display_name: String,
    /// Size in bytes at session start
    pub size: u64,
}

impl SharedFile {
    /// Capture a descriptor for the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if the path does not exist and
    /// [`Error::NotAFile`] if it is not a regular file.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let metadata = std::fs::metadata(&path)
            .map_err(|_| Error::FileNotFound(path.display().to_string()))?;

        if !metadata.is_file() {
            return Err(Error::NotAFile(path.display().to_string()));
        }

        let display_name = path
            .file_name()
            .and_then(OsStr::to_str)
            .map(ToString::to_string)
            .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;

        Ok(Self {
            path,
            display_name,
            size: metadata.len(),
        })
    }

    /// Number of chunks a stream of this file will use.
    ///
    /// Zero-byte files still occupy one (empty, final) chunk so the
    /// receiver always sees a last-chunk marker.
    #[must_use]
    pub fn chunk_count(&self, chunk_size: usize) -> u64 {
        if self.size == 0 {
            return 1;
        }
        self.size.div_ceil(chunk_size as u64)
    }

    /// Compute the xxHash64 of the file content, reading it in
    /// `chunk_size` steps rather than loading it whole.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn checksum(&self, chunk_size: usize) -> Result<u64> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let mut hasher = Xxh64::new(0);
        let mut buf = vec![0u8; chunk_size];

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(hasher.digest())
    }

    /// Open the file for a fresh sequential chunked read.
    ///
    /// Each peer handler opens its own reader, so concurrent transfers of
    /// the same file never share a file cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub async fn open_chunked(&self, chunk_size: usize) -> Result<ChunkReader> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(ChunkReader {
            file,
            chunk_size,
            remaining: self.size,
            sequence: 0,
        })
    }
}

/// Sequential chunked reader over a shared file.
#[derive(Debug)]
pub struct ChunkReader {
    file: tokio::fs::File,
    chunk_size: usize,
    remaining: u64,
    sequence: u64,
}

impl ChunkReader {
    /// Read the next chunk.
    ///
    /// Returns `(sequence, last, data)`, or `None` once the final chunk
    /// has been produced. A zero-byte file yields exactly one empty final
    /// chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the file was truncated since
    /// the descriptor was captured.
    pub async fn next_chunk(&mut self) -> Result<Option<(u64, bool, Vec<u8>)>> {
        if self.sequence > 0 && self.remaining == 0 {
            return Ok(None);
        }

        #[allow(clippy::cast_possible_truncation)]
        let want = self.remaining.min(self.chunk_size as u64) as usize;
        let mut data = vec![0u8; want];
        if want > 0 {
            self.file.read_exact(&mut data).await.map_err(|_| {
                Error::ProtocolError("file shrank while streaming".to_string())
            })?;
        }

        self.remaining -= want as u64;
        let sequence = self.sequence;
        self.sequence += 1;

        Ok(Some((sequence, self.remaining == 0, data)))
    }
}

/// Resolve a collision-free target path for `file_name` inside `dir`.
///
/// Any directory components in `file_name` are discarded, so a hostile
/// sender cannot steer the write outside `dir`. Existing names get a
/// numeric suffix before the extension (`report.pdf` → `report_1.pdf`,
/// `report_2.pdf`, ...) until an unused name is found; an existing local
/// file is never overwritten.
///
/// # Errors
///
/// Returns [`Error::InvalidPath`] if `file_name` has no usable final
/// component.
pub fn unique_target_path(dir: &Path, file_name: &str) -> Result<PathBuf> {
    let bare = Path::new(file_name)
        .file_name()
        .and_then(OsStr::to_str)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .ok_or_else(|| Error::InvalidPath(file_name.to_string()))?;

    let candidate = dir.join(bare);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let (stem, extension) = match bare.rsplit_once('.') {
        // A leading dot is a hidden file, not an extension.
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (bare, None),
    };

    for counter in 1u32.. {
        let name = match extension {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    unreachable!("u32 counter space exhausted");
}

/// Format a byte count for humans.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{size:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = SharedFile::from_path("/definitely/not/here.bin").unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_from_path_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = SharedFile::from_path(dir.path()).unwrap_err();
        assert!(matches!(err, Error::NotAFile(_)));
    }

    #[test]
    fn test_from_path_captures_name_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "notes.txt", b"hello cpd");

        let file = SharedFile::from_path(&path).unwrap();
        assert_eq!(file.display_name, "notes.txt");
        assert_eq!(file.size, 9);
    }

    #[test]
    fn test_chunk_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "data.bin", &[0u8; 2500]);
        let file = SharedFile::from_path(&path).unwrap();

        assert_eq!(file.chunk_count(1000), 3);
        assert_eq!(file.chunk_count(2500), 1);
        assert_eq!(file.chunk_count(4096), 1);
    }

    #[test]
    fn test_chunk_count_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "empty", b"");
        let file = SharedFile::from_path(&path).unwrap();
        assert_eq!(file.chunk_count(1024), 1);
    }

    #[tokio::test]
    async fn test_chunked_read_reassembles() {
        let dir = tempfile::tempdir().unwrap();
        let content: Vec<u8> = (0..=255u8).cycle().take(2500).collect();
        let path = write_file(dir.path(), "data.bin", &content);
        let file = SharedFile::from_path(&path).unwrap();

        let mut reader = file.open_chunked(1000).await.unwrap();
        let mut collected = Vec::new();
        let mut sequences = Vec::new();
        let mut saw_last = false;

        while let Some((sequence, last, data)) = reader.next_chunk().await.unwrap() {
            sequences.push(sequence);
            collected.extend_from_slice(&data);
            saw_last = last;
        }

        assert_eq!(sequences, vec![0, 1, 2]);
        assert!(saw_last);
        assert_eq!(collected, content);
    }

    #[tokio::test]
    async fn test_empty_file_yields_one_final_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "empty", b"");
        let file = SharedFile::from_path(&path).unwrap();

        let mut reader = file.open_chunked(1024).await.unwrap();
        let (sequence, last, data) = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(sequence, 0);
        assert!(last);
        assert!(data.is_empty());
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_checksum_stable_across_chunk_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "data.bin", &[7u8; 5000]);
        let file = SharedFile::from_path(&path).unwrap();

        let a = file.checksum(512).await.unwrap();
        let b = file.checksum(4096).await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unique_target_path_no_collision() {
        let dir = tempfile::tempdir().unwrap();
        let path = unique_target_path(dir.path(), "report.pdf").unwrap();
        assert_eq!(path, dir.path().join("report.pdf"));
    }

    #[test]
    fn test_unique_target_path_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "report.pdf", b"first");

        let second = unique_target_path(dir.path(), "report.pdf").unwrap();
        assert_eq!(second, dir.path().join("report_1.pdf"));

        write_file(dir.path(), "report_1.pdf", b"second");
        let third = unique_target_path(dir.path(), "report.pdf").unwrap();
        assert_eq!(third, dir.path().join("report_2.pdf"));

        // The original is untouched.
        assert_eq!(std::fs::read(dir.path().join("report.pdf")).unwrap(), b"first");
    }

    #[test]
    fn test_unique_target_path_no_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "Makefile", b"all:");
        let path = unique_target_path(dir.path(), "Makefile").unwrap();
        assert_eq!(path, dir.path().join("Makefile_1"));
    }

    #[test]
    fn test_unique_target_path_strips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = unique_target_path(dir.path(), "../../etc/passwd").unwrap();
        assert_eq!(path, dir.path().join("passwd"));
    }

    #[test]
    fn test_unique_target_path_rejects_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(unique_target_path(dir.path(), "").is_err());
        assert!(unique_target_path(dir.path(), "..").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }
}
