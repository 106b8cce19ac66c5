//! File I/O
//!
//! Streams G-code files line by line. Bytes that are not valid UTF-8 are
//! decoded lossily so a stray byte in a slicer comment does not abort a load.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use printlink_core::GcodeError;
use serde::{Deserialize, Serialize};

/// Buffer size for reading large files (256 KB)
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Supported file encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileEncoding {
    /// UTF-8 encoding
    Utf8,
    /// Anything else; decoded lossily
    Lossy,
}

impl FileEncoding {
    /// Detect encoding from file bytes
    pub fn detect(data: &[u8]) -> Self {
        if std::str::from_utf8(data).is_ok() {
            FileEncoding::Utf8
        } else {
            FileEncoding::Lossy
        }
    }
}

/// File read statistics
#[derive(Debug, Clone)]
pub struct FileReadStats {
    /// Total bytes read
    pub bytes_read: u64,
    /// Total lines read
    pub lines_read: u64,
    /// Lossy if any line needed replacement characters
    pub encoding: FileEncoding,
    /// File size in bytes
    pub file_size: u64,
    /// Time taken to read (milliseconds)
    pub read_time_ms: u64,
}

/// G-code file reader with streaming support
pub struct GcodeFileReader {
    path: PathBuf,
    file_size: u64,
}

impl GcodeFileReader {
    /// Create a new G-code file reader
    ///
    /// # Errors
    /// Returns error if file does not exist or is not a regular file
    pub fn new(path: impl AsRef<Path>) -> Result<Self, GcodeError> {
        let path = path.as_ref().to_path_buf();

        if !path.is_file() {
            return Err(GcodeError::FileError {
                reason: format!("Not a readable file: {}", path.display()),
            });
        }

        let file_size = fs::metadata(&path).map_err(file_error)?.len();
        Ok(Self { path, file_size })
    }

    /// Get file size in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Get file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file line by line. `\r\n` and `\n` endings are removed.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or the callback fails
    pub fn read_lines<F>(&self, mut callback: F) -> Result<FileReadStats, GcodeError>
    where
        F: FnMut(&str) -> Result<(), GcodeError>,
    {
        let started = Instant::now();
        let file = File::open(&self.path).map_err(file_error)?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut lines_read = 0u64;
        let mut bytes_read = 0u64;
        let mut encoding = FileEncoding::Utf8;
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            let read = reader.read_until(b'\n', &mut buffer).map_err(file_error)?;
            if read == 0 {
                break;
            }
            bytes_read += read as u64;

            if FileEncoding::detect(&buffer) == FileEncoding::Lossy {
                encoding = FileEncoding::Lossy;
            }
            let line = String::from_utf8_lossy(&buffer);
            let line = line.trim_end_matches('\n').trim_end_matches('\r');

            callback(line)?;
            lines_read += 1;
        }

        if encoding == FileEncoding::Lossy {
            tracing::warn!("{} contains non-UTF-8 bytes", self.path.display());
        }

        Ok(FileReadStats {
            bytes_read,
            lines_read,
            encoding,
            file_size: self.file_size,
            read_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn file_error(err: std::io::Error) -> GcodeError {
    GcodeError::FileError {
        reason: err.to_string(),
    }
}
