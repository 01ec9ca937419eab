//! Reading and writing document files.
//!
//! Small files are read straight into memory; files at or above
//! [`MMAP_THRESHOLD`] are memory-mapped first.

// Memory mapping requires unsafe; the map is read-only and dropped before return
#![allow(unsafe_code)]

use crate::error::{IoError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Size at which reads switch to memory mapping (1 MiB).
pub const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Largest file accepted for ingestion (1 GiB).
pub const MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// An opened source file, validated for size.
///
/// # Examples
///
/// ```no_run
/// use ardharag::io::SourceFile;
///
/// let file = SourceFile::open("handbook.md").unwrap();
/// println!("{} bytes", file.size());
/// let text = file.read_text().unwrap();
/// ```
#[derive(Debug)]
pub struct SourceFile {
    file: File,
    size: u64,
    path: String,
}

impl SourceFile {
    /// Opens a file for reading.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::FileNotFound`] for missing paths and
    /// [`IoError::ReadFailed`] when the file cannot be opened or exceeds
    /// [`MAX_FILE_SIZE`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let path = path_ref.to_string_lossy().to_string();

        if !path_ref.is_file() {
            return Err(IoError::FileNotFound { path }.into());
        }

        let read_failed = |e: std::io::Error| IoError::ReadFailed {
            path: path.clone(),
            reason: e.to_string(),
        };
        let file = File::open(path_ref).map_err(read_failed)?;
        let size = file.metadata().map_err(read_failed)?.len();

        if size > MAX_FILE_SIZE {
            return Err(IoError::ReadFailed {
                path,
                reason: format!("file too large: {size} bytes (max: {MAX_FILE_SIZE} bytes)"),
            }
            .into());
        }

        Ok(Self { file, size, path })
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the path the file was opened with.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Reads the whole file as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or mapping fails, or if the content is
    /// not valid UTF-8.
    pub fn read_text(&self) -> Result<String> {
        let bytes = if self.size >= MMAP_THRESHOLD {
            self.read_mapped()?
        } else {
            self.read_direct()?
        };

        String::from_utf8(bytes).map_err(|e| {
            IoError::ReadFailed {
                path: self.path.clone(),
                reason: format!(
                    "invalid UTF-8 at byte {}",
                    e.utf8_error().valid_up_to()
                ),
            }
            .into()
        })
    }

    fn read_mapped(&self) -> Result<Vec<u8>> {
        // Safety: the mapping is read-only and copied out before it is dropped
        let mmap = unsafe {
            Mmap::map(&self.file).map_err(|e| IoError::MmapFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?
        };
        Ok(mmap.to_vec())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_direct(&self) -> Result<Vec<u8>> {
        let mut file = &self.file;
        let mut bytes = Vec::with_capacity(self.size as usize);
        file.read_to_end(&mut bytes).map_err(|e| IoError::ReadFailed {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        Ok(bytes)
    }
}

/// Reads a file as UTF-8 text.
///
/// # Errors
///
/// Returns an error if the file is missing, too large, unreadable, or not
/// valid UTF-8.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<String> {
    SourceFile::open(path)?.read_text()
}

/// Writes text to a file, creating parent directories if needed.
///
/// # Errors
///
/// Returns an error if directory creation or file writing fails.
pub fn write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    let path_ref = path.as_ref();

    if let Some(parent) = path_ref.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| IoError::DirectoryFailed {
            path: parent.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;
    }

    std::fs::write(path_ref, content).map_err(|e| IoError::WriteFailed {
        path: path_ref.to_string_lossy().to_string(),
        reason: e.to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    #[test]
    fn test_read_small_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("small.txt");
        std::fs::write(&file_path, "Hello, world!").unwrap();

        let file = SourceFile::open(&file_path).unwrap();
        assert_eq!(file.size(), 13);
        assert!(file.path().ends_with("small.txt"));
        assert_eq!(file.read_text().unwrap(), "Hello, world!");
    }

    #[test]
    fn test_read_large_file_uses_mapping() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("large.txt");
        let line = "Lorem ipsum dolor sit amet. ";
        let content = line.repeat((MMAP_THRESHOLD as usize / line.len()) + 10);
        std::fs::write(&file_path, &content).unwrap();

        let read = read_file(&file_path).unwrap();
        assert_eq!(read.len(), content.len());
        assert!(read.starts_with("Lorem ipsum"));
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_file("/nonexistent/definitely/missing.txt");
        assert!(matches!(
            result,
            Err(Error::Io(IoError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_read_directory_is_not_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = read_file(temp_dir.path());
        assert!(matches!(
            result,
            Err(Error::Io(IoError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_read_invalid_utf8() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("binary.bin");
        std::fs::write(&file_path, [b'o', b'k', 0xFF, 0xFE]).unwrap();

        let err = read_file(&file_path).unwrap_err();
        assert!(err.to_string().contains("invalid UTF-8 at byte 2"));
    }

    #[test]
    fn test_write_file_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("nested").join("dir").join("out.txt");

        write_file(&file_path, "written").unwrap();
        assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "written");
    }
}
