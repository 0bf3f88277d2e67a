//! Input abstraction for class-file bytes.
//!
//! Class files reach the codec either from disk or from an in-memory buffer (for example one
//! produced by a previous transformation, or extracted by a caller from an archive). The
//! [`crate::file::Backend`] trait hides that difference; [`crate::file::File`] is the owning
//! handle the rest of the crate works with.
//!
//! # Key Components
//!
//! - [`crate::file::File`] - Owned handle over a class-file byte buffer
//! - [`crate::file::Backend`] - Trait for data sources
//! - [`crate::file::physical::Physical`] - Memory-mapped file backend
//! - [`crate::file::memory::Memory`] - In-memory buffer backend
//! - [`crate::file::parser::Parser`] - Bounds-checked big-endian cursor
//! - [`crate::file::io`] - Big-endian read/write helpers
//!
//! # Examples
//!
//! ```rust
//! use shadowclass::File;
//!
//! let file = File::from_mem(vec![0xCA, 0xFE, 0xBA, 0xBE])?;
//! assert_eq!(file.len(), 4);
//! assert_eq!(&file.data()[..2], &[0xCA, 0xFE]);
//! # Ok::<(), shadowclass::Error>(())
//! ```

pub mod io;
pub mod memory;
pub mod parser;
pub mod physical;

use std::path::{Path, PathBuf};

use crate::{
    Error::Empty,
    Result,
};
use memory::Memory;
use physical::Physical;

/// A source of raw bytes for the codec.
///
/// Only [`Backend::data`] is required; the length is derived from it. The reader borrows the
/// whole buffer for the duration of a parse.
pub trait Backend: Send + Sync {
    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize {
        self.data().len()
    }
}

/// An owned class-file buffer, loaded from disk or memory.
pub struct File {
    data: Box<dyn Backend>,
    path: Option<PathBuf>,
}

impl File {
    /// Memory-map the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped, and
    /// [`crate::Error::Empty`] if it has no content.
    pub fn from_file(path: &Path) -> Result<File> {
        let physical = Physical::new(path)?;
        if physical.len() == 0 {
            return Err(Empty);
        }

        Ok(File {
            data: Box::new(physical),
            path: Some(path.to_path_buf()),
        })
    }

    /// Take ownership of an in-memory buffer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] if `data` is empty.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        if data.is_empty() {
            return Err(Empty);
        }

        Ok(File {
            data: Box::new(Memory::new(data)),
            path: None,
        })
    }

    /// The complete buffer.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Length of the buffer in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false` for a constructed `File`; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// The path this file was loaded from, if it came from disk.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_mem_rejects_empty() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Empty)));
    }

    #[test]
    fn from_mem_exposes_data() -> Result<()> {
        let file = File::from_mem(vec![1, 2, 3])?;
        assert_eq!(file.len(), 3);
        assert!(!file.is_empty());
        assert_eq!(file.data(), &[1, 2, 3]);
        assert!(file.path().is_none());
        Ok(())
    }

    #[test]
    fn from_file_rejects_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("Empty.class");
        std::fs::write(&path, b"")?;
        assert!(matches!(File::from_file(&path), Err(Empty)));
        Ok(())
    }

    #[test]
    fn from_file_keeps_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("Some.class");
        std::fs::write(&path, [0xCA, 0xFE, 0xBA, 0xBE])?;

        let file = File::from_file(&path)?;
        assert_eq!(file.path(), Some(path.as_path()));
        assert_eq!(file.data(), &[0xCA, 0xFE, 0xBA, 0xBE]);
        Ok(())
    }
}
