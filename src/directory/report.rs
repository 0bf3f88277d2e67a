//! Outcome of a directory or jar run.

use std::path::PathBuf;

use crate::Error;

/// What a [`crate::DirectoryTransformer`] or [`crate::JarTransformer`] run did, path by path.
///
/// Paths are relative to the input (and output) root, or jar entry names, and are listed in
/// walk or entry order.
///
/// # Usage
///
/// ```rust,no_run
/// use shadowclass::{DirectoryTransformer, TransformConfig};
///
/// # fn main() -> shadowclass::Result<()> {
/// let report = DirectoryTransformer::new("classes", "shadowed", TransformConfig::diagnostic())?
///     .run()?;
/// for (path, error) in &report.failed {
///     eprintln!("{}: {error}", path.display());
/// }
/// println!("{} classes transformed", report.transformed_count());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct TransformReport {
    /// Class files written with their shadows
    pub transformed: Vec<PathBuf>,
    /// Other files copied unchanged
    pub copied: Vec<PathBuf>,
    /// Files that could not be processed; nothing was written for them
    pub failed: Vec<(PathBuf, Error)>,
    /// Files that were neither transformed nor copied
    pub skipped: Vec<PathBuf>,
}

impl TransformReport {
    /// Whether every file was processed.
    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Whether any file failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Number of class files transformed.
    #[must_use]
    pub fn transformed_count(&self) -> usize {
        self.transformed.len()
    }

    /// Number of files copied unchanged.
    #[must_use]
    pub fn copied_count(&self) -> usize {
        self.copied.len()
    }

    /// Number of failed files.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    pub(crate) fn record(&mut self, path: PathBuf, outcome: Outcome) {
        match outcome {
            Outcome::Transformed => self.transformed.push(path),
            Outcome::Copied => self.copied.push(path),
            Outcome::Skipped => self.skipped.push(path),
            Outcome::Failed(error) => self.failed.push((path, error)),
        }
    }
}

/// What happened to a single file.
#[derive(Debug)]
pub(crate) enum Outcome {
    Transformed,
    Copied,
    Skipped,
    Failed(Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_follow_the_recorded_outcomes() {
        let mut report = TransformReport::default();
        assert!(report.is_complete_success());

        report.record(PathBuf::from("a/A.class"), Outcome::Transformed);
        report.record(PathBuf::from("a/B.class"), Outcome::Transformed);
        report.record(PathBuf::from("README"), Outcome::Copied);
        report.record(PathBuf::from("notes.txt"), Outcome::Skipped);
        report.record(PathBuf::from("bad.class"), Outcome::Failed(Error::NotSupported));

        assert_eq!(report.transformed_count(), 2);
        assert_eq!(report.copied_count(), 1);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.skipped, vec![PathBuf::from("notes.txt")]);
        assert!(report.has_failures());
        assert!(!report.is_complete_success());
    }
}
