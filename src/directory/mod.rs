//! Transformation of class files on disk.
//!
//! [`transform_file`] handles one class file; [`DirectoryTransformer`] walks a directory tree,
//! transforms every class file into a mirrored output tree and copies everything else along.
//! Jars are handled by [`crate::JarTransformer`].
//!
//! An output file is staged next to its destination and only moved into place once it has
//! been written completely, so a failing class or a failing write never leaves a half-written
//! file behind.

mod report;

pub use report::TransformReport;
pub(crate) use report::Outcome;

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use rayon::prelude::*;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::{
    classfile::{
        hierarchy::{read_entry, walk_error},
        ClassHierarchy,
    },
    config::TransformConfig,
    transform_class_with, Error, File, Result,
};

/// Transform the class file at `input` and write the result to `output`.
///
/// The input is memory-mapped. Missing parent directories of `output` are created. Frames are
/// computed against the platform classes only; use [`transform_file_with`] or a
/// [`DirectoryTransformer`] with a [`TransformConfig::classpath`] when the class refers to
/// classes of its own.
///
/// # Errors
/// Returns [`Error::Path`] naming `input` if it cannot be read or transformed, and naming
/// `output` if the result cannot be written.
pub fn transform_file(input: &Path, output: &Path) -> Result<()> {
    transform_file_with(input, output, ClassHierarchy::jdk())
}

/// Like [`transform_file`], resolving frame merges against `hierarchy`.
///
/// # Errors
/// Same as [`transform_file`].
pub fn transform_file_with(
    input: &Path,
    output: &Path,
    hierarchy: Arc<ClassHierarchy>,
) -> Result<()> {
    let transformed = File::from_file(input)
        .and_then(|file| transform_class_with(file.data(), hierarchy))
        .map_err(|error| error.at_path(input))?;

    write_output(output, &transformed)
}

/// Write `data` to `output` through a temporary file in the same directory.
pub(crate) fn write_output(output: &Path, data: &[u8]) -> Result<()> {
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|error| Error::FileError(error).at_path(parent))?;

    let mut staged =
        NamedTempFile::new_in(parent).map_err(|error| Error::FileError(error).at_path(parent))?;
    staged
        .write_all(data)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|error| Error::FileError(error).at_path(output))?;
    publish(staged, output)
}

/// Move a completely written temporary file to `output`.
pub(crate) fn publish(staged: NamedTempFile, output: &Path) -> Result<()> {
    // Temporary files are created owner-only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        staged
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(|error| Error::FileError(error).at_path(output))?;
    }
    staged
        .persist(output)
        .map_err(|error| Error::FileError(error.error).at_path(output))?;
    Ok(())
}

/// The platform classes plus everything on the configured classpath.
pub(crate) fn classpath_hierarchy(config: &TransformConfig) -> Result<ClassHierarchy> {
    let mut hierarchy = ClassHierarchy::with_jdk();
    for entry in &config.classpath {
        let added = hierarchy.add_classpath_entry(entry)?;
        log::debug!("{}: {} classes on the classpath", entry.display(), added);
    }
    Ok(hierarchy)
}

/// Record the header of a class about to be transformed; unreadable classes fail later.
pub(crate) fn index_input(hierarchy: &mut ClassHierarchy, name: &Path, bytes: &[u8]) {
    match read_entry(bytes) {
        Ok((class, entry)) => hierarchy.insert(class, entry),
        Err(error) => log::debug!("{}: not indexed: {}", name.display(), error),
    }
}

/// Mirrors a directory of class files into an output directory, adding shadow methods.
///
/// Relative paths are preserved. Files are processed in parallel on the `rayon` pool unless
/// [`TransformConfig::parallel`] is off; the report lists them in walk order either way.
/// Symbolic links are not followed.
///
/// Before transforming, the headers of all input classes and of the
/// [`TransformConfig::classpath`] are indexed, so frames that merge two of these classes get
/// their real common superclass.
///
/// # Examples
///
/// ```rust,no_run
/// use shadowclass::{DirectoryTransformer, TransformConfig};
///
/// let report = DirectoryTransformer::new("build/classes", "build/shadowed", TransformConfig::new())?
///     .run()?;
/// assert!(report.is_complete_success());
/// # Ok::<(), shadowclass::Error>(())
/// ```
pub struct DirectoryTransformer {
    input: PathBuf,
    output: PathBuf,
    config: TransformConfig,
}

impl DirectoryTransformer {
    /// Prepare a run from `input` into `output`.
    ///
    /// `output` is created if it does not exist.
    ///
    /// # Errors
    /// Returns an error if `input` is not a directory, if `output` exists but is not a
    /// directory, or if `output` lies inside `input` (the walk would pick up its own results).
    pub fn new(
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        config: TransformConfig,
    ) -> Result<Self> {
        let input = input.as_ref();
        let output = output.as_ref();
        if !input.is_dir() {
            return Err(Error::Error(format!(
                "Input is not a directory: {}",
                input.display()
            )));
        }
        if output.exists() && !output.is_dir() {
            return Err(Error::Error(format!(
                "Output is not a directory: {}",
                output.display()
            )));
        }
        fs::create_dir_all(output).map_err(|error| Error::FileError(error).at_path(output))?;

        let input = input
            .canonicalize()
            .map_err(|error| Error::FileError(error).at_path(input))?;
        let output = output
            .canonicalize()
            .map_err(|error| Error::FileError(error).at_path(output))?;
        if output.starts_with(&input) {
            return Err(Error::Error(format!(
                "Output directory {} lies inside the input directory {}",
                output.display(),
                input.display()
            )));
        }

        Ok(DirectoryTransformer {
            input,
            output,
            config,
        })
    }

    /// The configuration of this run.
    #[must_use]
    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Process every file below the input directory.
    ///
    /// # Errors
    /// Returns an error if the input tree or a classpath entry cannot be read. With
    /// [`TransformConfig::fail_fast`] the first failing file aborts the run and its error is
    /// returned; otherwise failures are collected in [`TransformReport::failed`].
    pub fn run(&self) -> Result<TransformReport> {
        let mut files = collect_files(&self.input)?;
        files.sort();
        log::debug!(
            "{}: {} files found",
            self.input.display(),
            files.len()
        );
        let hierarchy = Arc::new(self.hierarchy(&files)?);

        let fail_fast = self.config.fail_fast;
        let process = |path: &PathBuf| match self.process(path, &hierarchy) {
            Outcome::Failed(error) if fail_fast => Err(error),
            outcome => Ok(outcome),
        };
        let outcomes = if self.config.parallel {
            files.par_iter().map(process).collect::<Result<Vec<_>>>()?
        } else {
            files.iter().map(process).collect::<Result<Vec<_>>>()?
        };

        let mut report = TransformReport::default();
        for (path, outcome) in files.into_iter().zip(outcomes) {
            let relative = path
                .strip_prefix(&self.input)
                .map(Path::to_path_buf)
                .unwrap_or(path);
            if let Outcome::Failed(error) = &outcome {
                log::warn!("{error}");
            }
            report.record(relative, outcome);
        }

        log::info!(
            "{} classes transformed, {} files copied, {} failed",
            report.transformed_count(),
            report.copied_count(),
            report.failure_count()
        );
        Ok(report)
    }

    fn hierarchy(&self, files: &[PathBuf]) -> Result<ClassHierarchy> {
        let mut hierarchy = classpath_hierarchy(&self.config)?;
        for path in files.iter().filter(|path| self.config.is_class_file(path)) {
            if let Ok(bytes) = fs::read(path) {
                index_input(&mut hierarchy, path, &bytes);
            }
        }
        Ok(hierarchy)
    }

    fn process(&self, path: &Path, hierarchy: &Arc<ClassHierarchy>) -> Outcome {
        let Ok(relative) = path.strip_prefix(&self.input) else {
            return Outcome::Failed(Error::Error(format!(
                "{} is outside the input directory",
                path.display()
            )));
        };
        let target = self.output.join(relative);

        if self.config.is_class_file(path) {
            log::debug!("transforming {}", relative.display());
            match transform_file_with(path, &target, Arc::clone(hierarchy)) {
                Ok(()) => Outcome::Transformed,
                Err(error) => Outcome::Failed(error),
            }
        } else if self.config.copy_resources {
            let copied = fs::read(path)
                .map_err(|error| Error::FileError(error).at_path(path))
                .and_then(|data| write_output(&target, &data));
            match copied {
                Ok(()) => Outcome::Copied,
                Err(error) => Outcome::Failed(error),
            }
        } else {
            Outcome::Skipped
        }
    }
}

fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|error| walk_error(root, error))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
