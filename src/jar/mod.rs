//! Transformation of jar archives.
//!
//! [`JarTransformer`] reads a jar (or a directory) completely, transforms every class entry
//! and writes the result as a jar (or a directory). Entries keep their order and names;
//! directory entries are preserved and other entries are copied unchanged unless
//! [`TransformConfig::copy_resources`] is off.
//!
//! A jar is staged next to its destination and only moved into place after the archive has
//! been finished, like the files written by [`crate::DirectoryTransformer`].

use std::{
    fs,
    io::{BufReader, Read, Seek, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use rayon::prelude::*;
use tempfile::NamedTempFile;
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::{
    classfile::{hierarchy::walk_error, ClassHierarchy},
    config::TransformConfig,
    directory::{classpath_hierarchy, index_input, publish, write_output, Outcome},
    transform_class_with, Error, File, Result, TransformReport,
};

/// Whether `path` names a jar, by its extension.
#[must_use]
pub fn is_jar(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("jar"))
}

/// One entry of an archive, in archive order.
struct Entry {
    /// `/`-separated name; directories end in `/`
    name: String,
    /// `None` for directories
    data: Option<Vec<u8>>,
}

impl Entry {
    fn path(&self) -> PathBuf {
        PathBuf::from(self.name.trim_end_matches('/'))
    }
}

/// An entry after processing: what to write, if anything, and what happened.
struct Processed {
    name: String,
    data: Option<Vec<u8>>,
    outcome: Option<Outcome>,
}

/// Adds shadow methods to the classes of a jar.
///
/// Either side may be a directory, but at least one must be a jar (a `.jar` extension). Class
/// entries are transformed in parallel on the `rayon` pool unless
/// [`TransformConfig::parallel`] is off. Entries that fail are left out of the output and
/// listed in [`TransformReport::failed`].
///
/// # Examples
///
/// ```rust,no_run
/// use shadowclass::{JarTransformer, TransformConfig};
///
/// let config = TransformConfig::new().with_classpath("lib/runtime.jar");
/// let report = JarTransformer::new("app.jar", "app-shadowed.jar", config)?.run()?;
/// println!("{} classes transformed", report.transformed_count());
/// # Ok::<(), shadowclass::Error>(())
/// ```
pub struct JarTransformer {
    input: PathBuf,
    output: PathBuf,
    config: TransformConfig,
}

impl JarTransformer {
    /// Prepare a run from `input` into `output`.
    ///
    /// # Errors
    /// Returns an error if neither path is a jar, if the input does not exist as the kind it
    /// names, if the output exists as the other kind, or if both name the same file.
    pub fn new(
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        config: TransformConfig,
    ) -> Result<Self> {
        let input = input.as_ref();
        let output = output.as_ref();
        if !is_jar(input) && !is_jar(output) {
            return Err(Error::Error(format!(
                "Neither {} nor {} is a jar",
                input.display(),
                output.display()
            )));
        }
        if is_jar(input) && !input.is_file() {
            return Err(Error::Error(format!("Input jar not found: {}", input.display())));
        }
        if !is_jar(input) && !input.is_dir() {
            return Err(Error::Error(format!(
                "Input is not a directory: {}",
                input.display()
            )));
        }
        if is_jar(output) && output.is_dir() {
            return Err(Error::Error(format!(
                "Output jar is a directory: {}",
                output.display()
            )));
        }
        if !is_jar(output) && output.exists() && !output.is_dir() {
            return Err(Error::Error(format!(
                "Output is not a directory: {}",
                output.display()
            )));
        }

        let input = input
            .canonicalize()
            .map_err(|error| Error::FileError(error).at_path(input))?;
        if output.canonicalize().is_ok_and(|output| output == input) {
            return Err(Error::Error(format!(
                "Input and output are the same: {}",
                input.display()
            )));
        }

        Ok(JarTransformer {
            input,
            output: output.to_path_buf(),
            config,
        })
    }

    /// The configuration of this run.
    #[must_use]
    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Transform every class entry and write the output.
    ///
    /// # Errors
    /// Returns an error if the input or a classpath entry cannot be read or the output cannot
    /// be written. With [`TransformConfig::fail_fast`] the first failing class aborts the run
    /// before anything is written.
    pub fn run(&self) -> Result<TransformReport> {
        let entries = if is_jar(&self.input) {
            let file = fs::File::open(&self.input)
                .map_err(|error| Error::FileError(error).at_path(&self.input))?;
            read_jar(BufReader::new(file)).map_err(|error| error.at_path(&self.input))?
        } else {
            read_directory(&self.input)?
        };
        log::debug!(
            "{}: {} entries found",
            self.input.display(),
            entries.len()
        );

        let mut hierarchy = classpath_hierarchy(&self.config)?;
        for entry in &entries {
            if let Some(data) = entry.data.as_deref().filter(|_| self.is_class(entry)) {
                index_input(&mut hierarchy, &entry.path(), data);
            }
        }
        let hierarchy = Arc::new(hierarchy);

        let fail_fast = self.config.fail_fast;
        let process = |entry: Entry| {
            let processed = self.process(entry, &hierarchy);
            match processed.outcome {
                Some(Outcome::Failed(error)) if fail_fast => {
                    Err(error.at_path(PathBuf::from(processed.name)))
                }
                _ => Ok(processed),
            }
        };
        let processed = if self.config.parallel {
            entries.into_par_iter().map(process).collect::<Result<Vec<_>>>()?
        } else {
            entries.into_iter().map(process).collect::<Result<Vec<_>>>()?
        };

        if is_jar(&self.output) {
            write_jar(&self.output, &processed)?;
        } else {
            write_directory(&self.output, &processed)?;
        }

        let mut report = TransformReport::default();
        for Processed { name, outcome, .. } in processed {
            let Some(outcome) = outcome else {
                continue;
            };
            if let Outcome::Failed(error) = &outcome {
                log::warn!("{name}: {error}");
            }
            report.record(PathBuf::from(name), outcome);
        }

        log::info!(
            "{} classes transformed, {} entries copied, {} failed",
            report.transformed_count(),
            report.copied_count(),
            report.failure_count()
        );
        Ok(report)
    }

    fn is_class(&self, entry: &Entry) -> bool {
        self.config.is_class_file(Path::new(&entry.name))
    }

    fn process(&self, entry: Entry, hierarchy: &Arc<ClassHierarchy>) -> Processed {
        let is_class = self.is_class(&entry);
        let Entry { name, data } = entry;
        let Some(data) = data else {
            return Processed {
                name,
                data: None,
                outcome: None,
            };
        };

        if is_class {
            log::debug!("transforming {name}");
            let transformed = File::from_mem(data)
                .and_then(|file| transform_class_with(file.data(), Arc::clone(hierarchy)));
            match transformed {
                Ok(transformed) => Processed {
                    name,
                    data: Some(transformed),
                    outcome: Some(Outcome::Transformed),
                },
                Err(error) => Processed {
                    name,
                    data: None,
                    outcome: Some(Outcome::Failed(error)),
                },
            }
        } else if self.config.copy_resources {
            Processed {
                name,
                data: Some(data),
                outcome: Some(Outcome::Copied),
            }
        } else {
            Processed {
                name,
                data: None,
                outcome: Some(Outcome::Skipped),
            }
        }
    }
}

impl Processed {
    fn is_directory(&self) -> bool {
        self.outcome.is_none()
    }
}

fn read_jar<R: Read + Seek>(source: R) -> Result<Vec<Entry>> {
    let mut archive = ZipArchive::new(source)?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.enclosed_name().is_none() {
            return Err(malformed_error!("Jar entry escapes the archive: {}", file.name()));
        }

        let name = file.name().to_string();
        if file.is_dir() {
            entries.push(Entry { name, data: None });
            continue;
        }
        let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        file.read_to_end(&mut data)?;
        entries.push(Entry {
            name,
            data: Some(data),
        });
    }
    Ok(entries)
}

fn read_directory(root: &Path) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|error| walk_error(root, error))?;
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            entries.push(Entry {
                name: format!("{name}/"),
                data: None,
            });
        } else if entry.file_type().is_file() {
            let data =
                fs::read(entry.path()).map_err(|error| Error::FileError(error).at_path(entry.path()))?;
            entries.push(Entry {
                name,
                data: Some(data),
            });
        }
    }
    Ok(entries)
}

fn write_jar(output: &Path, entries: &[Processed]) -> Result<()> {
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|error| Error::FileError(error).at_path(parent))?;
    let staged =
        NamedTempFile::new_in(parent).map_err(|error| Error::FileError(error).at_path(parent))?;

    let mut writer = ZipWriter::new(staged);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let written = entries.iter().try_for_each(|entry| -> Result<()> {
        if entry.is_directory() {
            writer.add_directory(entry.name.as_str(), options)?;
        } else if let Some(data) = &entry.data {
            writer.start_file(entry.name.as_str(), options)?;
            writer.write_all(data)?;
        }
        Ok(())
    });
    let staged = written
        .and_then(|()| writer.finish().map_err(Error::from))
        .map_err(|error| error.at_path(output))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|error| Error::FileError(error).at_path(output))?;
    publish(staged, output)
}

fn write_directory(output: &Path, entries: &[Processed]) -> Result<()> {
    fs::create_dir_all(output).map_err(|error| Error::FileError(error).at_path(output))?;
    for entry in entries {
        let target = output.join(entry.name.trim_end_matches('/'));
        if entry.is_directory() {
            fs::create_dir_all(&target).map_err(|error| Error::FileError(error).at_path(&target))?;
        } else if let Some(data) = &entry.data {
            write_output(&target, data)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{
        classfile::ClassReader,
        test::{multi_exit_class, single_method_class, Recorder},
    };

    fn methods(bytes: &[u8]) -> Result<Vec<String>> {
        let recorder = Recorder::default();
        ClassReader::new(bytes)?.accept(&mut recorder.clone())?;
        Ok(recorder
            .events()
            .into_iter()
            .filter(|event| event.starts_with("method "))
            .collect())
    }

    fn jar(entries: &[(&str, Option<&[u8]>)]) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in entries {
            match data {
                Some(data) => {
                    writer.start_file(*name, options)?;
                    writer.write_all(data)?;
                }
                None => writer.add_directory(*name, options)?,
            }
        }
        Ok(writer.finish()?.into_inner())
    }

    fn sample_jar(path: &Path) -> Result<()> {
        let widget = single_method_class()?;
        let switch = multi_exit_class()?;
        let bytes = jar(&[
            ("META-INF/", None),
            ("META-INF/MANIFEST.MF", Some(&b"Manifest-Version: 1.0\r\n"[..])),
            ("demo/", None),
            ("demo/Widget.class", Some(widget.as_slice())),
            ("demo/Switch.class", Some(switch.as_slice())),
        ])?;
        fs::write(path, bytes)?;
        Ok(())
    }

    fn names(path: &Path) -> Result<Vec<String>> {
        let mut archive = ZipArchive::new(fs::File::open(path)?)?;
        let mut names = Vec::new();
        for index in 0..archive.len() {
            names.push(archive.by_index(index)?.name().to_string());
        }
        Ok(names)
    }

    fn entry(path: &Path, name: &str) -> Result<Vec<u8>> {
        let mut archive = ZipArchive::new(fs::File::open(path)?)?;
        let mut data = Vec::new();
        archive.by_name(name)?.read_to_end(&mut data)?;
        Ok(data)
    }

    #[test]
    fn jar_detection() {
        assert!(is_jar(Path::new("lib/app.jar")));
        assert!(is_jar(Path::new("APP.JAR")));
        assert!(!is_jar(Path::new("classes")));
        assert!(!is_jar(Path::new("app.zip")));
    }

    #[test]
    fn jar_to_jar_keeps_entry_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("app.jar");
        let output = dir.path().join("out/app.jar");
        sample_jar(&input)?;

        let report = JarTransformer::new(&input, &output, TransformConfig::new())?.run()?;
        assert_eq!(
            report.transformed,
            vec![PathBuf::from("demo/Widget.class"), PathBuf::from("demo/Switch.class")]
        );
        assert_eq!(report.copied, vec![PathBuf::from("META-INF/MANIFEST.MF")]);
        assert!(report.is_complete_success());

        assert_eq!(names(&output)?, names(&input)?);
        assert_eq!(
            entry(&output, "META-INF/MANIFEST.MF")?,
            b"Manifest-Version: 1.0\r\n"
        );
        assert_eq!(
            methods(&entry(&output, "demo/Widget.class")?)?,
            vec!["method twice(I)I", "method twice(I)V"]
        );
        Ok(())
    }

    #[test]
    fn jar_unpacks_into_a_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("app.jar");
        let output = dir.path().join("classes");
        sample_jar(&input)?;

        let config = TransformConfig::new().with_parallel(false).with_resources(false);
        let report = JarTransformer::new(&input, &output, config)?.run()?;
        assert_eq!(report.transformed_count(), 2);
        assert_eq!(report.skipped, vec![PathBuf::from("META-INF/MANIFEST.MF")]);
        assert!(output.join("META-INF").is_dir());
        assert!(!output.join("META-INF/MANIFEST.MF").exists());
        assert_eq!(methods(&fs::read(output.join("demo/Switch.class"))?)?.len(), 7);
        Ok(())
    }

    #[test]
    fn directory_packs_into_a_jar() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("classes");
        fs::create_dir_all(input.join("demo"))?;
        fs::write(input.join("demo/Widget.class"), single_method_class()?)?;
        fs::write(input.join("notes.txt"), b"kept")?;
        let output = dir.path().join("packed.jar");

        let report = JarTransformer::new(&input, &output, TransformConfig::new())?.run()?;
        assert_eq!(report.transformed, vec![PathBuf::from("demo/Widget.class")]);
        assert_eq!(
            names(&output)?,
            vec!["demo/", "demo/Widget.class", "notes.txt"]
        );
        assert_eq!(entry(&output, "notes.txt")?, b"kept");
        Ok(())
    }

    #[test]
    fn failing_entries_are_left_out() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("broken.jar");
        let output = dir.path().join("shadowed.jar");
        let widget = single_method_class()?;
        fs::write(
            &input,
            jar(&[
                ("demo/Broken.class", Some(&b"nope"[..])),
                ("demo/Widget.class", Some(widget.as_slice())),
            ])?,
        )?;

        let fail_fast = JarTransformer::new(&input, &output, TransformConfig::new())?.run();
        assert!(matches!(
            fail_fast,
            Err(Error::Path { ref path, .. }) if path == Path::new("demo/Broken.class")
        ));
        assert!(!output.exists());

        let report = JarTransformer::new(&input, &output, TransformConfig::diagnostic())?.run()?;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, PathBuf::from("demo/Broken.class"));
        assert_eq!(names(&output)?, vec!["demo/Widget.class"]);
        Ok(())
    }

    #[test]
    fn escaping_entry_names_are_rejected() -> Result<()> {
        let bytes = jar(&[("../evil.class", Some(&b"x"[..]))])?;
        let result = read_jar(Cursor::new(bytes));
        assert!(matches!(result, Err(Error::Malformed { .. })));
        Ok(())
    }

    #[test]
    fn rejects_bad_pairs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let classes = dir.path().join("classes");
        fs::create_dir_all(&classes)?;
        let input = dir.path().join("app.jar");
        sample_jar(&input)?;

        assert!(JarTransformer::new(&classes, dir.path().join("out"), TransformConfig::new()).is_err());
        assert!(JarTransformer::new(dir.path().join("missing.jar"), &classes, TransformConfig::new()).is_err());
        assert!(JarTransformer::new(&input, &input, TransformConfig::new()).is_err());
        assert!(JarTransformer::new(&input, dir.path(), TransformConfig::new()).is_ok());
        Ok(())
    }
}
