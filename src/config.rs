//! Configuration for directory transformations.
//!
//! The per-class operation [`crate::transform_class`] takes no options; everything here
//! controls how [`crate::DirectoryTransformer`] and [`crate::JarTransformer`] read and write
//! their inputs.

use std::path::{Path, PathBuf};

/// Configuration for a directory run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformConfig {
    /// Transform class files on the `rayon` thread pool (default: true).
    pub parallel: bool,

    /// Copy files that are not class files into the output tree unchanged (default: true).
    pub copy_resources: bool,

    /// File extension identifying class files, without the dot (default: `class`).
    pub class_extension: String,

    /// Stop at the first class that fails instead of recording the failure and moving on
    /// (default: true).
    pub fail_fast: bool,

    /// Directories and jars whose classes are known to the frame computation, in addition to
    /// the classes being transformed (default: empty).
    ///
    /// Stack map frames need the common superclass of two reference types. Classes that are
    /// neither transformed nor listed here can not be resolved and fail their class.
    pub classpath: Vec<PathBuf>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            copy_resources: true,
            class_extension: "class".to_string(),
            fail_fast: true,
            classpath: Vec::new(),
        }
    }
}

impl TransformConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that processes one file at a time and reports every failure.
    ///
    /// Useful for debugging: log lines come out in walk order and one bad class does not hide
    /// the others.
    #[must_use]
    pub fn diagnostic() -> Self {
        Self {
            parallel: false,
            fail_fast: false,
            ..Self::default()
        }
    }

    /// Enables or disables parallel processing.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_parallel(mut self, enable: bool) -> Self {
        self.parallel = enable;
        self
    }

    /// Enables or disables copying of non-class files.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_resources(mut self, enable: bool) -> Self {
        self.copy_resources = enable;
        self
    }

    /// Sets the extension that identifies class files. A leading dot is ignored.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_class_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.class_extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// Sets whether the first failing class aborts the run.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_fail_fast(mut self, enable: bool) -> Self {
        self.fail_fast = enable;
        self
    }

    /// Adds a directory or jar to the classpath.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_classpath(mut self, entry: impl Into<PathBuf>) -> Self {
        self.classpath.push(entry.into());
        self
    }

    /// Whether `path` names a class file under this configuration.
    #[must_use]
    pub fn is_class_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case(&self.class_extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TransformConfig::new();
        assert!(config.parallel);
        assert!(config.copy_resources);
        assert!(config.fail_fast);
        assert_eq!(config.class_extension, "class");
        assert!(config.classpath.is_empty());
        assert_eq!(config, TransformConfig::default());
    }

    #[test]
    fn diagnostic_preset() {
        let config = TransformConfig::diagnostic();
        assert!(!config.parallel);
        assert!(!config.fail_fast);
        assert!(config.copy_resources);
    }

    #[test]
    fn builder() {
        let config = TransformConfig::new()
            .with_parallel(false)
            .with_resources(false)
            .with_fail_fast(false)
            .with_class_extension(".klass")
            .with_classpath("lib/rt.jar")
            .with_classpath("build/deps");
        assert!(!config.parallel);
        assert!(!config.copy_resources);
        assert!(!config.fail_fast);
        assert_eq!(config.class_extension, "klass");
        assert_eq!(
            config.classpath,
            vec![PathBuf::from("lib/rt.jar"), PathBuf::from("build/deps")]
        );
    }

    #[test]
    fn class_file_detection() {
        let config = TransformConfig::new();
        assert!(config.is_class_file(Path::new("demo/Widget.class")));
        assert!(config.is_class_file(Path::new("Widget.CLASS")));
        assert!(!config.is_class_file(Path::new("demo/Widget.java")));
        assert!(!config.is_class_file(Path::new("META-INF/MANIFEST.MF")));
        assert!(!config.is_class_file(Path::new("class")));
    }
}
