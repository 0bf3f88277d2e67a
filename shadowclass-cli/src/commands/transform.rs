use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use serde::Serialize;
use shadowclass::{
    classfile::ClassHierarchy, jar::is_jar, transform_file_with, DirectoryTransformer,
    JarTransformer, TransformConfig, TransformReport,
};

use crate::{
    app::GlobalOptions,
    output::{print_output, Align, TabWriter},
};

/// Flags of the `transform` command.
pub struct TransformOptions {
    pub parallel: bool,
    pub copy_resources: bool,
    pub keep_going: bool,
    pub extension: String,
    pub classpath: Vec<PathBuf>,
}

impl TransformOptions {
    fn config(&self) -> TransformConfig {
        self.classpath.iter().fold(
            TransformConfig::new()
                .with_parallel(self.parallel)
                .with_resources(self.copy_resources)
                .with_fail_fast(!self.keep_going)
                .with_class_extension(self.extension.as_str()),
            |config, entry| config.with_classpath(entry),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct TransformSummary {
    pub transformed: Vec<PathBuf>,
    pub copied: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailureInfo>,
}

#[derive(Debug, Serialize)]
pub struct FailureInfo {
    pub path: PathBuf,
    pub error: String,
}

impl From<TransformReport> for TransformSummary {
    fn from(report: TransformReport) -> Self {
        TransformSummary {
            transformed: report.transformed,
            copied: report.copied,
            skipped: report.skipped,
            failed: report
                .failed
                .into_iter()
                .map(|(path, error)| FailureInfo {
                    path,
                    error: error.to_string(),
                })
                .collect(),
        }
    }
}

pub fn run(
    input: &Path,
    output: &Path,
    options: TransformOptions,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let summary = if is_jar(input) || is_jar(output) {
        let report = JarTransformer::new(input, output, options.config())
            .with_context(|| format!("cannot transform {}", input.display()))?
            .run()?;
        TransformSummary::from(report)
    } else if input.is_file() {
        let target = if output.is_dir() {
            let name = input
                .file_name()
                .with_context(|| format!("input has no file name: {}", input.display()))?;
            output.join(name)
        } else {
            output.to_path_buf()
        };

        let mut hierarchy = ClassHierarchy::with_jdk();
        for entry in &options.classpath {
            hierarchy
                .add_classpath_entry(entry)
                .with_context(|| format!("cannot read classpath entry {}", entry.display()))?;
        }
        transform_file_with(input, &target, Arc::new(hierarchy))?;
        TransformSummary {
            transformed: vec![target],
            copied: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    } else {
        let report = DirectoryTransformer::new(input, output, options.config())
            .with_context(|| format!("cannot transform {}", input.display()))?
            .run()?;
        TransformSummary::from(report)
    };

    print_output(&summary, opts, |summary| {
        let mut counts = TabWriter::new(&[("OUTCOME", Align::Left), ("FILES", Align::Right)]);
        counts.row(vec!["transformed".to_string(), summary.transformed.len().to_string()]);
        counts.row(vec!["copied".to_string(), summary.copied.len().to_string()]);
        if !summary.skipped.is_empty() {
            counts.row(vec!["skipped".to_string(), summary.skipped.len().to_string()]);
        }
        if !summary.failed.is_empty() {
            counts.row(vec!["failed".to_string(), summary.failed.len().to_string()]);
        }
        counts.print();

        if !summary.failed.is_empty() {
            println!();
            let mut table = TabWriter::new(&[("PATH", Align::Left), ("ERROR", Align::Left)]);
            for failure in &summary.failed {
                table.row(vec![failure.path.display().to_string(), failure.error.clone()]);
            }
            table.print();
        }
    })?;

    if !summary.failed.is_empty() {
        anyhow::bail!("{} files failed", summary.failed.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_carry_the_classpath() {
        let options = TransformOptions {
            parallel: false,
            copy_resources: true,
            keep_going: true,
            extension: "class".to_string(),
            classpath: vec![PathBuf::from("lib/a.jar"), PathBuf::from("lib/classes")],
        };
        let config = options.config();
        assert!(!config.parallel);
        assert!(!config.fail_fast);
        assert_eq!(config.classpath, options.classpath);
    }
}
