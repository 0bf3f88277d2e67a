//! Directory runs through the public API.

mod common;

use std::{fs, path::PathBuf};

use common::*;
use shadowclass::{classfile::opcodes::*, DirectoryTransformer, Result, TransformConfig};

fn sample() -> Result<Vec<u8>> {
    build_class(
        "demo/Sample",
        &[
            constructor(),
            MethodSpec::public("run", "()V", insns([simple(RETURN)])),
        ],
    )
}

#[test]
fn parallel_and_sequential_runs_agree() -> Result<()> {
    let input = tempfile::tempdir()?;
    for package in ["a", "b/c", "d"] {
        let directory = input.path().join(package);
        fs::create_dir_all(&directory)?;
        fs::write(directory.join("Sample.class"), sample()?)?;
    }
    fs::write(input.path().join("b/config.properties"), "key=value")?;

    let parallel = tempfile::tempdir()?;
    let sequential = tempfile::tempdir()?;
    let first = DirectoryTransformer::new(input.path(), parallel.path(), TransformConfig::new())?.run()?;
    let second = DirectoryTransformer::new(
        input.path(),
        sequential.path(),
        TransformConfig::new().with_parallel(false),
    )?
    .run()?;

    assert_eq!(first.transformed, second.transformed);
    assert_eq!(first.copied, vec![PathBuf::from("b/config.properties")]);
    for relative in &first.transformed {
        assert_eq!(
            fs::read(parallel.path().join(relative))?,
            fs::read(sequential.path().join(relative))?
        );
    }

    let methods = inspect(&fs::read(parallel.path().join("b/c/Sample.class"))?)?;
    assert_eq!(methods.len(), 3);
    Ok(())
}

#[test]
fn custom_extension_selects_class_files() -> Result<()> {
    let input = tempfile::tempdir()?;
    let output = tempfile::tempdir()?;
    fs::write(input.path().join("Sample.klass"), sample()?)?;
    fs::write(input.path().join("Sample.class"), b"copied verbatim")?;

    let config = TransformConfig::new().with_class_extension("klass");
    let report = DirectoryTransformer::new(input.path(), output.path(), config)?.run()?;
    assert_eq!(report.transformed, vec![PathBuf::from("Sample.klass")]);
    assert_eq!(report.copied, vec![PathBuf::from("Sample.class")]);
    assert_eq!(fs::read(output.path().join("Sample.class"))?, b"copied verbatim");
    Ok(())
}
