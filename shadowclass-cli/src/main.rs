mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })?;

    let cli = Cli::parse();

    // Show shadowclass info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("shadowclass", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Transform {
            input,
            output,
            classpath,
            no_parallel,
            skip_resources,
            keep_going,
            extension,
        } => commands::transform::run(
            input,
            output,
            commands::transform::TransformOptions {
                parallel: !*no_parallel,
                copy_resources: !*skip_resources,
                keep_going: *keep_going,
                extension: extension.clone(),
                classpath: classpath.clone(),
            },
            &cli.global,
        ),
        Command::Methods { path } => commands::methods::run(path, &cli.global),
    }
}
