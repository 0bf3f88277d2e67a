use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// shadowclass - add return-flipped shadow methods to JVM class files
#[derive(Debug, Parser)]
#[command(name = "shadowclass", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Transform one class file, every class file below a directory, or the classes of a jar.
    ///
    /// A `.jar` on either side switches to jar mode: a jar is unpacked into a directory,
    /// repacked into a jar, or a directory is packed into a jar.
    Transform {
        /// A class file, a directory of class files or a jar.
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output file, output directory (created if missing) or jar.
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Directory or jar with classes the input refers to; repeatable.
        #[arg(long = "classpath", short = 'c', value_name = "PATH")]
        classpath: Vec<PathBuf>,

        /// Process files one at a time.
        #[arg(long)]
        no_parallel: bool,

        /// Do not copy non-class files into the output directory.
        #[arg(long)]
        skip_resources: bool,

        /// Report failing classes and continue instead of stopping at the first one.
        #[arg(long)]
        keep_going: bool,

        /// Extension that marks class files.
        #[arg(long, default_value = "class", value_name = "EXT")]
        extension: String,
    },

    /// List the methods of a class file and whether each has a shadow twin.
    Methods {
        /// Path to the class file.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}
