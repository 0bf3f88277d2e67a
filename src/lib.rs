// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # shadowclass
//!
//! Adds a decoy twin next to every method of a JVM class file.
//!
//! For each method other than `<init>` and `<clinit>`, the output class also declares a
//! *shadow*: same name, same parameters, opposite return category (`void` becomes `int`,
//! everything else becomes `void`). The shadow's body is the original body up to its first
//! exit, which is replaced by the default exit of the new return type. Debug metadata is not
//! copied to the shadow, and the writer derives its stack sizes and stack-map frames again.
//!
//! ## Architecture
//!
//! - [`classfile`] - A self-contained class-file codec: [`classfile::ClassReader`] replays a
//!   class as an ordered stream of visitor events, [`classfile::ClassWriter`] serializes such a
//!   stream, computing maxs and frames on request
//! - [`transform`] - The event consumers that build the shadows, and [`transform_class`]
//! - [`directory`] - Transformation of single files and whole directory trees
//! - [`jar`] - Transformation of jar archives, from and to jars or directories
//! - [`config`] - Options for directory and jar runs, including the classpath that frame
//!   computation resolves class names against
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shadowclass::prelude::*;
//!
//! // One class in memory
//! let bytes = std::fs::read("build/classes/demo/Worker.class")?;
//! let shadowed = transform_class(&bytes)?;
//!
//! // A whole tree on disk
//! let report = DirectoryTransformer::new("build/classes", "build/shadowed", TransformConfig::new())?
//!     .run()?;
//! println!("{} classes transformed", report.transformed_count());
//! # Ok::<(), shadowclass::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Result`]. A class either transforms completely or fails
//! with an [`Error`]; there is no partial output for a single class.
#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use shadowclass::prelude::*;
///
/// let bytes = std::fs::read("Example.class")?;
/// let reader = ClassReader::new(&bytes)?;
/// let mut transformer = ShadowTransformer::new(ClassWriter::from_reader(&reader));
/// reader.accept(&mut transformer)?;
/// # Ok::<(), shadowclass::Error>(())
/// ```
pub mod prelude;

/// The JVM class-file codec.
pub mod classfile;

/// Options for directory and jar runs.
pub mod config;

/// Transformation of files and directory trees.
pub mod directory;

/// Transformation of jar archives.
pub mod jar;

/// The shadow transformation itself.
pub mod transform;

/// `shadowclass` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `shadowclass` Error type
///
/// # Examples
///
/// ```rust
/// use shadowclass::{transform_class, Error};
///
/// match transform_class(b"not a class") {
///     Err(Error::NotSupported) => println!("not a class file"),
///     Err(e) => println!("Error: {}", e),
///     Ok(_) => unreachable!(),
/// }
/// ```
pub use error::Error;

pub use config::TransformConfig;
pub use directory::{transform_file, transform_file_with, DirectoryTransformer, TransformReport};
pub use jar::JarTransformer;
pub use transform::{transform_class, transform_class_with};

/// Low-level input handling: the owned class-file buffer and its bounds-checked cursor.
pub use file::{parser::Parser, File};
