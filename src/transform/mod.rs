//! The shadow transformation.
//!
//! Every method of a class except its initializers gets a twin with the same name and
//! parameters but the opposite return category (`V` becomes `I`, anything else becomes `V`).
//! The twin's body is the original's up to and including its first exit, with that exit
//! replaced by the default exit of the new return type.
//!
//! The pieces are small event consumers, composed per method by [`ShadowTransformer`]:
//!
//! ```text
//!                           ┌─> original method consumer
//! reader ── method events ──┤
//!                           └─> ReturnRewriter ─> MetadataFilter ─> shadow method consumer
//! ```
//!
//! - [`shadow_descriptor`] / [`shadow_header`] compute the twin's declaration
//! - [`NullSink`] accepts and discards every event
//! - [`MetadataFilter`] keeps only the executable part of a body
//! - [`ReturnRewriter`] rewrites the first exit and drops the rest
//! - [`fanout`] duplicates one stream into two consumers, including nested annotation streams
//!
//! [`transform_class`] runs the whole pipeline on one class file.

mod fanout;
mod filter;
mod mangler;
mod null;
mod rewriter;
mod transformer;

pub use fanout::{fanout, Fanout, Join};
pub use filter::MetadataFilter;
pub use mangler::{shadow_descriptor, shadow_header};
pub use null::NullSink;
pub use rewriter::ReturnRewriter;
pub use transformer::ShadowTransformer;

use std::sync::Arc;

use crate::{
    classfile::{ClassHierarchy, ClassReader, ClassWriter},
    Result,
};

/// Transform one class file and return the rewritten class file.
///
/// The constant pool of the input is kept as is, so members that are passed through
/// unchanged are written back byte for byte. The output depends only on `bytes`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] and friends for damaged input,
/// [`crate::Error::AlreadyDeclared`] if a shadow collides with an existing method, and
/// [`crate::Error::ContractViolation`] if a shadow body cannot be rewritten, and
/// [`crate::Error::FrameComputation`] if a shadow's frames merge classes outside the platform
/// hierarchy (use [`transform_class_with`] for those).
///
/// # Examples
///
/// ```rust,no_run
/// let input = std::fs::read("Example.class")?;
/// let output = shadowclass::transform_class(&input)?;
/// std::fs::write("out/Example.class", output)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn transform_class(bytes: &[u8]) -> Result<Vec<u8>> {
    transform_class_with(bytes, ClassHierarchy::jdk())
}

/// [`transform_class`], resolving frame merges against `hierarchy`.
///
/// # Errors
/// As [`transform_class`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::{path::Path, sync::Arc};
/// use shadowclass::{classfile::ClassHierarchy, transform_class_with};
///
/// let mut hierarchy = ClassHierarchy::with_jdk();
/// hierarchy.add_classpath_entry(Path::new("lib/dependency.jar"))?;
/// let output = transform_class_with(&std::fs::read("Example.class")?, Arc::new(hierarchy))?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn transform_class_with(bytes: &[u8], hierarchy: Arc<ClassHierarchy>) -> Result<Vec<u8>> {
    let reader = ClassReader::new(bytes)?;
    let writer = ClassWriter::from_reader(&reader).with_hierarchy(hierarchy);
    let mut transformer = ShadowTransformer::new(writer);
    reader.accept(&mut transformer)?;
    transformer.into_inner().to_bytes()
}
