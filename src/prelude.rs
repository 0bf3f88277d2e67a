//! # shadowclass Prelude
//!
//! The types most programs need, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all shadowclass operations
pub use crate::Error;

/// The result type used throughout shadowclass
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Transform one class file in memory, or one file on disk
pub use crate::{transform_class, transform_class_with, transform_file, transform_file_with};

/// Directory and jar runs and their options
pub use crate::{DirectoryTransformer, JarTransformer, TransformConfig, TransformReport};

/// Low-level file parsing utilities
pub use crate::{File, Parser};

// ================================================================================================
// Class-File Codec
// ================================================================================================

/// Reading and writing class files
pub use crate::classfile::{ClassHierarchy, ClassReader, ClassWriter};

/// The event vocabulary
pub use crate::classfile::{AnnotationVisitor, ClassVisitor, FieldVisitor, MethodVisitor};

/// Declarations and instructions carried by events
pub use crate::classfile::{
    AccessFlags, ClassHeader, FieldHeader, Insn, Label, Maxs, MethodDescriptor, MethodHeader,
};

// ================================================================================================
// Transformation
// ================================================================================================

/// Building blocks of the shadow pipeline
pub use crate::transform::{
    fanout, shadow_descriptor, MetadataFilter, NullSink, ReturnRewriter, ShadowTransformer,
};
