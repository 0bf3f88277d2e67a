//! JVM class-file codec.
//!
//! The codec is event based: [`ClassReader`] replays a class file as an ordered stream of
//! [`ClassVisitor`] events and [`ClassWriter`] turns such a stream back into bytes. Anything in
//! between (filters, rewriters, fan-outs) is just another visitor, so a transformation never
//! sees an in-memory tree of the class.
//!
//! # Architecture
//!
//! - [`reader`] - Parsing and event replay
//! - [`writer`] - Serialization, instruction encoding and maxs/frame computation
//! - [`visitor`] - The event traits shared by producers and consumers
//! - [`constants`] - Constant pool and bootstrap method table
//! - [`descriptor`] - Field and method descriptors
//! - [`hierarchy`] - Superclass index for merging reference types in frames
//! - [`instruction`] / [`opcodes`] - The symbolic instruction set
//!
//! Attributes the codec does not interpret are carried as opaque [`Attribute`] values and
//! written back unchanged.

pub mod access;
pub mod constants;
pub mod descriptor;
pub mod frame;
pub(crate) mod frames;
pub mod hierarchy;
pub mod instruction;
pub mod member;
pub mod opcodes;
pub mod reader;
pub mod visitor;
pub mod writer;

pub use access::AccessFlags;
pub use constants::ConstantPool;
pub use descriptor::{FieldType, MethodDescriptor, ReturnType, ValueCategory};
pub use frame::{Frame, Maxs, VerificationType};
pub use hierarchy::{ClassEntry, ClassHierarchy};
pub use instruction::{ConstantDynamic, Handle, Insn, Label, LdcConstant};
pub use member::{
    AnnotationValue, Attribute, ClassHeader, FieldHeader, LocalVariable, MethodHeader,
};
pub use reader::ClassReader;
pub use visitor::{AnnotationSink, AnnotationVisitor, ClassVisitor, FieldVisitor, MethodSink, MethodVisitor};
pub use writer::ClassWriter;
