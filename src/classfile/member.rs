//! Class and member headers, annotation values and opaque attributes.

use crate::classfile::{
    access::AccessFlags,
    instruction::{Label, LdcConstant},
};

/// The header of a class: everything in `ClassFile` before the member tables, plus the class
/// `Signature`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassHeader {
    /// `minor_version`
    pub minor_version: u16,
    /// `major_version`
    pub major_version: u16,
    /// Access flags
    pub access: AccessFlags,
    /// Internal name of this class
    pub name: String,
    /// Generic signature
    pub signature: Option<String>,
    /// Internal name of the superclass; `None` only for `java/lang/Object` and modules
    pub super_name: Option<String>,
    /// Internal names of the direct superinterfaces
    pub interfaces: Vec<String>,
}

/// The declaration of a field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldHeader {
    /// Access flags
    pub access: AccessFlags,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Generic signature
    pub signature: Option<String>,
    /// `ConstantValue`
    pub constant_value: Option<LdcConstant>,
}

/// The declaration of a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHeader {
    /// Access flags
    pub access: AccessFlags,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Generic signature
    pub signature: Option<String>,
    /// Internal names of the declared exceptions (`Exceptions`)
    pub exceptions: Vec<String>,
}

impl MethodHeader {
    /// Whether this is an instance or class initializer.
    #[must_use]
    pub fn is_initializer(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }
}

/// An attribute the codec does not interpret, copied byte for byte.
///
/// The payload may hold constant pool indices; it is only meaningful to a writer that shares
/// the constant pool of the class it was read from (see `ClassWriter::from_reader`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Raw `info` bytes
    pub data: Vec<u8>,
}

/// A primitive, string or class element value of an annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    /// `B`
    Byte(i8),
    /// `C`
    Char(u16),
    /// `D`
    Double(f64),
    /// `F`
    Float(f32),
    /// `I`
    Int(i32),
    /// `J`
    Long(i64),
    /// `S`
    Short(i16),
    /// `Z`
    Boolean(bool),
    /// `s`
    String(String),
    /// `s` whose text is not valid Unicode, as UTF-16 code units
    Utf16(Vec<u16>),
    /// `c`, a return descriptor
    Class(String),
}

/// An entry of `LocalVariableTable`, merged with its `LocalVariableTypeTable` signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    /// Variable name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Generic signature
    pub signature: Option<String>,
    /// First instruction of the scope
    pub start: Label,
    /// End of the scope, exclusive
    pub end: Label,
    /// Local variable index
    pub index: u16,
}
