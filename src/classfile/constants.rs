//! The constant pool.
//!
//! [`ConstantPool`] serves both directions of the codec:
//!
//! - **Reading**: [`ConstantPool::parse`] decodes every entry of a class file's pool and the
//!   resolving accessors ([`ConstantPool::utf8`], [`ConstantPool::member_ref`],
//!   [`ConstantPool::loadable`], ...) turn indices back into names and values.
//! - **Writing**: the `add_*` methods intern symbolic values and return their index, reusing an
//!   existing entry whenever one with the same content is present.
//!
//! A pool parsed from a class keeps the raw bytes of its entries. Writing such a pool emits
//! those bytes verbatim followed by any entry interned afterwards, so every index the original
//! class used stays valid and opaque attributes can be copied without rewriting.
//!
//! The pool also owns the bootstrap method table, because `CONSTANT_Dynamic` and
//! `CONSTANT_InvokeDynamic` entries reference it by position.

use std::collections::HashMap;

use strum::{Display, FromRepr};

use crate::{
    classfile::instruction::{handle_kind, ConstantDynamic, Handle, LdcConstant},
    file::{io::push_be, parser::Parser},
    Error, Result,
};

/// Nesting limit for dynamic constants used as bootstrap arguments of other dynamic constants.
const MAX_DYNAMIC_DEPTH: usize = 32;

/// Tag byte of a constant pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ConstantTag {
    Utf8 = 1,
    Integer = 3,
    Float = 4,
    Long = 5,
    Double = 6,
    Class = 7,
    String = 8,
    Fieldref = 9,
    Methodref = 10,
    InterfaceMethodref = 11,
    NameAndType = 12,
    MethodHandle = 15,
    MethodType = 16,
    Dynamic = 17,
    InvokeDynamic = 18,
    Module = 19,
    Package = 20,
}

/// One constant pool entry, with references kept as indices.
///
/// Floating point values are stored as their bit patterns so that entries can be hashed and
/// `NaN` payloads survive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Constant {
    Utf8(String),
    /// A `CONSTANT_Utf8` that is not valid Unicode (it holds an unpaired surrogate), kept as
    /// its UTF-16 code units
    Utf16(Vec<u16>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref { class: u16, name_and_type: u16 },
    Methodref { class: u16, name_and_type: u16 },
    InterfaceMethodref { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Constant {
    /// The tag of this entry.
    #[must_use]
    pub fn tag(&self) -> ConstantTag {
        match self {
            Constant::Utf8(_) | Constant::Utf16(_) => ConstantTag::Utf8,
            Constant::Integer(_) => ConstantTag::Integer,
            Constant::Float(_) => ConstantTag::Float,
            Constant::Long(_) => ConstantTag::Long,
            Constant::Double(_) => ConstantTag::Double,
            Constant::Class(_) => ConstantTag::Class,
            Constant::String(_) => ConstantTag::String,
            Constant::Fieldref { .. } => ConstantTag::Fieldref,
            Constant::Methodref { .. } => ConstantTag::Methodref,
            Constant::InterfaceMethodref { .. } => ConstantTag::InterfaceMethodref,
            Constant::NameAndType { .. } => ConstantTag::NameAndType,
            Constant::MethodHandle { .. } => ConstantTag::MethodHandle,
            Constant::MethodType(_) => ConstantTag::MethodType,
            Constant::Dynamic { .. } => ConstantTag::Dynamic,
            Constant::InvokeDynamic { .. } => ConstantTag::InvokeDynamic,
            Constant::Module(_) => ConstantTag::Module,
            Constant::Package(_) => ConstantTag::Package,
        }
    }

    /// Pool slots taken by this entry; `Long` and `Double` take two.
    #[must_use]
    pub fn slots(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }

    fn read(parser: &mut Parser) -> Result<Self> {
        let tag_byte = parser.read_be::<u8>()?;
        let Some(tag) = ConstantTag::from_repr(tag_byte) else {
            return Err(malformed_error!(
                "Invalid constant pool tag {} at offset {}",
                tag_byte,
                parser.pos() - 1
            ));
        };

        Ok(match tag {
            ConstantTag::Utf8 => {
                let length = parser.read_be::<u16>()?;
                let bytes = parser.read_bytes(length as usize)?;
                if is_plain_ascii(bytes) {
                    Constant::Utf8(bytes.iter().map(|byte| char::from(*byte)).collect())
                } else {
                    let units = decode_units(bytes)?;
                    match String::from_utf16(&units) {
                        Ok(text) => Constant::Utf8(text),
                        Err(_) => Constant::Utf16(units),
                    }
                }
            }
            ConstantTag::Integer => Constant::Integer(parser.read_be::<i32>()?),
            ConstantTag::Float => Constant::Float(parser.read_be::<u32>()?),
            ConstantTag::Long => Constant::Long(parser.read_be::<i64>()?),
            ConstantTag::Double => Constant::Double(parser.read_be::<u64>()?),
            ConstantTag::Class => Constant::Class(parser.read_be::<u16>()?),
            ConstantTag::String => Constant::String(parser.read_be::<u16>()?),
            ConstantTag::Fieldref => Constant::Fieldref {
                class: parser.read_be::<u16>()?,
                name_and_type: parser.read_be::<u16>()?,
            },
            ConstantTag::Methodref => Constant::Methodref {
                class: parser.read_be::<u16>()?,
                name_and_type: parser.read_be::<u16>()?,
            },
            ConstantTag::InterfaceMethodref => Constant::InterfaceMethodref {
                class: parser.read_be::<u16>()?,
                name_and_type: parser.read_be::<u16>()?,
            },
            ConstantTag::NameAndType => Constant::NameAndType {
                name: parser.read_be::<u16>()?,
                descriptor: parser.read_be::<u16>()?,
            },
            ConstantTag::MethodHandle => Constant::MethodHandle {
                kind: parser.read_be::<u8>()?,
                reference: parser.read_be::<u16>()?,
            },
            ConstantTag::MethodType => Constant::MethodType(parser.read_be::<u16>()?),
            ConstantTag::Dynamic => Constant::Dynamic {
                bootstrap: parser.read_be::<u16>()?,
                name_and_type: parser.read_be::<u16>()?,
            },
            ConstantTag::InvokeDynamic => Constant::InvokeDynamic {
                bootstrap: parser.read_be::<u16>()?,
                name_and_type: parser.read_be::<u16>()?,
            },
            ConstantTag::Module => Constant::Module(parser.read_be::<u16>()?),
            ConstantTag::Package => Constant::Package(parser.read_be::<u16>()?),
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        push_be(out, self.tag() as u8);
        match self {
            Constant::Utf8(text) => write_utf8(out, &encode_modified_utf8(text))?,
            Constant::Utf16(units) => {
                write_utf8(out, &encode_units(units.iter().copied(), units.len()))?;
            }
            Constant::Integer(value) => push_be(out, *value),
            Constant::Float(bits) => push_be(out, *bits),
            Constant::Long(value) => push_be(out, *value),
            Constant::Double(bits) => push_be(out, *bits),
            Constant::Class(index)
            | Constant::String(index)
            | Constant::MethodType(index)
            | Constant::Module(index)
            | Constant::Package(index) => push_be(out, *index),
            Constant::Fieldref {
                class,
                name_and_type,
            }
            | Constant::Methodref {
                class,
                name_and_type,
            }
            | Constant::InterfaceMethodref {
                class,
                name_and_type,
            } => {
                push_be(out, *class);
                push_be(out, *name_and_type);
            }
            Constant::NameAndType { name, descriptor } => {
                push_be(out, *name);
                push_be(out, *descriptor);
            }
            Constant::MethodHandle { kind, reference } => {
                push_be(out, *kind);
                push_be(out, *reference);
            }
            Constant::Dynamic {
                bootstrap,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => {
                push_be(out, *bootstrap);
                push_be(out, *name_and_type);
            }
        }
        Ok(())
    }
}

/// One entry of `BootstrapMethods`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapMethod {
    /// Index of the `CONSTANT_MethodHandle`
    pub handle: u16,
    /// Indices of the static arguments
    pub arguments: Vec<u16>,
}

/// A resolved `Fieldref`, `Methodref` or `InterfaceMethodref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Internal name of the owner
    pub owner: &'a str,
    /// Member name
    pub name: &'a str,
    /// Member descriptor
    pub descriptor: &'a str,
    /// Whether the entry is an `InterfaceMethodref`
    pub interface: bool,
}

/// A constant pool together with its bootstrap method table.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// Indexed by constant pool index; slot 0 and the second slot of wide entries are `None`
    entries: Vec<Option<Constant>>,
    lookup: HashMap<Constant, u16>,
    /// Raw bytes of the parsed entries, written back verbatim
    seed: Vec<u8>,
    /// Number of leading slots covered by `seed`
    seeded: usize,
    bootstrap_methods: Vec<BootstrapMethod>,
    bootstrap_lookup: HashMap<BootstrapMethod, u16>,
}

impl ConstantPool {
    /// An empty pool.
    #[must_use]
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![None],
            seeded: 1,
            ..ConstantPool::default()
        }
    }

    /// Parse `constant_pool_count` and the entries that follow it.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for damaged pools.
    pub fn parse(parser: &mut Parser) -> Result<Self> {
        let count = parser.read_be::<u16>()? as usize;
        if count == 0 {
            return Err(malformed_error!("Constant pool count is zero"));
        }

        let start = parser.pos();
        let mut pool = ConstantPool {
            entries: Vec::with_capacity(count),
            ..ConstantPool::default()
        };
        pool.entries.push(None);

        while pool.entries.len() < count {
            let index = pool.entries.len();
            let constant = Constant::read(parser)?;
            let slots = constant.slots();
            if index + slots > count {
                return Err(malformed_error!(
                    "Wide constant at index {} overruns the pool",
                    index
                ));
            }

            #[allow(clippy::cast_possible_truncation)]
            pool.lookup.entry(constant.clone()).or_insert(index as u16);
            pool.entries.push(Some(constant));
            if slots == 2 {
                pool.entries.push(None);
            }
        }

        pool.seed = parser.data()[start..parser.pos()].to_vec();
        pool.seeded = pool.entries.len();
        Ok(pool)
    }

    /// Value of `constant_pool_count`.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool holds no entries besides the reserved slot 0.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// The entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for index 0, out-of-range indices and the unusable
    /// slot after a wide entry.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(index as usize) {
            Some(Some(constant)) => Ok(constant),
            _ => Err(malformed_error!("Invalid constant pool index {}", index)),
        }
    }

    /// Text of the `CONSTANT_Utf8` at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing, of another kind, or holds an
    /// unpaired surrogate.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(text) => Ok(text),
            Constant::Utf16(_) => Err(malformed_error!(
                "Constant {} is not valid Unicode and cannot name anything",
                index
            )),
            other => Err(malformed_error!(
                "Constant {} is {}, expected Utf8",
                index,
                other.tag()
            )),
        }
    }

    /// Name of the `CONSTANT_Class` at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(malformed_error!(
                "Constant {} is {}, expected Class",
                index,
                other.tag()
            )),
        }
    }

    /// Like [`ConstantPool::class_name`], with index 0 meaning "none".
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a non-zero index does not name a class.
    pub fn optional_class_name(&self, index: u16) -> Result<Option<&str>> {
        if index == 0 {
            Ok(None)
        } else {
            self.class_name(index).map(Some)
        }
    }

    /// Name and descriptor of the `CONSTANT_NameAndType` at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            other => Err(malformed_error!(
                "Constant {} is {}, expected NameAndType",
                index,
                other.tag()
            )),
        }
    }

    /// The field or method reference at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        let (class, name_and_type, interface) = match self.get(index)? {
            Constant::Fieldref {
                class,
                name_and_type,
            }
            | Constant::Methodref {
                class,
                name_and_type,
            } => (*class, *name_and_type, false),
            Constant::InterfaceMethodref {
                class,
                name_and_type,
            } => (*class, *name_and_type, true),
            other => {
                return Err(malformed_error!(
                    "Constant {} is {}, expected a member reference",
                    index,
                    other.tag()
                ))
            }
        };
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            owner: self.class_name(class)?,
            name,
            descriptor,
            interface,
        })
    }

    /// The method handle at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn handle(&self, index: u16) -> Result<Handle> {
        match self.get(index)? {
            Constant::MethodHandle { kind, reference } => {
                if !(handle_kind::GET_FIELD..=handle_kind::INVOKE_INTERFACE).contains(kind) {
                    return Err(malformed_error!(
                        "Invalid method handle kind {} at constant {}",
                        kind,
                        index
                    ));
                }
                let member = self.member_ref(*reference)?;
                Ok(Handle {
                    kind: *kind,
                    owner: member.owner.to_string(),
                    name: member.name.to_string(),
                    descriptor: member.descriptor.to_string(),
                    interface: member.interface,
                })
            }
            other => Err(malformed_error!(
                "Constant {} is {}, expected MethodHandle",
                index,
                other.tag()
            )),
        }
    }

    /// The loadable constant at `index`, as pushed by `ldc`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not loadable.
    pub fn loadable(&self, index: u16) -> Result<LdcConstant> {
        self.loadable_at_depth(index, 0)
    }

    fn loadable_at_depth(&self, index: u16, depth: usize) -> Result<LdcConstant> {
        Ok(match self.get(index)? {
            Constant::Integer(value) => LdcConstant::Int(*value),
            Constant::Float(bits) => LdcConstant::Float(f32::from_bits(*bits)),
            Constant::Long(value) => LdcConstant::Long(*value),
            Constant::Double(bits) => LdcConstant::Double(f64::from_bits(*bits)),
            Constant::String(text) => match self.get(*text)? {
                Constant::Utf16(units) => LdcConstant::Utf16(units.clone()),
                _ => LdcConstant::String(self.utf8(*text)?.to_string()),
            },
            Constant::Class(name) => LdcConstant::Class(self.utf8(*name)?.to_string()),
            Constant::MethodType(descriptor) => {
                LdcConstant::MethodType(self.utf8(*descriptor)?.to_string())
            }
            Constant::MethodHandle { .. } => LdcConstant::MethodHandle(self.handle(index)?),
            Constant::Dynamic {
                bootstrap,
                name_and_type,
            } => {
                if depth >= MAX_DYNAMIC_DEPTH {
                    return Err(malformed_error!(
                        "Dynamic constant {} nests too deeply",
                        index
                    ));
                }
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                let (bootstrap, arguments) = self.bootstrap(*bootstrap, depth + 1)?;
                LdcConstant::Dynamic(Box::new(ConstantDynamic {
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                    bootstrap,
                    arguments,
                }))
            }
            other => {
                return Err(malformed_error!(
                    "Constant {} is {}, which is not loadable",
                    index,
                    other.tag()
                ))
            }
        })
    }

    /// Name, descriptor, bootstrap method and arguments of the `CONSTANT_InvokeDynamic` at
    /// `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry or its bootstrap method is invalid.
    pub fn invoke_dynamic(
        &self,
        index: u16,
    ) -> Result<(&str, &str, Handle, Vec<LdcConstant>)> {
        match self.get(index)? {
            Constant::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                let (handle, arguments) = self.bootstrap(*bootstrap, 0)?;
                Ok((name, descriptor, handle, arguments))
            }
            other => Err(malformed_error!(
                "Constant {} is {}, expected InvokeDynamic",
                index,
                other.tag()
            )),
        }
    }

    fn bootstrap(&self, index: u16, depth: usize) -> Result<(Handle, Vec<LdcConstant>)> {
        let Some(method) = self.bootstrap_methods.get(index as usize) else {
            return Err(malformed_error!("Invalid bootstrap method index {}", index));
        };
        let handle = self.handle(method.handle)?;
        let arguments = method
            .arguments
            .iter()
            .map(|argument| self.loadable_at_depth(*argument, depth))
            .collect::<Result<Vec<_>>>()?;
        Ok((handle, arguments))
    }

    /// The bootstrap method table.
    #[must_use]
    pub fn bootstrap_methods(&self) -> &[BootstrapMethod] {
        &self.bootstrap_methods
    }

    /// Replace the bootstrap method table with the one read from a `BootstrapMethods`
    /// attribute.
    pub fn set_bootstrap_methods(&mut self, methods: Vec<BootstrapMethod>) {
        self.bootstrap_lookup.clear();
        for (index, method) in methods.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            self.bootstrap_lookup
                .entry(method.clone())
                .or_insert(index as u16);
        }
        self.bootstrap_methods = methods;
    }

    /// Intern `constant` and return its index.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPoolOverflow`] when the pool is full.
    pub fn intern(&mut self, constant: Constant) -> Result<u16> {
        if let Some(index) = self.lookup.get(&constant) {
            return Ok(*index);
        }

        let index = self.entries.len();
        let slots = constant.slots();
        if index + slots > usize::from(u16::MAX) {
            return Err(Error::ConstantPoolOverflow);
        }

        #[allow(clippy::cast_possible_truncation)]
        let index = index as u16;
        self.lookup.insert(constant.clone(), index);
        self.entries.push(Some(constant));
        if slots == 2 {
            self.entries.push(None);
        }
        Ok(index)
    }

    /// Intern a `CONSTANT_Utf8`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPoolOverflow`] when the pool is full.
    pub fn add_utf8(&mut self, text: &str) -> Result<u16> {
        self.intern(Constant::Utf8(text.to_string()))
    }

    /// Intern a `CONSTANT_Utf8` given as UTF-16 code units, which may hold unpaired
    /// surrogates.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPoolOverflow`] when the pool is full.
    pub fn add_utf16(&mut self, units: &[u16]) -> Result<u16> {
        match String::from_utf16(units) {
            Ok(text) => self.add_utf8(&text),
            Err(_) => self.intern(Constant::Utf16(units.to_vec())),
        }
    }

    /// Intern a `CONSTANT_Class`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPoolOverflow`] when the pool is full.
    pub fn add_class(&mut self, name: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        self.intern(Constant::Class(name))
    }

    /// Intern a `CONSTANT_String`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPoolOverflow`] when the pool is full.
    pub fn add_string(&mut self, text: &str) -> Result<u16> {
        let text = self.add_utf8(text)?;
        self.intern(Constant::String(text))
    }

    /// Intern a `CONSTANT_NameAndType`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPoolOverflow`] when the pool is full.
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        let descriptor = self.add_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
    }

    /// Intern a `CONSTANT_Fieldref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPoolOverflow`] when the pool is full.
    pub fn add_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.add_class(owner)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.intern(Constant::Fieldref {
            class,
            name_and_type,
        })
    }

    /// Intern a `CONSTANT_Methodref` or `CONSTANT_InterfaceMethodref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPoolOverflow`] when the pool is full.
    pub fn add_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> Result<u16> {
        let class = self.add_class(owner)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.intern(if interface {
            Constant::InterfaceMethodref {
                class,
                name_and_type,
            }
        } else {
            Constant::Methodref {
                class,
                name_and_type,
            }
        })
    }

    /// Intern a `CONSTANT_MethodHandle`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPoolOverflow`] when the pool is full.
    pub fn add_handle(&mut self, handle: &Handle) -> Result<u16> {
        let reference = if handle.kind <= handle_kind::PUT_STATIC {
            self.add_field_ref(&handle.owner, &handle.name, &handle.descriptor)?
        } else {
            self.add_method_ref(
                &handle.owner,
                &handle.name,
                &handle.descriptor,
                handle.interface,
            )?
        };
        self.intern(Constant::MethodHandle {
            kind: handle.kind,
            reference,
        })
    }

    /// Intern a loadable constant.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPoolOverflow`] when the pool is full.
    pub fn add_loadable(&mut self, constant: &LdcConstant) -> Result<u16> {
        match constant {
            LdcConstant::Int(value) => self.intern(Constant::Integer(*value)),
            LdcConstant::Float(value) => self.intern(Constant::Float(value.to_bits())),
            LdcConstant::Long(value) => self.intern(Constant::Long(*value)),
            LdcConstant::Double(value) => self.intern(Constant::Double(value.to_bits())),
            LdcConstant::String(text) => self.add_string(text),
            LdcConstant::Utf16(units) => {
                let text = self.add_utf16(units)?;
                self.intern(Constant::String(text))
            }
            LdcConstant::Class(name) => self.add_class(name),
            LdcConstant::MethodType(descriptor) => {
                let descriptor = self.add_utf8(descriptor)?;
                self.intern(Constant::MethodType(descriptor))
            }
            LdcConstant::MethodHandle(handle) => self.add_handle(handle),
            LdcConstant::Dynamic(dynamic) => {
                let bootstrap = self.add_bootstrap(&dynamic.bootstrap, &dynamic.arguments)?;
                let name_and_type = self.add_name_and_type(&dynamic.name, &dynamic.descriptor)?;
                self.intern(Constant::Dynamic {
                    bootstrap,
                    name_and_type,
                })
            }
        }
    }

    /// Intern a `CONSTANT_InvokeDynamic` together with its bootstrap method.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPoolOverflow`] when the pool or the bootstrap table is
    /// full.
    pub fn add_invoke_dynamic(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap: &Handle,
        arguments: &[LdcConstant],
    ) -> Result<u16> {
        let bootstrap = self.add_bootstrap(bootstrap, arguments)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.intern(Constant::InvokeDynamic {
            bootstrap,
            name_and_type,
        })
    }

    /// Intern a bootstrap method and return its position in the table.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPoolOverflow`] when the pool or the table is full.
    pub fn add_bootstrap(&mut self, handle: &Handle, arguments: &[LdcConstant]) -> Result<u16> {
        let handle = self.add_handle(handle)?;
        let arguments = arguments
            .iter()
            .map(|argument| self.add_loadable(argument))
            .collect::<Result<Vec<_>>>()?;
        let method = BootstrapMethod { handle, arguments };

        if let Some(index) = self.bootstrap_lookup.get(&method) {
            return Ok(*index);
        }
        let Ok(index) = u16::try_from(self.bootstrap_methods.len()) else {
            return Err(Error::ConstantPoolOverflow);
        };
        self.bootstrap_lookup.insert(method.clone(), index);
        self.bootstrap_methods.push(method);
        Ok(index)
    }

    /// Serialize `constant_pool_count` and all entries.
    ///
    /// # Errors
    /// Returns an error if an interned string cannot be encoded.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let Ok(count) = u16::try_from(self.entries.len()) else {
            return Err(Error::ConstantPoolOverflow);
        };
        push_be(out, count);
        out.extend_from_slice(&self.seed);
        for constant in self.entries[self.seeded..].iter().flatten() {
            constant.write(out)?;
        }
        Ok(())
    }

    /// Serialize the body of a `BootstrapMethods` attribute.
    pub fn write_bootstrap_methods(&self, out: &mut Vec<u8>) -> Result<()> {
        let Ok(count) = u16::try_from(self.bootstrap_methods.len()) else {
            return Err(Error::ConstantPoolOverflow);
        };
        push_be(out, count);
        for method in &self.bootstrap_methods {
            push_be(out, method.handle);
            let Ok(arguments) = u16::try_from(method.arguments.len()) else {
                return Err(Error::ConstantPoolOverflow);
            };
            push_be(out, arguments);
            for argument in &method.arguments {
                push_be(out, *argument);
            }
        }
        Ok(())
    }
}

fn write_utf8(out: &mut Vec<u8>, encoded: &[u8]) -> Result<()> {
    let Ok(length) = u16::try_from(encoded.len()) else {
        return Err(Error::Error(format!(
            "UTF-8 constant of {} bytes exceeds 65535",
            encoded.len()
        )));
    };
    push_be(out, length);
    out.extend_from_slice(encoded);
    Ok(())
}

fn is_plain_ascii(bytes: &[u8]) -> bool {
    bytes.iter().all(|byte| (1..0x80).contains(byte))
}

/// Decode the modified UTF-8 of a `CONSTANT_Utf8` (JVMS 4.4.7).
///
/// `NUL` is encoded as `C0 80` and supplementary characters as surrogate pairs of two three-byte
/// sequences.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for invalid sequences and unpaired surrogates.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    if is_plain_ascii(bytes) {
        return Ok(bytes.iter().map(|byte| char::from(*byte)).collect());
    }
    String::from_utf16(&decode_units(bytes)?)
        .map_err(|_| malformed_error!("Modified UTF-8 constant holds an unpaired surrogate"))
}

/// Modified UTF-8 to UTF-16 code units, surrogates left as they are.
fn decode_units(bytes: &[u8]) -> Result<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut position = 0;
    while position < bytes.len() {
        let first = u16::from(bytes[position]);
        let continuation = |offset: usize| -> Result<u16> {
            match bytes.get(position + offset) {
                Some(byte) if byte & 0xC0 == 0x80 => Ok(u16::from(byte & 0x3F)),
                _ => Err(malformed_error!(
                    "Invalid modified UTF-8 continuation at byte {}",
                    position + offset
                )),
            }
        };

        match first {
            0x01..=0x7F => {
                units.push(first);
                position += 1;
            }
            0xC0..=0xDF => {
                units.push(((first & 0x1F) << 6) | continuation(1)?);
                position += 2;
            }
            0xE0..=0xEF => {
                units.push(((first & 0x0F) << 12) | (continuation(1)? << 6) | continuation(2)?);
                position += 3;
            }
            _ => {
                return Err(malformed_error!(
                    "Invalid modified UTF-8 lead byte 0x{:02X} at byte {}",
                    first,
                    position
                ))
            }
        }
    }
    Ok(units)
}

/// Encode `text` as modified UTF-8.
#[must_use]
pub fn encode_modified_utf8(text: &str) -> Vec<u8> {
    encode_units(text.encode_utf16(), text.len())
}

#[allow(clippy::cast_possible_truncation)]
fn encode_units(units: impl IntoIterator<Item = u16>, capacity: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(capacity);
    for unit in units {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modified_utf8() -> Result<()> {
        for text in ["", "java/lang/Object", "nul\0byte", "ümlaut", "日本", "emoji 😀"] {
            let encoded = encode_modified_utf8(text);
            assert!(!encoded.contains(&0), "{text}");
            assert_eq!(decode_modified_utf8(&encoded)?, text);
        }

        assert_eq!(encode_modified_utf8("\0"), vec![0xC0, 0x80]);
        // U+1F600 as a surrogate pair of two three-byte sequences.
        assert_eq!(
            encode_modified_utf8("😀"),
            vec![0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80]
        );
        Ok(())
    }

    #[test]
    fn modified_utf8_rejects_invalid() {
        assert!(decode_modified_utf8(&[0x00]).is_err());
        assert!(decode_modified_utf8(&[0xC3]).is_err());
        assert!(decode_modified_utf8(&[0xF0, 0x9F, 0x98, 0x80]).is_err());
        assert!(decode_modified_utf8(&[0xED, 0xA0, 0xBD]).is_err());
    }

    #[test]
    fn unpaired_surrogates_survive_the_pool() -> Result<()> {
        // "\uD800x" as javac writes it.
        let raw = [0xED, 0xA0, 0x80, b'x'];
        let mut bytes = vec![0, 3, 1, 0, 4];
        bytes.extend_from_slice(&raw);
        bytes.extend_from_slice(&[8, 0, 1]);

        let pool = ConstantPool::parse(&mut Parser::new(&bytes))?;
        assert_eq!(pool.get(1)?, &Constant::Utf16(vec![0xD800, u16::from(b'x')]));
        assert!(pool.utf8(1).is_err());
        assert_eq!(
            pool.loadable(2)?,
            LdcConstant::Utf16(vec![0xD800, u16::from(b'x')])
        );

        let mut written = Vec::new();
        pool.write(&mut written)?;
        assert_eq!(written, bytes);

        // Interned into a fresh pool, the entry is encoded again byte for byte.
        let mut fresh = ConstantPool::new();
        fresh.add_loadable(&LdcConstant::Utf16(vec![0xD800, u16::from(b'x')]))?;
        let mut written = Vec::new();
        fresh.write(&mut written)?;
        assert_eq!(written, bytes);

        // Valid units collapse into ordinary text.
        let mut pool = ConstantPool::new();
        let text = pool.add_utf8("ok")?;
        assert_eq!(pool.add_utf16(&[u16::from(b'o'), u16::from(b'k')])?, text);
        Ok(())
    }

    #[test]
    fn interning_reuses_entries() -> Result<()> {
        let mut pool = ConstantPool::new();
        let first = pool.add_method_ref("a/B", "run", "()V", false)?;
        let again = pool.add_method_ref("a/B", "run", "()V", false)?;
        assert_eq!(first, again);

        let interface = pool.add_method_ref("a/B", "run", "()V", true)?;
        assert_ne!(first, interface);

        let member = pool.member_ref(interface)?;
        assert_eq!(member.owner, "a/B");
        assert_eq!(member.name, "run");
        assert_eq!(member.descriptor, "()V");
        assert!(member.interface);
        Ok(())
    }

    #[test]
    fn wide_entries_take_two_slots() -> Result<()> {
        let mut pool = ConstantPool::new();
        let long = pool.add_loadable(&LdcConstant::Long(7))?;
        let next = pool.add_utf8("after")?;
        assert_eq!(long, 1);
        assert_eq!(next, 3);
        assert!(pool.get(2).is_err());
        assert_eq!(pool.count(), 4);
        Ok(())
    }

    #[test]
    fn parse_then_extend_keeps_seed() -> Result<()> {
        let mut original = ConstantPool::new();
        original.add_class("demo/Widget")?;
        original.add_loadable(&LdcConstant::Double(2.5))?;
        original.add_string("hello")?;
        let mut bytes = Vec::new();
        original.write(&mut bytes)?;

        let mut parser = Parser::new(&bytes);
        let mut parsed = ConstantPool::parse(&mut parser)?;
        assert_eq!(parser.pos(), bytes.len());
        assert_eq!(parsed.count(), original.count());
        assert_eq!(parsed.class_name(2)?, "demo/Widget");
        assert_eq!(parsed.loadable(3)?, LdcConstant::Double(2.5));

        // Existing content is found, new content is appended after the seed.
        assert_eq!(parsed.add_class("demo/Widget")?, 2);
        let added = parsed.add_utf8("Code")?;
        assert_eq!(usize::from(added), original.count());

        let mut rewritten = Vec::new();
        parsed.write(&mut rewritten)?;
        assert_eq!(&rewritten[2..bytes.len()], &bytes[2..]);
        Ok(())
    }

    #[test]
    fn invoke_dynamic_resolves_bootstrap() -> Result<()> {
        let bootstrap = Handle {
            kind: handle_kind::INVOKE_STATIC,
            owner: "java/lang/invoke/LambdaMetafactory".to_string(),
            name: "metafactory".to_string(),
            descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;)Ljava/lang/invoke/CallSite;"
                .to_string(),
            interface: false,
        };
        let arguments = vec![
            LdcConstant::MethodType("()V".to_string()),
            LdcConstant::Int(3),
        ];

        let mut pool = ConstantPool::new();
        let index = pool.add_invoke_dynamic("run", "()Ljava/lang/Runnable;", &bootstrap, &arguments)?;
        let again = pool.add_invoke_dynamic("run", "()Ljava/lang/Runnable;", &bootstrap, &arguments)?;
        assert_eq!(index, again);
        assert_eq!(pool.bootstrap_methods().len(), 1);

        let (name, descriptor, handle, resolved) = pool.invoke_dynamic(index)?;
        assert_eq!(name, "run");
        assert_eq!(descriptor, "()Ljava/lang/Runnable;");
        assert_eq!(handle, bootstrap);
        assert_eq!(resolved, arguments);
        Ok(())
    }

    #[test]
    fn parse_rejects_bad_tags() {
        let bytes = [0x00, 0x02, 0x02, 0x00, 0x00];
        assert!(ConstantPool::parse(&mut Parser::new(&bytes)).is_err());

        // A Long in the last slot overruns the pool.
        let bytes = [0x00, 0x02, 0x05, 0, 0, 0, 0, 0, 0, 0, 1];
        assert!(ConstantPool::parse(&mut Parser::new(&bytes)).is_err());
    }
}
