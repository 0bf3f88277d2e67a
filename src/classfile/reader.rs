//! Class-file parsing and event replay.
//!
//! [`ClassReader::new`] validates the header and parses the constant pool eagerly; the member
//! tables are only walked by [`ClassReader::accept`], which replays the whole class as one
//! ordered stream of [`ClassVisitor`] events. Attributes the codec understands are turned into
//! dedicated events; everything else is handed over verbatim as an [`Attribute`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use shadowclass::classfile::{ClassReader, ClassWriter};
//!
//! let bytes = std::fs::read("Example.class")?;
//! let reader = ClassReader::new(&bytes)?;
//! let mut writer = ClassWriter::from_reader(&reader);
//! reader.accept(&mut writer)?;
//! assert_eq!(writer.to_bytes()?.len(), bytes.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::HashMap;

use crate::{
    classfile::{
        access::AccessFlags,
        constants::{BootstrapMethod, Constant, ConstantPool},
        frame::{Frame, Maxs, VerificationType},
        instruction::{Insn, Label},
        member::{
            AnnotationValue, Attribute, ClassHeader, FieldHeader, LocalVariable, MethodHeader,
        },
        opcodes::*,
        visitor::{AnnotationSink, AnnotationVisitor, ClassVisitor, MethodVisitor},
    },
    file::{io::read_be, parser::Parser},
    Error, Result,
};

/// `0xCAFEBABE`
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Nesting limit for annotation element values.
const MAX_ANNOTATION_DEPTH: usize = 64;

struct RawAttribute<'a> {
    name: &'a str,
    data: &'a [u8],
}

impl RawAttribute<'_> {
    fn to_attribute(&self) -> Attribute {
        Attribute {
            name: self.name.to_string(),
            data: self.data.to_vec(),
        }
    }
}

struct RawMember<'a> {
    access: AccessFlags,
    name: &'a str,
    descriptor: &'a str,
    attributes: Vec<RawAttribute<'a>>,
}

/// A parsed class file, ready to replay its events.
pub struct ClassReader<'a> {
    data: &'a [u8],
    pool: ConstantPool,
    minor_version: u16,
    major_version: u16,
    access: AccessFlags,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    /// Offset of `fields_count`
    members_offset: usize,
}

impl<'a> ClassReader<'a> {
    /// Parse the header and the constant pool of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for empty input, [`crate::Error::NotSupported`] if the
    /// magic number is wrong, and [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`]
    /// for damaged class files.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Empty);
        }
        if data.len() < 4 || read_be::<u32>(data)? != MAGIC {
            return Err(Error::NotSupported);
        }

        let mut parser = Parser::new(data);
        parser.advance_by(4)?;
        let minor_version = parser.read_be::<u16>()?;
        let major_version = parser.read_be::<u16>()?;
        let mut pool = ConstantPool::parse(&mut parser)?;

        let access = AccessFlags::from_raw(parser.read_be::<u16>()?);
        let this_class = parser.read_be::<u16>()?;
        let super_class = parser.read_be::<u16>()?;
        let interface_count = parser.read_be::<u16>()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(parser.read_be::<u16>()?);
        }
        let members_offset = parser.pos();

        pool.class_name(this_class)?;

        // The bootstrap table lives behind the member tables but is needed to resolve any
        // `invokedynamic` inside them.
        for _ in 0..2 {
            let count = parser.read_be::<u16>()?;
            for _ in 0..count {
                parser.advance_by(6)?;
                skip_attributes(&mut parser)?;
            }
        }
        let attribute_count = parser.read_be::<u16>()?;
        for _ in 0..attribute_count {
            let name = parser.read_be::<u16>()?;
            let length = parser.read_be::<u32>()? as usize;
            let data = parser.read_bytes(length)?;
            if pool.utf8(name)? == "BootstrapMethods" {
                pool.set_bootstrap_methods(parse_bootstrap_methods(data)?);
            }
        }

        Ok(ClassReader {
            data,
            pool,
            minor_version,
            major_version,
            access,
            this_class,
            super_class,
            interfaces,
            members_offset,
        })
    }

    /// The constant pool of the class.
    #[must_use]
    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    /// Internal name of the class.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `this_class` does not name a class.
    pub fn class_name(&self) -> Result<&str> {
        self.pool.class_name(self.this_class)
    }

    /// Internal name of the superclass; `None` for `java/lang/Object` and `module-info`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `super_class` is set but does not name a class.
    pub fn super_name(&self) -> Result<Option<&str>> {
        self.pool.optional_class_name(self.super_class)
    }

    /// `access_flags` of the class.
    #[must_use]
    pub fn access(&self) -> AccessFlags {
        self.access
    }

    /// `major_version` of the class file.
    #[must_use]
    pub fn major_version(&self) -> u16 {
        self.major_version
    }

    /// Replay the class into `visitor`.
    ///
    /// # Errors
    /// Returns any parse error of the member tables, and any error raised by `visitor`.
    pub fn accept(&self, visitor: &mut dyn ClassVisitor) -> Result<()> {
        let mut parser = Parser::new(self.data);
        parser.seek(self.members_offset)?;
        let fields = self.read_members(&mut parser)?;
        let methods = self.read_members(&mut parser)?;
        let attributes = self.read_attributes(&mut parser)?;

        let mut signature = None;
        let mut annotations = Vec::new();
        let mut opaque = Vec::new();
        for attribute in &attributes {
            match attribute.name {
                "Signature" => signature = Some(self.utf8_attribute(attribute.data)?),
                "RuntimeVisibleAnnotations" => annotations.push((attribute.data, true)),
                "RuntimeInvisibleAnnotations" => annotations.push((attribute.data, false)),
                "BootstrapMethods" => {}
                _ => opaque.push(attribute.to_attribute()),
            }
        }

        let interfaces = self
            .interfaces
            .iter()
            .map(|index| self.pool.class_name(*index).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        visitor.visit(&ClassHeader {
            minor_version: self.minor_version,
            major_version: self.major_version,
            access: self.access,
            name: self.class_name()?.to_string(),
            signature,
            super_name: self
                .pool
                .optional_class_name(self.super_class)?
                .map(str::to_string),
            interfaces,
        })?;

        for (data, visible) in annotations {
            let mut parser = Parser::new(data);
            let count = parser.read_be::<u16>()?;
            for _ in 0..count {
                let descriptor = self.pool.utf8(parser.read_be::<u16>()?)?;
                let sink = visitor.visit_annotation(descriptor, visible)?;
                self.read_annotation_body(&mut parser, sink, 0)?;
            }
        }
        for attribute in &opaque {
            visitor.visit_attribute(attribute)?;
        }

        for field in &fields {
            self.read_field(visitor, field)?;
        }
        for method in &methods {
            self.read_method(visitor, method)?;
        }

        log::trace!(
            "Read {} with {} fields and {} methods",
            self.class_name()?,
            fields.len(),
            methods.len()
        );
        visitor.visit_end()
    }

    fn read_attributes<'s, 'd: 's>(
        &'s self,
        parser: &mut Parser<'d>,
    ) -> Result<Vec<RawAttribute<'s>>> {
        let count = parser.read_be::<u16>()?;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = self.pool.utf8(parser.read_be::<u16>()?)?;
            let length = parser.read_be::<u32>()? as usize;
            attributes.push(RawAttribute {
                name,
                data: parser.read_bytes(length)?,
            });
        }
        Ok(attributes)
    }

    fn read_members<'s, 'd: 's>(&'s self, parser: &mut Parser<'d>) -> Result<Vec<RawMember<'s>>> {
        let count = parser.read_be::<u16>()?;
        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let access = AccessFlags::from_raw(parser.read_be::<u16>()?);
            let name = self.pool.utf8(parser.read_be::<u16>()?)?;
            let descriptor = self.pool.utf8(parser.read_be::<u16>()?)?;
            members.push(RawMember {
                access,
                name,
                descriptor,
                attributes: self.read_attributes(parser)?,
            });
        }
        Ok(members)
    }

    fn utf8_attribute(&self, data: &[u8]) -> Result<String> {
        Ok(self.pool.utf8(read_be::<u16>(data)?)?.to_string())
    }

    fn read_field(&self, visitor: &mut dyn ClassVisitor, field: &RawMember<'_>) -> Result<()> {
        let mut signature = None;
        let mut constant_value = None;
        let mut annotations = Vec::new();
        let mut opaque = Vec::new();
        for attribute in &field.attributes {
            match attribute.name {
                "Signature" => signature = Some(self.utf8_attribute(attribute.data)?),
                "ConstantValue" => {
                    constant_value = Some(self.pool.loadable(read_be::<u16>(attribute.data)?)?);
                }
                "RuntimeVisibleAnnotations" => annotations.push((attribute.data, true)),
                "RuntimeInvisibleAnnotations" => annotations.push((attribute.data, false)),
                _ => opaque.push(attribute.to_attribute()),
            }
        }

        let header = FieldHeader {
            access: field.access,
            name: field.name.to_string(),
            descriptor: field.descriptor.to_string(),
            signature,
            constant_value,
        };
        let Some(mut sink) = visitor.visit_field(&header)? else {
            return Ok(());
        };

        for (data, visible) in annotations {
            let mut parser = Parser::new(data);
            let count = parser.read_be::<u16>()?;
            for _ in 0..count {
                let descriptor = self.pool.utf8(parser.read_be::<u16>()?)?;
                let nested = sink.visit_annotation(descriptor, visible)?;
                self.read_annotation_body(&mut parser, nested, 0)?;
            }
        }
        for attribute in &opaque {
            sink.visit_attribute(attribute)?;
        }
        sink.visit_end()
    }

    fn read_method(&self, visitor: &mut dyn ClassVisitor, method: &RawMember<'_>) -> Result<()> {
        let mut signature = None;
        let mut exceptions = Vec::new();
        let mut code = None;
        let mut parameters = None;
        let mut annotation_default = None;
        let mut annotations = Vec::new();
        let mut parameter_annotations = Vec::new();
        let mut opaque = Vec::new();
        for attribute in &method.attributes {
            match attribute.name {
                "Code" => code = Some(attribute.data),
                "Exceptions" => {
                    let mut parser = Parser::new(attribute.data);
                    let count = parser.read_be::<u16>()?;
                    for _ in 0..count {
                        let name = self.pool.class_name(parser.read_be::<u16>()?)?;
                        exceptions.push(name.to_string());
                    }
                }
                "Signature" => signature = Some(self.utf8_attribute(attribute.data)?),
                "MethodParameters" => parameters = Some(attribute.data),
                "AnnotationDefault" => annotation_default = Some(attribute.data),
                "RuntimeVisibleAnnotations" => annotations.push((attribute.data, true)),
                "RuntimeInvisibleAnnotations" => annotations.push((attribute.data, false)),
                "RuntimeVisibleParameterAnnotations" => {
                    parameter_annotations.push((attribute.data, true));
                }
                "RuntimeInvisibleParameterAnnotations" => {
                    parameter_annotations.push((attribute.data, false));
                }
                _ => opaque.push(attribute.to_attribute()),
            }
        }

        let header = MethodHeader {
            access: method.access,
            name: method.name.to_string(),
            descriptor: method.descriptor.to_string(),
            signature,
            exceptions,
        };
        let Some(mut sink) = visitor.visit_method(&header)? else {
            return Ok(());
        };

        if let Some(data) = parameters {
            let mut parser = Parser::new(data);
            let count = parser.read_be::<u8>()?;
            for _ in 0..count {
                let name = parser.read_be::<u16>()?;
                let name = if name == 0 {
                    None
                } else {
                    Some(self.pool.utf8(name)?)
                };
                let access = AccessFlags::from_raw(parser.read_be::<u16>()?);
                sink.visit_parameter(name, access)?;
            }
        }

        if let Some(data) = annotation_default {
            let mut parser = Parser::new(data);
            let mut nested = sink.visit_annotation_default()?;
            self.read_element_value(&mut parser, None, nested.as_deref_mut(), 0)?;
            if let Some(nested) = nested.as_mut() {
                nested.visit_end()?;
            }
        }

        for (data, visible) in annotations {
            let mut parser = Parser::new(data);
            let count = parser.read_be::<u16>()?;
            for _ in 0..count {
                let descriptor = self.pool.utf8(parser.read_be::<u16>()?)?;
                let nested = sink.visit_annotation(descriptor, visible)?;
                self.read_annotation_body(&mut parser, nested, 0)?;
            }
        }

        for (data, visible) in parameter_annotations {
            let mut parser = Parser::new(data);
            let parameter_count = parser.read_be::<u8>()?;
            sink.visit_annotable_parameter_count(parameter_count, visible)?;
            for parameter in 0..parameter_count {
                let count = parser.read_be::<u16>()?;
                for _ in 0..count {
                    let descriptor = self.pool.utf8(parser.read_be::<u16>()?)?;
                    let nested = sink.visit_parameter_annotation(parameter, descriptor, visible)?;
                    self.read_annotation_body(&mut parser, nested, 0)?;
                }
            }
        }

        for attribute in &opaque {
            sink.visit_attribute(attribute)?;
        }
        if let Some(data) = code {
            self.read_code(data, sink.as_mut())?;
        }
        sink.visit_end()
    }

    fn read_annotation_body(
        &self,
        parser: &mut Parser,
        mut visitor: AnnotationSink<'_>,
        depth: usize,
    ) -> Result<()> {
        let pairs = parser.read_be::<u16>()?;
        for _ in 0..pairs {
            let name = self.pool.utf8(parser.read_be::<u16>()?)?;
            self.read_element_value(parser, Some(name), visitor.as_deref_mut(), depth)?;
        }
        if let Some(visitor) = visitor.as_mut() {
            visitor.visit_end()?;
        }
        Ok(())
    }

    fn read_element_value(
        &self,
        parser: &mut Parser,
        name: Option<&str>,
        visitor: Option<&mut (dyn AnnotationVisitor + '_)>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_ANNOTATION_DEPTH {
            return Err(malformed_error!("Annotation values nest too deeply"));
        }

        let tag = parser.read_be::<u8>()?;
        let value = match tag {
            b'B' | b'C' | b'I' | b'S' | b'Z' => {
                let index = parser.read_be::<u16>()?;
                let Constant::Integer(value) = self.pool.get(index)? else {
                    return Err(malformed_error!(
                        "Annotation value {} is not an Integer constant",
                        index
                    ));
                };
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                match tag {
                    b'B' => AnnotationValue::Byte(*value as i8),
                    b'C' => AnnotationValue::Char(*value as u16),
                    b'S' => AnnotationValue::Short(*value as i16),
                    b'Z' => AnnotationValue::Boolean(*value != 0),
                    _ => AnnotationValue::Int(*value),
                }
            }
            b'D' | b'F' | b'J' => {
                let index = parser.read_be::<u16>()?;
                match (tag, self.pool.get(index)?) {
                    (b'D', Constant::Double(bits)) => AnnotationValue::Double(f64::from_bits(*bits)),
                    (b'F', Constant::Float(bits)) => AnnotationValue::Float(f32::from_bits(*bits)),
                    (b'J', Constant::Long(value)) => AnnotationValue::Long(*value),
                    _ => {
                        return Err(malformed_error!(
                            "Annotation value {} does not match tag '{}'",
                            index,
                            char::from(tag)
                        ))
                    }
                }
            }
            b's' => {
                let index = parser.read_be::<u16>()?;
                match self.pool.get(index)? {
                    Constant::Utf16(units) => AnnotationValue::Utf16(units.clone()),
                    _ => AnnotationValue::String(self.pool.utf8(index)?.to_string()),
                }
            }
            b'c' => AnnotationValue::Class(self.pool.utf8(parser.read_be::<u16>()?)?.to_string()),
            b'e' => {
                let descriptor = self.pool.utf8(parser.read_be::<u16>()?)?;
                let constant = self.pool.utf8(parser.read_be::<u16>()?)?;
                if let Some(visitor) = visitor {
                    visitor.visit_enum(name, descriptor, constant)?;
                }
                return Ok(());
            }
            b'@' => {
                let descriptor = self.pool.utf8(parser.read_be::<u16>()?)?;
                let nested = match visitor {
                    Some(visitor) => visitor.visit_annotation(name, descriptor)?,
                    None => None,
                };
                return self.read_annotation_body(parser, nested, depth + 1);
            }
            b'[' => {
                let count = parser.read_be::<u16>()?;
                let mut nested = match visitor {
                    Some(visitor) => visitor.visit_array(name)?,
                    None => None,
                };
                for _ in 0..count {
                    self.read_element_value(parser, None, nested.as_deref_mut(), depth + 1)?;
                }
                if let Some(nested) = nested.as_mut() {
                    nested.visit_end()?;
                }
                return Ok(());
            }
            other => {
                return Err(malformed_error!(
                    "Invalid annotation element tag 0x{:02X}",
                    other
                ))
            }
        };

        if let Some(visitor) = visitor {
            visitor.visit(name, &value)?;
        }
        Ok(())
    }

    fn read_code(&self, data: &[u8], visitor: &mut dyn MethodVisitor) -> Result<()> {
        let mut parser = Parser::new(data);
        let max_stack = parser.read_be::<u16>()?;
        let max_locals = parser.read_be::<u16>()?;
        let code_length = parser.read_be::<u32>()? as usize;
        if code_length == 0 || code_length > usize::from(u16::MAX) {
            return Err(malformed_error!("Invalid code length {}", code_length));
        }
        let code = parser.read_bytes(code_length)?;
        let insns = self.decode_code(code)?;

        let mut starts = vec![false; code_length + 1];
        starts[code_length] = true;
        for (offset, _) in &insns {
            starts[*offset] = true;
        }
        let mut labels = vec![false; code_length + 1];
        let mut mark = |offset: usize| -> Result<Label> {
            if offset > code_length || !starts[offset] {
                return Err(malformed_error!(
                    "Code offset {} is not an instruction boundary",
                    offset
                ));
            }
            labels[offset] = true;
            Ok(label_at(offset))
        };

        for (_, insn) in &insns {
            for target in insn.targets() {
                mark(target.0 as usize)?;
            }
        }

        let handler_count = parser.read_be::<u16>()?;
        let mut handlers = Vec::with_capacity(handler_count as usize);
        for _ in 0..handler_count {
            let start = mark(parser.read_be::<u16>()? as usize)?;
            let end = mark(parser.read_be::<u16>()? as usize)?;
            let handler = mark(parser.read_be::<u16>()? as usize)?;
            let catch_type = self.pool.optional_class_name(parser.read_be::<u16>()?)?;
            handlers.push((start, end, handler, catch_type));
        }

        let mut lines = Vec::new();
        let mut locals = Vec::new();
        let mut local_types = HashMap::new();
        let mut frames = Vec::new();
        let mut opaque = Vec::new();
        for attribute in self.read_attributes(&mut parser)? {
            let mut table = Parser::new(attribute.data);
            match attribute.name {
                "LineNumberTable" => {
                    let count = table.read_be::<u16>()?;
                    for _ in 0..count {
                        let start = table.read_be::<u16>()? as usize;
                        let line = table.read_be::<u16>()?;
                        if start < code_length && starts[start] {
                            lines.push((start, line));
                        }
                    }
                }
                "LocalVariableTable" => {
                    let count = table.read_be::<u16>()?;
                    for _ in 0..count {
                        let start = table.read_be::<u16>()? as usize;
                        let length = table.read_be::<u16>()? as usize;
                        let name = self.pool.utf8(table.read_be::<u16>()?)?;
                        let descriptor = self.pool.utf8(table.read_be::<u16>()?)?;
                        let index = table.read_be::<u16>()?;
                        locals.push((start, length, name, descriptor, index));
                    }
                }
                "LocalVariableTypeTable" => {
                    let count = table.read_be::<u16>()?;
                    for _ in 0..count {
                        let start = table.read_be::<u16>()? as usize;
                        let length = table.read_be::<u16>()? as usize;
                        table.advance_by(2)?;
                        let signature = self.pool.utf8(table.read_be::<u16>()?)?;
                        let index = table.read_be::<u16>()?;
                        local_types.insert((start, length, index), signature);
                    }
                }
                "StackMapTable" => frames = self.decode_stack_map(&mut table)?,
                _ => opaque.push(attribute.to_attribute()),
            }
        }

        for (offset, frame) in &frames {
            mark(*offset)?;
            for entry in frame.entries() {
                if let VerificationType::Uninitialized(label) = entry {
                    mark(label.0 as usize)?;
                }
            }
        }

        let locals = locals
            .into_iter()
            .filter(|(start, length, ..)| {
                start + length <= code_length && starts[*start] && starts[start + length]
            })
            .map(|(start, length, name, descriptor, index)| {
                labels[start] = true;
                labels[start + length] = true;
                LocalVariable {
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                    signature: local_types
                        .get(&(start, length, index))
                        .map(|signature| (*signature).to_string()),
                    start: label_at(start),
                    end: label_at(start + length),
                    index,
                }
            })
            .collect::<Vec<_>>();
        for (start, _) in &lines {
            labels[*start] = true;
        }
        lines.sort_by_key(|(start, _)| *start);

        visitor.visit_code()?;
        for (start, end, handler, catch_type) in handlers {
            visitor.visit_try_catch_block(start, end, handler, catch_type)?;
        }

        let mut lines = lines.into_iter().peekable();
        let mut frames = frames.into_iter().peekable();
        for (offset, insn) in &insns {
            if labels[*offset] {
                visitor.visit_label(label_at(*offset))?;
            }
            while let Some((_, line)) = lines.next_if(|(start, _)| start == offset) {
                visitor.visit_line_number(line, label_at(*offset))?;
            }
            if let Some((_, frame)) = frames.next_if(|(start, _)| start == offset) {
                visitor.visit_frame(&frame)?;
            }
            visitor.visit_insn(insn)?;
        }
        if labels[code_length] {
            visitor.visit_label(label_at(code_length))?;
        }

        for local in &locals {
            visitor.visit_local_variable(local)?;
        }
        for attribute in &opaque {
            visitor.visit_code_attribute(attribute)?;
        }
        visitor.visit_maxs(Maxs::Explicit {
            stack: max_stack,
            locals: max_locals,
        })
    }

    fn decode_code(&self, code: &[u8]) -> Result<Vec<(usize, Insn)>> {
        let mut parser = Parser::new(code);
        let mut insns = Vec::new();

        while parser.has_more_data() {
            let offset = parser.pos();
            let opcode = parser.read_be::<u8>()?;
            let target = |delta: i64| -> Result<Label> {
                let target = offset as i64 + delta;
                if target < 0 || target >= code.len() as i64 {
                    return Err(malformed_error!(
                        "Branch at {} targets {} outside the code",
                        offset,
                        target
                    ));
                }
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                Ok(label_at(target as usize))
            };

            let insn = match opcode {
                NOP..=DCONST_1
                | IALOAD..=SALOAD
                | IASTORE..=LXOR
                | I2L..=DCMPG
                | IRETURN..=RETURN
                | ARRAYLENGTH
                | ATHROW
                | MONITORENTER
                | MONITOREXIT => Insn::Simple(opcode),
                BIPUSH => Insn::Int {
                    opcode,
                    operand: i32::from(parser.read_be::<i8>()?),
                },
                SIPUSH => Insn::Int {
                    opcode,
                    operand: i32::from(parser.read_be::<i16>()?),
                },
                NEWARRAY => Insn::Int {
                    opcode,
                    operand: i32::from(parser.read_be::<u8>()?),
                },
                LDC => Insn::Ldc(self.pool.loadable(u16::from(parser.read_be::<u8>()?))?),
                LDC_W | LDC2_W => Insn::Ldc(self.pool.loadable(parser.read_be::<u16>()?)?),
                ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Var {
                    opcode,
                    var: u16::from(parser.read_be::<u8>()?),
                },
                ILOAD_0..=ALOAD_3 => Insn::Var {
                    opcode: ILOAD + (opcode - ILOAD_0) / 4,
                    var: u16::from((opcode - ILOAD_0) % 4),
                },
                ISTORE_0..=ASTORE_3 => Insn::Var {
                    opcode: ISTORE + (opcode - ISTORE_0) / 4,
                    var: u16::from((opcode - ISTORE_0) % 4),
                },
                IINC => Insn::Iinc {
                    var: u16::from(parser.read_be::<u8>()?),
                    increment: i16::from(parser.read_be::<i8>()?),
                },
                IFEQ..=JSR | IFNULL | IFNONNULL => Insn::Jump {
                    opcode,
                    target: target(i64::from(parser.read_be::<i16>()?))?,
                },
                GOTO_W | JSR_W => Insn::Jump {
                    opcode,
                    target: target(i64::from(parser.read_be::<i32>()?))?,
                },
                TABLESWITCH => {
                    parser.align_from(0, 4)?;
                    let default = target(i64::from(parser.read_be::<i32>()?))?;
                    let low = parser.read_be::<i32>()?;
                    let high = parser.read_be::<i32>()?;
                    if high < low {
                        return Err(malformed_error!(
                            "tableswitch at {} has high {} below low {}",
                            offset,
                            high,
                            low
                        ));
                    }
                    let count = (i64::from(high) - i64::from(low) + 1) as usize;
                    parser.ensure_remaining(count.saturating_mul(4))?;
                    let mut targets = Vec::with_capacity(count);
                    for _ in 0..count {
                        targets.push(target(i64::from(parser.read_be::<i32>()?))?);
                    }
                    Insn::TableSwitch {
                        low,
                        high,
                        default,
                        targets,
                    }
                }
                LOOKUPSWITCH => {
                    parser.align_from(0, 4)?;
                    let default = target(i64::from(parser.read_be::<i32>()?))?;
                    let count = parser.read_be::<i32>()?;
                    let Ok(count) = usize::try_from(count) else {
                        return Err(malformed_error!(
                            "lookupswitch at {} has {} pairs",
                            offset,
                            count
                        ));
                    };
                    parser.ensure_remaining(count.saturating_mul(8))?;
                    let mut keys = Vec::with_capacity(count);
                    let mut targets = Vec::with_capacity(count);
                    for _ in 0..count {
                        keys.push(parser.read_be::<i32>()?);
                        targets.push(target(i64::from(parser.read_be::<i32>()?))?);
                    }
                    Insn::LookupSwitch {
                        default,
                        keys,
                        targets,
                    }
                }
                GETSTATIC..=PUTFIELD => {
                    let member = self.pool.member_ref(parser.read_be::<u16>()?)?;
                    Insn::Field {
                        opcode,
                        owner: member.owner.to_string(),
                        name: member.name.to_string(),
                        descriptor: member.descriptor.to_string(),
                    }
                }
                INVOKEVIRTUAL..=INVOKEINTERFACE => {
                    let member = self.pool.member_ref(parser.read_be::<u16>()?)?;
                    if opcode == INVOKEINTERFACE {
                        parser.advance_by(2)?;
                    }
                    Insn::Method {
                        opcode,
                        owner: member.owner.to_string(),
                        name: member.name.to_string(),
                        descriptor: member.descriptor.to_string(),
                        interface: member.interface,
                    }
                }
                INVOKEDYNAMIC => {
                    let (name, descriptor, bootstrap, arguments) =
                        self.pool.invoke_dynamic(parser.read_be::<u16>()?)?;
                    parser.advance_by(2)?;
                    Insn::InvokeDynamic {
                        name: name.to_string(),
                        descriptor: descriptor.to_string(),
                        bootstrap,
                        arguments,
                    }
                }
                NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Insn::Type {
                    opcode,
                    class: self.pool.class_name(parser.read_be::<u16>()?)?.to_string(),
                },
                MULTIANEWARRAY => Insn::MultiANewArray {
                    descriptor: self.pool.class_name(parser.read_be::<u16>()?)?.to_string(),
                    dimensions: parser.read_be::<u8>()?,
                },
                WIDE => {
                    let opcode = parser.read_be::<u8>()?;
                    match opcode {
                        IINC => Insn::Iinc {
                            var: parser.read_be::<u16>()?,
                            increment: parser.read_be::<i16>()?,
                        },
                        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Var {
                            opcode,
                            var: parser.read_be::<u16>()?,
                        },
                        other => {
                            return Err(malformed_error!(
                                "Invalid wide opcode 0x{:02X} at {}",
                                other,
                                offset
                            ))
                        }
                    }
                }
                other => {
                    return Err(malformed_error!(
                        "Invalid opcode 0x{:02X} at {}",
                        other,
                        offset
                    ))
                }
            };
            insns.push((offset, insn));
        }

        Ok(insns)
    }

    fn decode_stack_map(&self, parser: &mut Parser) -> Result<Vec<(usize, Frame)>> {
        let count = parser.read_be::<u16>()?;
        let mut frames = Vec::with_capacity(count as usize);
        let mut previous: Option<usize> = None;

        for _ in 0..count {
            let frame_type = parser.read_be::<u8>()?;
            let (delta, frame) = match frame_type {
                0..=63 => (u16::from(frame_type), Frame::Same),
                64..=127 => (
                    u16::from(frame_type - 64),
                    Frame::SameLocals1StackItem(self.decode_verification_type(parser)?),
                ),
                247 => {
                    let delta = parser.read_be::<u16>()?;
                    (
                        delta,
                        Frame::SameLocals1StackItem(self.decode_verification_type(parser)?),
                    )
                }
                248..=250 => (parser.read_be::<u16>()?, Frame::Chop(251 - frame_type)),
                251 => (parser.read_be::<u16>()?, Frame::Same),
                252..=254 => {
                    let delta = parser.read_be::<u16>()?;
                    let mut locals = Vec::new();
                    for _ in 0..frame_type - 251 {
                        locals.push(self.decode_verification_type(parser)?);
                    }
                    (delta, Frame::Append(locals))
                }
                255 => {
                    let delta = parser.read_be::<u16>()?;
                    let local_count = parser.read_be::<u16>()?;
                    let mut locals = Vec::with_capacity(local_count as usize);
                    for _ in 0..local_count {
                        locals.push(self.decode_verification_type(parser)?);
                    }
                    let stack_count = parser.read_be::<u16>()?;
                    let mut stack = Vec::with_capacity(stack_count as usize);
                    for _ in 0..stack_count {
                        stack.push(self.decode_verification_type(parser)?);
                    }
                    (delta, Frame::Full { locals, stack })
                }
                reserved => {
                    return Err(malformed_error!(
                        "Reserved stack map frame type {}",
                        reserved
                    ))
                }
            };

            let offset = match previous {
                None => usize::from(delta),
                Some(previous) => previous + usize::from(delta) + 1,
            };
            previous = Some(offset);
            frames.push((offset, frame));
        }

        Ok(frames)
    }

    fn decode_verification_type(&self, parser: &mut Parser) -> Result<VerificationType> {
        Ok(match parser.read_be::<u8>()? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(
                self.pool.class_name(parser.read_be::<u16>()?)?.to_string(),
            ),
            8 => VerificationType::Uninitialized(label_at(usize::from(parser.read_be::<u16>()?))),
            other => {
                return Err(malformed_error!(
                    "Invalid verification type tag {}",
                    other
                ))
            }
        })
    }
}

/// Labels produced by the reader are named after the code offset they mark.
#[allow(clippy::cast_possible_truncation)]
fn label_at(offset: usize) -> Label {
    Label(offset as u32)
}

fn skip_attributes(parser: &mut Parser) -> Result<()> {
    let count = parser.read_be::<u16>()?;
    for _ in 0..count {
        parser.advance_by(2)?;
        let length = parser.read_be::<u32>()? as usize;
        parser.advance_by(length)?;
    }
    Ok(())
}

fn parse_bootstrap_methods(data: &[u8]) -> Result<Vec<BootstrapMethod>> {
    let mut parser = Parser::new(data);
    let count = parser.read_be::<u16>()?;
    let mut methods = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let handle = parser.read_be::<u16>()?;
        let argument_count = parser.read_be::<u16>()?;
        let mut arguments = Vec::with_capacity(argument_count as usize);
        for _ in 0..argument_count {
            arguments.push(parser.read_be::<u16>()?);
        }
        methods.push(BootstrapMethod { handle, arguments });
    }
    Ok(methods)
}
