//! Class-file serialization driven by [`ClassVisitor`] events.
//!
//! [`ClassWriter`] is the terminal consumer of every event stream. Fields and annotations are
//! written through consumers that borrow the writer; methods are written through owned
//! consumers that share the constant pool, so several of them can be open at once (the shadow
//! pipeline writes an original and its shadow side by side). Each method reserves its position
//! in the method table when it is declared and fills it in at `visit_end`.
//!
//! Starting from [`ClassWriter::from_reader`] keeps the original constant pool byte for byte
//! and only appends the constants new code needs.

mod annotation;
mod code;
mod method;

use std::{cell::RefCell, collections::HashSet, rc::Rc, sync::Arc};

use crate::{
    classfile::{
        access::AccessFlags,
        constants::ConstantPool,
        hierarchy::{ClassEntry, ClassHierarchy, Resolver},
        instruction::LdcConstant,
        member::{Attribute, ClassHeader, FieldHeader, MethodHeader},
        reader::{ClassReader, MAGIC},
        visitor::{AnnotationSink, ClassVisitor, FieldVisitor, MethodSink},
    },
    file::io::push_be,
    Error, Result,
};

use annotation::AnnotationSet;
use method::MethodWriter;

pub(crate) type SharedPool = Rc<RefCell<ConstantPool>>;

/// A field or method, either still being written or finished.
enum MemberSlot {
    Pending { name: String, descriptor: String },
    Done(Vec<u8>),
}

type MemberSlots = Rc<RefCell<Vec<MemberSlot>>>;

/// What a method body needs to know about its method.
pub(crate) struct MethodContext {
    pub class_name: String,
    pub major_version: u16,
    pub access: AccessFlags,
    pub name: String,
    pub descriptor: String,
    pub resolver: Rc<Resolver>,
}

impl MethodContext {
    /// `Owner.name(descriptor)`
    pub fn display(&self) -> String {
        format!("{}.{}{}", self.class_name, self.name, self.descriptor)
    }
}

/// An attribute list, names already interned.
#[derive(Default)]
pub(crate) struct AttributeTable {
    entries: Vec<(u16, Vec<u8>)>,
}

impl AttributeTable {
    pub fn add(&mut self, pool: &mut ConstantPool, name: &str, body: Vec<u8>) -> Result<()> {
        let name = pool.add_utf8(name)?;
        self.entries.push((name, body));
        Ok(())
    }

    /// Add a `u2`-index attribute such as `Signature` or `ConstantValue`.
    pub fn add_index(&mut self, pool: &mut ConstantPool, name: &str, index: u16) -> Result<()> {
        self.add(pool, name, index.to_be_bytes().to_vec())
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let Ok(count) = u16::try_from(self.entries.len()) else {
            return Err(Error::Error("More than 65535 attributes".to_string()));
        };
        push_be(out, count);
        for (name, body) in &self.entries {
            let Ok(length) = u32::try_from(body.len()) else {
                return Err(Error::Error("Attribute longer than 4 GiB".to_string()));
            };
            push_be(out, *name);
            push_be(out, length);
            out.extend_from_slice(body);
        }
        Ok(())
    }
}

/// Add `RuntimeVisibleAnnotations` / `RuntimeInvisibleAnnotations` for non-empty sets.
fn add_annotations(
    table: &mut AttributeTable,
    pool: &mut ConstantPool,
    annotations: &[AnnotationSet; 2],
) -> Result<()> {
    for (set, name) in annotations.iter().zip([
        "RuntimeVisibleAnnotations",
        "RuntimeInvisibleAnnotations",
    ]) {
        if !set.is_empty() {
            let mut body = Vec::new();
            set.write(&mut body);
            table.add(pool, name, body)?;
        }
    }
    Ok(())
}

fn add_opaque(
    table: &mut AttributeTable,
    pool: &mut ConstantPool,
    attributes: &[Attribute],
) -> Result<()> {
    for attribute in attributes {
        table.add(pool, &attribute.name, attribute.data.clone())?;
    }
    Ok(())
}

/// Index into the per-visibility arrays.
fn visibility(visible: bool) -> usize {
    usize::from(!visible)
}

struct ClassIndices {
    minor_version: u16,
    major_version: u16,
    access: AccessFlags,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    signature: Option<u16>,
}

/// Serializes a class from its events.
///
/// # Examples
///
/// ```rust
/// use shadowclass::classfile::{
///     AccessFlags, ClassHeader, ClassReader, ClassVisitor, ClassWriter, Insn, Maxs, MethodHeader,
/// };
/// use shadowclass::classfile::opcodes::RETURN;
///
/// let mut writer = ClassWriter::new();
/// writer.visit(&ClassHeader {
///     minor_version: 0,
///     major_version: 52,
///     access: AccessFlags::PUBLIC | AccessFlags::SUPER,
///     name: "demo/Empty".to_string(),
///     signature: None,
///     super_name: Some("java/lang/Object".to_string()),
///     interfaces: Vec::new(),
/// })?;
/// if let Some(mut method) = writer.visit_method(&MethodHeader {
///     access: AccessFlags::PUBLIC | AccessFlags::STATIC,
///     name: "run".to_string(),
///     descriptor: "()V".to_string(),
///     signature: None,
///     exceptions: Vec::new(),
/// })? {
///     method.visit_code()?;
///     method.visit_insn(&Insn::Simple(RETURN))?;
///     method.visit_maxs(Maxs::Recompute)?;
///     method.visit_end()?;
/// }
/// writer.visit_end()?;
///
/// let bytes = writer.to_bytes()?;
/// assert_eq!(ClassReader::new(&bytes)?.class_name()?, "demo/Empty");
/// # Ok::<(), shadowclass::Error>(())
/// ```
pub struct ClassWriter {
    pool: SharedPool,
    hierarchy: Arc<ClassHierarchy>,
    resolver: Option<Rc<Resolver>>,
    header: Option<ClassIndices>,
    class_name: String,
    annotations: [AnnotationSet; 2],
    attributes: Vec<Attribute>,
    fields: Vec<MemberSlot>,
    methods: MemberSlots,
    declared_fields: HashSet<(String, String)>,
    declared_methods: HashSet<(String, String)>,
}

impl Default for ClassWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassWriter {
    /// A writer with an empty constant pool.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pool(ConstantPool::new())
    }

    /// A writer that starts from the constant pool (and bootstrap table) of `reader`.
    ///
    /// The original entries keep their indices and are written back verbatim.
    #[must_use]
    pub fn from_reader(reader: &ClassReader<'_>) -> Self {
        Self::with_pool(reader.pool().clone())
    }

    /// Merge reference types in recomputed frames against `hierarchy` instead of the
    /// platform classes alone.
    #[must_use]
    pub fn with_hierarchy(mut self, hierarchy: Arc<ClassHierarchy>) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    fn with_pool(pool: ConstantPool) -> Self {
        ClassWriter {
            pool: Rc::new(RefCell::new(pool)),
            hierarchy: ClassHierarchy::jdk(),
            resolver: None,
            header: None,
            class_name: String::new(),
            annotations: Default::default(),
            attributes: Vec::new(),
            fields: Vec::new(),
            methods: Rc::new(RefCell::new(Vec::new())),
            declared_fields: HashSet::new(),
            declared_methods: HashSet::new(),
        }
    }

    fn declared(&self) -> Result<(u16, &Rc<Resolver>)> {
        match (&self.header, &self.resolver) {
            (Some(header), Some(resolver)) => Ok((header.major_version, resolver)),
            _ => Err(Error::Error(
                "Member declared before the class header".to_string(),
            )),
        }
    }

    fn unfinished(&self, slots: &[MemberSlot]) -> Result<()> {
        for slot in slots {
            if let MemberSlot::Pending { name, descriptor } = slot {
                return Err(Error::UnfinishedMember {
                    class: self.class_name.clone(),
                    name: name.clone(),
                    descriptor: descriptor.clone(),
                });
            }
        }
        Ok(())
    }

    /// Serialize the class.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnfinishedMember`] if a field or method never received
    /// `visit_end`, and [`crate::Error::ConstantPoolOverflow`] if the constants do not fit.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let Some(header) = &self.header else {
            return Err(Error::Error("No class header was visited".to_string()));
        };
        let methods = self.methods.borrow();
        self.unfinished(&self.fields)?;
        self.unfinished(&methods)?;

        let mut body = Vec::new();
        push_be(&mut body, header.access.bits());
        push_be(&mut body, header.this_class);
        push_be(&mut body, header.super_class);
        push_be(&mut body, member_count(header.interfaces.len(), "interfaces")?);
        for interface in &header.interfaces {
            push_be(&mut body, *interface);
        }

        for (slots, what) in [(&self.fields, "fields"), (&*methods, "methods")] {
            push_be(&mut body, member_count(slots.len(), what)?);
            for slot in slots {
                if let MemberSlot::Done(bytes) = slot {
                    body.extend_from_slice(bytes);
                }
            }
        }

        let mut pool = self.pool.borrow_mut();
        let mut attributes = AttributeTable::default();
        if let Some(signature) = header.signature {
            attributes.add_index(&mut pool, "Signature", signature)?;
        }
        add_annotations(&mut attributes, &mut pool, &self.annotations)?;
        add_opaque(&mut attributes, &mut pool, &self.attributes)?;
        if !pool.bootstrap_methods().is_empty() {
            let mut table = Vec::new();
            pool.write_bootstrap_methods(&mut table)?;
            attributes.add(&mut pool, "BootstrapMethods", table)?;
        }
        attributes.write(&mut body)?;

        let mut out = Vec::with_capacity(body.len() + 1024);
        push_be(&mut out, MAGIC);
        push_be(&mut out, header.minor_version);
        push_be(&mut out, header.major_version);
        pool.write(&mut out)?;
        out.extend_from_slice(&body);

        log::trace!(
            "Wrote {} ({} bytes, {} constants)",
            self.class_name,
            out.len(),
            pool.count()
        );
        Ok(out)
    }
}

fn member_count(count: usize, what: &str) -> Result<u16> {
    u16::try_from(count).map_err(|_| Error::Error(format!("More than 65535 {what}")))
}

impl ClassVisitor for ClassWriter {
    fn visit(&mut self, header: &ClassHeader) -> Result<()> {
        if self.header.is_some() {
            return Err(Error::Error(format!(
                "Class header visited twice ({})",
                header.name
            )));
        }

        let mut pool = self.pool.borrow_mut();
        let this_class = pool.add_class(&header.name)?;
        let super_class = match &header.super_name {
            Some(name) => pool.add_class(name)?,
            None => 0,
        };
        let interfaces = header
            .interfaces
            .iter()
            .map(|name| pool.add_class(name))
            .collect::<Result<Vec<_>>>()?;
        let signature = header
            .signature
            .as_deref()
            .map(|signature| pool.add_utf8(signature))
            .transpose()?;
        drop(pool);

        self.class_name.clone_from(&header.name);
        let own = ClassEntry {
            super_name: header.super_name.clone(),
            interface: header.access.contains(AccessFlags::INTERFACE),
        };
        self.resolver = Some(Rc::new(Resolver::new(
            Arc::clone(&self.hierarchy),
            Some((header.name.clone(), own)),
        )));
        self.header = Some(ClassIndices {
            minor_version: header.minor_version,
            major_version: header.major_version,
            access: header.access,
            this_class,
            super_class,
            interfaces,
            signature,
        });
        Ok(())
    }

    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>> {
        let writer = self.annotations[visibility(visible)].open(&self.pool, descriptor)?;
        Ok(Some(Box::new(writer)))
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        self.attributes.push(attribute.clone());
        Ok(())
    }

    fn visit_field(
        &mut self,
        header: &FieldHeader,
    ) -> Result<Option<Box<dyn FieldVisitor + '_>>> {
        self.declared()?;
        let key = (header.name.clone(), header.descriptor.clone());
        if !self.declared_fields.insert(key) {
            return Err(Error::AlreadyDeclared {
                class: self.class_name.clone(),
                name: header.name.clone(),
                descriptor: header.descriptor.clone(),
            });
        }

        self.fields.push(MemberSlot::Pending {
            name: header.name.clone(),
            descriptor: header.descriptor.clone(),
        });
        let Some(slot) = self.fields.last_mut() else {
            return Ok(None);
        };
        let writer = FieldWriter::new(&self.pool, slot, header)?;
        Ok(Some(Box::new(writer)))
    }

    fn visit_method(&mut self, header: &MethodHeader) -> Result<MethodSink> {
        let (major_version, resolver) = self.declared()?;
        let resolver = Rc::clone(resolver);
        let key = (header.name.clone(), header.descriptor.clone());
        if !self.declared_methods.insert(key) {
            return Err(Error::AlreadyDeclared {
                class: self.class_name.clone(),
                name: header.name.clone(),
                descriptor: header.descriptor.clone(),
            });
        }

        let slot = {
            let mut methods = self.methods.borrow_mut();
            methods.push(MemberSlot::Pending {
                name: header.name.clone(),
                descriptor: header.descriptor.clone(),
            });
            methods.len() - 1
        };
        let context = MethodContext {
            class_name: self.class_name.clone(),
            major_version,
            access: header.access,
            name: header.name.clone(),
            descriptor: header.descriptor.clone(),
            resolver,
        };
        let writer = MethodWriter::new(
            Rc::clone(&self.pool),
            Rc::clone(&self.methods),
            slot,
            context,
            header,
        )?;
        Ok(Some(Box::new(writer)))
    }

    fn visit_end(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes one `field_info` into its slot at `visit_end`.
struct FieldWriter<'w> {
    pool: &'w RefCell<ConstantPool>,
    slot: &'w mut MemberSlot,
    access: AccessFlags,
    name: u16,
    descriptor: u16,
    signature: Option<u16>,
    constant_value: Option<u16>,
    annotations: [AnnotationSet; 2],
    attributes: Vec<Attribute>,
}

impl<'w> FieldWriter<'w> {
    fn new(
        pool: &'w RefCell<ConstantPool>,
        slot: &'w mut MemberSlot,
        header: &FieldHeader,
    ) -> Result<Self> {
        let mut constants = pool.borrow_mut();
        let name = constants.add_utf8(&header.name)?;
        let descriptor = constants.add_utf8(&header.descriptor)?;
        let signature = header
            .signature
            .as_deref()
            .map(|signature| constants.add_utf8(signature))
            .transpose()?;
        let constant_value = header
            .constant_value
            .as_ref()
            .map(|value| constant_value(&mut constants, value))
            .transpose()?;
        drop(constants);

        Ok(FieldWriter {
            pool,
            slot,
            access: header.access,
            name,
            descriptor,
            signature,
            constant_value,
            annotations: Default::default(),
            attributes: Vec::new(),
        })
    }
}

/// `ConstantValue` refers to the constant itself; strings go through `CONSTANT_String`.
fn constant_value(pool: &mut ConstantPool, value: &LdcConstant) -> Result<u16> {
    match value {
        LdcConstant::Int(_)
        | LdcConstant::Float(_)
        | LdcConstant::Long(_)
        | LdcConstant::Double(_)
        | LdcConstant::String(_)
        | LdcConstant::Utf16(_) => pool.add_loadable(value),
        other => Err(Error::Error(format!(
            "{other:?} cannot be a field constant value"
        ))),
    }
}

impl FieldVisitor for FieldWriter<'_> {
    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>> {
        let writer = self.annotations[visibility(visible)].open(self.pool, descriptor)?;
        Ok(Some(Box::new(writer)))
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        self.attributes.push(attribute.clone());
        Ok(())
    }

    fn visit_end(&mut self) -> Result<()> {
        let mut pool = self.pool.borrow_mut();
        let mut attributes = AttributeTable::default();
        if let Some(value) = self.constant_value {
            attributes.add_index(&mut pool, "ConstantValue", value)?;
        }
        if let Some(signature) = self.signature {
            attributes.add_index(&mut pool, "Signature", signature)?;
        }
        add_annotations(&mut attributes, &mut pool, &self.annotations)?;
        add_opaque(&mut attributes, &mut pool, &self.attributes)?;

        let mut out = Vec::new();
        push_be(&mut out, self.access.bits());
        push_be(&mut out, self.name);
        push_be(&mut out, self.descriptor);
        attributes.write(&mut out)?;
        *self.slot = MemberSlot::Done(out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::visitor::MethodVisitor,
        test::{class_header, method_header, single_method_class},
    };

    #[test]
    fn rewriting_own_output_is_identity() -> Result<()> {
        let bytes = single_method_class()?;
        let reader = ClassReader::new(&bytes)?;
        let mut writer = ClassWriter::from_reader(&reader);
        reader.accept(&mut writer)?;
        assert_eq!(writer.to_bytes()?, bytes);
        Ok(())
    }

    #[test]
    fn recomputed_maxs_are_written() -> Result<()> {
        let bytes = single_method_class()?;
        let reader = ClassReader::new(&bytes)?;
        let mut recorder = crate::test::Recorder::default();
        reader.accept(&mut recorder)?;
        assert!(recorder.events().contains(&"maxs Explicit { stack: 2, locals: 2 }".to_string()));
        Ok(())
    }

    #[test]
    fn duplicate_method_is_rejected() -> Result<()> {
        let mut writer = ClassWriter::new();
        writer.visit(&class_header("demo/Widget"))?;
        let _first = writer.visit_method(&method_header("run", "()V"))?;
        let second = writer.visit_method(&method_header("run", "()V"));
        assert!(matches!(second, Err(Error::AlreadyDeclared { .. })));

        // Same name, different descriptor is an overload.
        assert!(writer.visit_method(&method_header("run", "()I"))?.is_some());
        Ok(())
    }

    #[test]
    fn unfinished_method_is_reported() -> Result<()> {
        let mut writer = ClassWriter::new();
        writer.visit(&class_header("demo/Widget"))?;
        let pending = writer.visit_method(&method_header("run", "()V"))?;
        let result = writer.to_bytes();
        assert!(matches!(
            result,
            Err(Error::UnfinishedMember { ref name, .. }) if name == "run"
        ));

        if let Some(mut method) = pending {
            method.visit_end()?;
        }
        assert!(writer.to_bytes().is_ok());
        Ok(())
    }

    #[test]
    fn methods_keep_declaration_order() -> Result<()> {
        let mut writer = ClassWriter::new();
        writer.visit(&class_header("demo/Widget"))?;
        let first = writer.visit_method(&method_header("first", "()V"))?;
        let second = writer.visit_method(&method_header("second", "()V"))?;
        // Finish out of order.
        for mut method in [second, first].into_iter().flatten() {
            method.visit_end()?;
        }

        let bytes = writer.to_bytes()?;
        let reader = ClassReader::new(&bytes)?;
        let mut recorder = crate::test::Recorder::default();
        reader.accept(&mut recorder)?;
        let methods = recorder
            .events()
            .into_iter()
            .filter(|event| event.starts_with("method "))
            .collect::<Vec<_>>();
        assert_eq!(methods, vec!["method first()V", "method second()V"]);
        Ok(())
    }

    #[test]
    fn header_is_required() {
        assert!(ClassWriter::new().to_bytes().is_err());
        let mut writer = ClassWriter::new();
        assert!(writer.visit_method(&method_header("run", "()V")).is_err());
    }
}
