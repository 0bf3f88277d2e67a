//! The owned method consumer of [`super::ClassWriter`].

use crate::{
    classfile::{
        access::AccessFlags,
        descriptor::MethodDescriptor,
        frame::{Frame, Maxs},
        instruction::{Insn, Label},
        member::{Attribute, LocalVariable, MethodHeader},
        visitor::{AnnotationSink, MethodVisitor},
        writer::{
            add_annotations, add_opaque,
            annotation::{AnnotationSet, AnnotationWriter},
            code::CodeBuffer,
            visibility, AttributeTable, MemberSlot, MemberSlots, MethodContext, SharedPool,
        },
    },
    file::io::push_be,
    Error, Result,
};

pub(super) struct MethodWriter {
    pool: SharedPool,
    slots: MemberSlots,
    slot: usize,
    context: MethodContext,
    display: String,
    name: u16,
    descriptor: u16,
    signature: Option<u16>,
    exceptions: Vec<u16>,
    parameters: Vec<(u16, AccessFlags)>,
    annotation_default: Option<Vec<u8>>,
    annotations: [AnnotationSet; 2],
    parameter_counts: [Option<u8>; 2],
    parameter_annotations: [Vec<AnnotationSet>; 2],
    attributes: Vec<Attribute>,
    code: Option<CodeBuffer>,
    finished_code: Option<Vec<u8>>,
}

impl MethodWriter {
    pub(super) fn new(
        pool: SharedPool,
        slots: MemberSlots,
        slot: usize,
        context: MethodContext,
        header: &MethodHeader,
    ) -> Result<Self> {
        let mut constants = pool.borrow_mut();
        let name = constants.add_utf8(&header.name)?;
        let descriptor = constants.add_utf8(&header.descriptor)?;
        let signature = header
            .signature
            .as_deref()
            .map(|signature| constants.add_utf8(signature))
            .transpose()?;
        let exceptions = header
            .exceptions
            .iter()
            .map(|exception| constants.add_class(exception))
            .collect::<Result<Vec<_>>>()?;
        drop(constants);

        Ok(MethodWriter {
            display: context.display(),
            pool,
            slots,
            slot,
            context,
            name,
            descriptor,
            signature,
            exceptions,
            parameters: Vec::new(),
            annotation_default: None,
            annotations: Default::default(),
            parameter_counts: [None; 2],
            parameter_annotations: Default::default(),
            attributes: Vec::new(),
            code: None,
            finished_code: None,
        })
    }

    fn code(&mut self) -> &mut CodeBuffer {
        self.code.get_or_insert_with(CodeBuffer::default)
    }

    fn parameter_annotations_body(&self, index: usize) -> Option<Vec<u8>> {
        let sets = &self.parameter_annotations[index];
        if sets.iter().all(AnnotationSet::is_empty) {
            return None;
        }

        let declared = self.parameter_counts[index].map_or_else(
            || {
                MethodDescriptor::parse(&self.context.descriptor)
                    .map_or(0, |descriptor| descriptor.parameters.len())
            },
            usize::from,
        );
        let count = declared.max(sets.len()).min(usize::from(u8::MAX));

        let mut body = Vec::new();
        #[allow(clippy::cast_possible_truncation)]
        push_be(&mut body, count as u8);
        let empty = AnnotationSet::default();
        for parameter in 0..count {
            sets.get(parameter).unwrap_or(&empty).write(&mut body);
        }
        Some(body)
    }
}

impl MethodVisitor for MethodWriter {
    fn visit_parameter(&mut self, name: Option<&str>, access: AccessFlags) -> Result<()> {
        let name = match name {
            Some(name) => self.pool.borrow_mut().add_utf8(name)?,
            None => 0,
        };
        self.parameters.push((name, access));
        Ok(())
    }

    fn visit_annotation_default(&mut self) -> Result<AnnotationSink<'_>> {
        let out = self.annotation_default.insert(Vec::new());
        Ok(Some(Box::new(AnnotationWriter::single(&self.pool, out))))
    }

    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>> {
        let writer = self.annotations[visibility(visible)].open(&self.pool, descriptor)?;
        Ok(Some(Box::new(writer)))
    }

    fn visit_annotable_parameter_count(&mut self, count: u8, visible: bool) -> Result<()> {
        self.parameter_counts[visibility(visible)] = Some(count);
        Ok(())
    }

    fn visit_parameter_annotation(
        &mut self,
        parameter: u8,
        descriptor: &str,
        visible: bool,
    ) -> Result<AnnotationSink<'_>> {
        let sets = &mut self.parameter_annotations[visibility(visible)];
        let parameter = usize::from(parameter);
        if sets.len() <= parameter {
            sets.resize_with(parameter + 1, AnnotationSet::default);
        }
        let writer = sets[parameter].open(&self.pool, descriptor)?;
        Ok(Some(Box::new(writer)))
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        self.attributes.push(attribute.clone());
        Ok(())
    }

    fn visit_code(&mut self) -> Result<()> {
        self.code();
        Ok(())
    }

    fn visit_frame(&mut self, frame: &Frame) -> Result<()> {
        self.code().frame(frame);
        Ok(())
    }

    fn visit_insn(&mut self, insn: &Insn) -> Result<()> {
        let code = self.code.get_or_insert_with(CodeBuffer::default);
        code.insn(insn, &self.pool, &self.display)
    }

    fn visit_label(&mut self, label: Label) -> Result<()> {
        let code = self.code.get_or_insert_with(CodeBuffer::default);
        code.label(label, &self.display)
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<()> {
        self.code().try_catch(start, end, handler, catch_type);
        Ok(())
    }

    fn visit_local_variable(&mut self, variable: &LocalVariable) -> Result<()> {
        self.code().local_variable(variable);
        Ok(())
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<()> {
        self.code().line_number(line, start);
        Ok(())
    }

    fn visit_code_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        self.code().attribute(attribute);
        Ok(())
    }

    fn visit_maxs(&mut self, maxs: Maxs) -> Result<()> {
        let Some(code) = self.code.take() else {
            return Err(Error::Error(format!(
                "{}: visit_maxs without a body",
                self.display
            )));
        };
        self.finished_code = Some(code.finish(&self.context, maxs, &self.pool)?);
        Ok(())
    }

    fn visit_end(&mut self) -> Result<()> {
        if let Some(code) = self.code.take() {
            self.finished_code = Some(code.finish(&self.context, Maxs::Recompute, &self.pool)?);
        }

        let visible_parameters = self.parameter_annotations_body(0);
        let invisible_parameters = self.parameter_annotations_body(1);

        let mut pool = self.pool.borrow_mut();
        let mut attributes = AttributeTable::default();
        if let Some(code) = self.finished_code.take() {
            attributes.add(&mut pool, "Code", code)?;
        }
        if !self.exceptions.is_empty() {
            let mut body = Vec::with_capacity(2 + self.exceptions.len() * 2);
            let Ok(count) = u16::try_from(self.exceptions.len()) else {
                return Err(Error::Error(format!("{}: too many exceptions", self.display)));
            };
            push_be(&mut body, count);
            for exception in &self.exceptions {
                push_be(&mut body, *exception);
            }
            attributes.add(&mut pool, "Exceptions", body)?;
        }
        if let Some(signature) = self.signature {
            attributes.add_index(&mut pool, "Signature", signature)?;
        }
        if !self.parameters.is_empty() {
            let Ok(count) = u8::try_from(self.parameters.len()) else {
                return Err(Error::Error(format!("{}: too many parameters", self.display)));
            };
            let mut body = vec![count];
            for (name, access) in &self.parameters {
                push_be(&mut body, *name);
                push_be(&mut body, access.bits());
            }
            attributes.add(&mut pool, "MethodParameters", body)?;
        }
        if let Some(default) = self.annotation_default.take() {
            attributes.add(&mut pool, "AnnotationDefault", default)?;
        }
        add_annotations(&mut attributes, &mut pool, &self.annotations)?;
        if let Some(body) = visible_parameters {
            attributes.add(&mut pool, "RuntimeVisibleParameterAnnotations", body)?;
        }
        if let Some(body) = invisible_parameters {
            attributes.add(&mut pool, "RuntimeInvisibleParameterAnnotations", body)?;
        }
        add_opaque(&mut attributes, &mut pool, &self.attributes)?;
        drop(pool);

        let mut out = Vec::new();
        push_be(&mut out, self.context.access.bits());
        push_be(&mut out, self.name);
        push_be(&mut out, self.descriptor);
        attributes.write(&mut out)?;

        if let Some(slot) = self.slots.borrow_mut().get_mut(self.slot) {
            *slot = MemberSlot::Done(out);
        }
        Ok(())
    }
}
