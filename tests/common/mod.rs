//! Class building and inspection helpers shared by the integration tests.
#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use shadowclass::{
    classfile::{
        opcodes::*, AccessFlags, AnnotationSink, AnnotationVisitor, Attribute, ClassHeader, ClassReader,
        ClassVisitor, ClassWriter, FieldHeader, FieldVisitor, Frame, Insn, Label, LocalVariable,
        Maxs, MethodHeader, MethodSink, MethodVisitor,
    },
    Result,
};

/// One event of a method body, as handed to [`build_class`].
#[derive(Debug, Clone)]
pub enum Step {
    Insn(Insn),
    Label(Label),
    Line(u16, Label),
    TryCatch(Label, Label, Label, Option<&'static str>),
    Local(&'static str, &'static str, Label, Label, u16),
}

/// A method declaration with its body; an empty body means no `Code` attribute.
pub struct MethodSpec {
    pub header: MethodHeader,
    pub annotations: Vec<&'static str>,
    pub body: Vec<Step>,
}

impl MethodSpec {
    pub fn new(access: AccessFlags, name: &str, descriptor: &str, body: Vec<Step>) -> Self {
        MethodSpec {
            header: MethodHeader {
                access,
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                signature: None,
                exceptions: Vec::new(),
            },
            annotations: Vec::new(),
            body,
        }
    }

    pub fn public(name: &str, descriptor: &str, body: Vec<Step>) -> Self {
        Self::new(AccessFlags::PUBLIC, name, descriptor, body)
    }
}

pub fn insns(insns: impl IntoIterator<Item = Insn>) -> Vec<Step> {
    insns.into_iter().map(Step::Insn).collect()
}

pub fn simple(opcode: u8) -> Insn {
    Insn::Simple(opcode)
}

pub fn var(opcode: u8, var: u16) -> Insn {
    Insn::Var { opcode, var }
}

pub fn constructor() -> MethodSpec {
    MethodSpec::public(
        "<init>",
        "()V",
        insns([
            var(ALOAD, 0),
            Insn::Method {
                opcode: INVOKESPECIAL,
                owner: "java/lang/Object".to_string(),
                name: "<init>".to_string(),
                descriptor: "()V".to_string(),
                interface: false,
            },
            simple(RETURN),
        ]),
    )
}

/// Write a Java 8 class through the public writer, recomputing maxs and frames.
pub fn build_class(name: &str, methods: &[MethodSpec]) -> Result<Vec<u8>> {
    let mut writer = ClassWriter::new();
    writer.visit(&ClassHeader {
        minor_version: 0,
        major_version: 52,
        access: AccessFlags::PUBLIC | AccessFlags::SUPER,
        name: name.to_string(),
        signature: None,
        super_name: Some("java/lang/Object".to_string()),
        interfaces: Vec::new(),
    })?;

    for spec in methods {
        let Some(mut method) = writer.visit_method(&spec.header)? else {
            continue;
        };
        for annotation in &spec.annotations {
            if let Some(mut sink) = method.visit_annotation(annotation, true)? {
                sink.visit_end()?;
            }
        }
        if !spec.body.is_empty() {
            method.visit_code()?;
            for step in &spec.body {
                if let Step::TryCatch(start, end, handler, catch_type) = step {
                    method.visit_try_catch_block(*start, *end, *handler, *catch_type)?;
                }
            }
            for step in &spec.body {
                match step {
                    Step::Insn(insn) => method.visit_insn(insn)?,
                    Step::Label(label) => method.visit_label(*label)?,
                    Step::Line(line, start) => method.visit_line_number(*line, *start)?,
                    Step::TryCatch(..) | Step::Local(..) => {}
                }
            }
            for step in &spec.body {
                if let Step::Local(name, descriptor, start, end, index) = step {
                    method.visit_local_variable(&LocalVariable {
                        name: (*name).to_string(),
                        descriptor: (*descriptor).to_string(),
                        signature: None,
                        start: *start,
                        end: *end,
                        index: *index,
                    })?;
                }
            }
            method.visit_maxs(Maxs::Recompute)?;
        }
        method.visit_end()?;
    }

    writer.visit_end()?;
    writer.to_bytes()
}

/// What a class file declares, method by method.
#[derive(Debug, Default, Clone)]
pub struct MethodRecord {
    pub header: Option<MethodHeader>,
    pub annotations: Vec<String>,
    pub insns: Vec<Insn>,
    pub try_catch_blocks: usize,
    pub line_numbers: usize,
    pub locals: usize,
    pub frames: usize,
    pub maxs: Option<Maxs>,
    pub has_code: bool,
}

impl MethodRecord {
    pub fn signature(&self) -> String {
        self.header
            .as_ref()
            .map(|header| format!("{}{}", header.name, header.descriptor))
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct Inspector {
    methods: Rc<RefCell<Vec<MethodRecord>>>,
}

struct MethodInspector {
    methods: Rc<RefCell<Vec<MethodRecord>>>,
    index: usize,
}

impl MethodInspector {
    fn with<F: FnOnce(&mut MethodRecord)>(&self, update: F) {
        if let Some(record) = self.methods.borrow_mut().get_mut(self.index) {
            update(record);
        }
    }
}

impl ClassVisitor for Inspector {
    fn visit(&mut self, _header: &ClassHeader) -> Result<()> {
        Ok(())
    }

    fn visit_annotation(&mut self, _descriptor: &str, _visible: bool) -> Result<AnnotationSink<'_>> {
        Ok(None)
    }

    fn visit_attribute(&mut self, _attribute: &Attribute) -> Result<()> {
        Ok(())
    }

    fn visit_field(&mut self, _header: &FieldHeader) -> Result<Option<Box<dyn FieldVisitor + '_>>> {
        Ok(None)
    }

    fn visit_method(&mut self, header: &MethodHeader) -> Result<MethodSink> {
        let mut methods = self.methods.borrow_mut();
        methods.push(MethodRecord {
            header: Some(header.clone()),
            ..MethodRecord::default()
        });
        Ok(Some(Box::new(MethodInspector {
            methods: Rc::clone(&self.methods),
            index: methods.len() - 1,
        })))
    }

    fn visit_end(&mut self) -> Result<()> {
        Ok(())
    }
}

impl MethodVisitor for MethodInspector {
    fn visit_parameter(&mut self, _name: Option<&str>, _access: AccessFlags) -> Result<()> {
        Ok(())
    }

    fn visit_annotation_default(&mut self) -> Result<AnnotationSink<'_>> {
        Ok(None)
    }

    fn visit_annotation(&mut self, descriptor: &str, _visible: bool) -> Result<AnnotationSink<'_>> {
        self.with(|record| record.annotations.push(descriptor.to_string()));
        Ok(None)
    }

    fn visit_annotable_parameter_count(&mut self, _count: u8, _visible: bool) -> Result<()> {
        Ok(())
    }

    fn visit_parameter_annotation(
        &mut self,
        _parameter: u8,
        _descriptor: &str,
        _visible: bool,
    ) -> Result<AnnotationSink<'_>> {
        Ok(None)
    }

    fn visit_attribute(&mut self, _attribute: &Attribute) -> Result<()> {
        Ok(())
    }

    fn visit_code(&mut self) -> Result<()> {
        self.with(|record| record.has_code = true);
        Ok(())
    }

    fn visit_frame(&mut self, _frame: &Frame) -> Result<()> {
        self.with(|record| record.frames += 1);
        Ok(())
    }

    fn visit_insn(&mut self, insn: &Insn) -> Result<()> {
        self.with(|record| record.insns.push(insn.clone()));
        Ok(())
    }

    fn visit_label(&mut self, _label: Label) -> Result<()> {
        Ok(())
    }

    fn visit_try_catch_block(
        &mut self,
        _start: Label,
        _end: Label,
        _handler: Label,
        _catch_type: Option<&str>,
    ) -> Result<()> {
        self.with(|record| record.try_catch_blocks += 1);
        Ok(())
    }

    fn visit_local_variable(&mut self, _variable: &LocalVariable) -> Result<()> {
        self.with(|record| record.locals += 1);
        Ok(())
    }

    fn visit_line_number(&mut self, _line: u16, _start: Label) -> Result<()> {
        self.with(|record| record.line_numbers += 1);
        Ok(())
    }

    fn visit_code_attribute(&mut self, _attribute: &Attribute) -> Result<()> {
        Ok(())
    }

    fn visit_maxs(&mut self, maxs: Maxs) -> Result<()> {
        self.with(|record| record.maxs = Some(maxs));
        Ok(())
    }

    fn visit_end(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Read `bytes` back through the public reader.
pub fn inspect(bytes: &[u8]) -> Result<Vec<MethodRecord>> {
    let mut inspector = Inspector::default();
    ClassReader::new(bytes)?.accept(&mut inspector)?;
    let methods = inspector.methods.borrow().clone();
    Ok(methods)
}

/// The record of `signature` (`name` + descriptor), if declared.
pub fn method<'a>(methods: &'a [MethodRecord], signature: &str) -> Option<&'a MethodRecord> {
    methods.iter().find(|record| record.signature() == signature)
}
