//! Shared fixtures for unit tests.


pub use recorder::{Recorder, Wrapped};

use std::sync::Arc;

use crate::{
    classfile::{
        AccessFlags, AnnotationValue, AnnotationVisitor, ClassHeader, ClassHierarchy, ClassReader,
        ClassVisitor, ClassWriter, FieldHeader, FieldVisitor, Insn, Label, LdcConstant, LocalVariable, Maxs, MethodHeader,
        MethodVisitor, opcodes::*,
    },
    Result,
};

/// A public Java 8 class extending `java/lang/Object`.
pub fn class_header(name: &str) -> ClassHeader {
    ClassHeader {
        minor_version: 0,
        major_version: 52,
        access: AccessFlags::PUBLIC | AccessFlags::SUPER,
        name: name.to_string(),
        signature: None,
        super_name: Some("java/lang/Object".to_string()),
        interfaces: Vec::new(),
    }
}

/// A public instance method.
pub fn method_header(name: &str, descriptor: &str) -> MethodHeader {
    MethodHeader {
        access: AccessFlags::PUBLIC,
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        signature: None,
        exceptions: Vec::new(),
    }
}

fn load(var: u16) -> Insn {
    Insn::Var { opcode: ILOAD, var }
}

/// `demo/Widget`: a class annotation, a constant field and `int twice(int)` with parameter
/// names, a method annotation, a line number and a local variable table.
pub fn single_method_class() -> Result<Vec<u8>> {
    let mut writer = ClassWriter::new();
    writer.visit(&class_header("demo/Widget"))?;
    if let Some(mut annotation) = ClassVisitor::visit_annotation(&mut writer, "Ldemo/Marker;", true)? {
        annotation.visit(Some("value"), &AnnotationValue::Int(7))?;
        if let Some(mut array) = annotation.visit_array(Some("names"))? {
            array.visit(None, &AnnotationValue::String("a".to_string()))?;
            array.visit(None, &AnnotationValue::String("b".to_string()))?;
            array.visit_end()?;
        }
        annotation.visit_end()?;
    }
    if let Some(mut field) = writer.visit_field(&FieldHeader {
        access: AccessFlags::PRIVATE | AccessFlags::STATIC | AccessFlags::FINAL,
        name: "LIMIT".to_string(),
        descriptor: "I".to_string(),
        signature: None,
        constant_value: Some(LdcConstant::Int(40_000)),
    })? {
        field.visit_end()?;
    }
    if let Some(mut method) = writer.visit_method(&method_header("twice", "(I)I"))? {
        method.visit_parameter(Some("value"), AccessFlags::empty())?;
        if let Some(mut annotation) = MethodVisitor::visit_annotation(&mut method, "Ldemo/Pure;", false)? {
            annotation.visit_end()?;
        }
        method.visit_code()?;
        method.visit_label(Label(0))?;
        method.visit_line_number(10, Label(0))?;
        method.visit_insn(&load(1))?;
        method.visit_insn(&Insn::Simple(ICONST_2))?;
        method.visit_insn(&Insn::Simple(IMUL))?;
        method.visit_insn(&Insn::Simple(IRETURN))?;
        method.visit_label(Label(1))?;
        for (index, name, descriptor) in [(0, "this", "Ldemo/Widget;"), (1, "value", "I")] {
            method.visit_local_variable(&LocalVariable {
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                signature: None,
                start: Label(0),
                end: Label(1),
                index,
            })?;
        }
        method.visit_maxs(Maxs::Recompute)?;
        method.visit_end()?;
    }
    writer.visit_end()?;
    writer.to_bytes()
}

/// `demo/Switch` with a constructor and methods that leave through more than one exit:
///
/// - `void pick(int)`: `if (v == 0) return; v++; return;`
/// - `int count(int)`: `if (v != 0) return 1; return 2;`
/// - `static void idle()`: `return;`
pub fn multi_exit_class() -> Result<Vec<u8>> {
    let mut writer = ClassWriter::new();
    writer.visit(&class_header("demo/Switch"))?;

    if let Some(mut init) = writer.visit_method(&method_header("<init>", "()V"))? {
        init.visit_code()?;
        init.visit_insn(&Insn::Var { opcode: ALOAD, var: 0 })?;
        init.visit_insn(&Insn::Method {
            opcode: INVOKESPECIAL,
            owner: "java/lang/Object".to_string(),
            name: "<init>".to_string(),
            descriptor: "()V".to_string(),
            interface: false,
        })?;
        init.visit_insn(&Insn::Simple(RETURN))?;
        init.visit_maxs(Maxs::Recompute)?;
        init.visit_end()?;
    }

    if let Some(mut pick) = writer.visit_method(&method_header("pick", "(I)V"))? {
        pick.visit_code()?;
        pick.visit_insn(&load(1))?;
        pick.visit_insn(&Insn::Jump { opcode: IFNE, target: Label(1) })?;
        pick.visit_insn(&Insn::Simple(RETURN))?;
        pick.visit_label(Label(1))?;
        pick.visit_insn(&Insn::Iinc { var: 1, increment: 1 })?;
        pick.visit_insn(&Insn::Simple(RETURN))?;
        pick.visit_maxs(Maxs::Recompute)?;
        pick.visit_end()?;
    }

    if let Some(mut count) = writer.visit_method(&method_header("count", "(I)I"))? {
        count.visit_code()?;
        count.visit_insn(&load(1))?;
        count.visit_insn(&Insn::Jump { opcode: IFEQ, target: Label(1) })?;
        count.visit_insn(&Insn::Simple(ICONST_1))?;
        count.visit_insn(&Insn::Simple(IRETURN))?;
        count.visit_label(Label(1))?;
        count.visit_insn(&Insn::Simple(ICONST_2))?;
        count.visit_insn(&Insn::Simple(IRETURN))?;
        count.visit_maxs(Maxs::Recompute)?;
        count.visit_end()?;
    }

    let mut idle = method_header("idle", "()V");
    idle.access |= AccessFlags::STATIC;
    if let Some(mut method) = writer.visit_method(&idle)? {
        method.visit_code()?;
        method.visit_insn(&Insn::Simple(RETURN))?;
        method.visit_maxs(Maxs::Recompute)?;
        method.visit_end()?;
    }

    writer.visit_end()?;
    writer.to_bytes()
}

/// A class extending `super_name` without members.
pub fn subclass(name: &str, super_name: &str) -> Result<Vec<u8>> {
    let mut header = class_header(name);
    header.super_name = Some(super_name.to_string());

    let mut writer = ClassWriter::new();
    writer.visit(&header)?;
    writer.visit_end()?;
    writer.to_bytes()
}

/// A class with `static Object pick(boolean)` returning either a new `left` or a new `right`,
/// written against `hierarchy`.
///
/// Both branches meet with different types on the stack, so its frames need the common
/// superclass of the two.
pub fn picker_class(
    name: &str,
    left: &str,
    right: &str,
    hierarchy: Arc<ClassHierarchy>,
) -> Result<Vec<u8>> {
    let construct = |class: &str| {
        [
            Insn::Type { opcode: NEW, class: class.to_string() },
            Insn::Simple(DUP),
            Insn::Method {
                opcode: INVOKESPECIAL,
                owner: class.to_string(),
                name: "<init>".to_string(),
                descriptor: "()V".to_string(),
                interface: false,
            },
        ]
    };

    let mut writer = ClassWriter::new().with_hierarchy(hierarchy);
    writer.visit(&class_header(name))?;
    let mut header = method_header("pick", "(Z)Ljava/lang/Object;");
    header.access |= AccessFlags::STATIC;
    if let Some(mut method) = writer.visit_method(&header)? {
        method.visit_code()?;
        method.visit_insn(&load(0))?;
        method.visit_insn(&Insn::Jump { opcode: IFEQ, target: Label(1) })?;
        for insn in construct(left) {
            method.visit_insn(&insn)?;
        }
        method.visit_insn(&Insn::Jump { opcode: GOTO, target: Label(2) })?;
        method.visit_label(Label(1))?;
        for insn in construct(right) {
            method.visit_insn(&insn)?;
        }
        method.visit_label(Label(2))?;
        method.visit_insn(&Insn::Simple(ARETURN))?;
        method.visit_maxs(Maxs::Recompute)?;
        method.visit_end()?;
    }
    writer.visit_end()?;
    writer.to_bytes()
}

/// Replays `bytes` into a [`Wrapped`] recorder and returns the recorded events.
pub fn replay_wrapped<F>(bytes: &[u8], wrap: F) -> Result<Vec<String>>
where
    F: FnMut(&MethodHeader, Box<dyn MethodVisitor>) -> Box<dyn MethodVisitor>,
{
    let mut wrapped = Wrapped::new(wrap);
    ClassReader::new(bytes)?.accept(&mut wrapped)?;
    Ok(wrapped.recorder.events())
}

/// The events recorded between `method {signature}` and the next `end`, exclusive.
///
/// Annotation streams end with `end` as well, so this only suits methods without annotations.
pub fn method_events(events: &[String], signature: &str) -> Vec<String> {
    let marker = format!("method {signature}");
    events
        .iter()
        .skip_while(|event| **event != marker)
        .skip(1)
        .take_while(|event| *event != "end")
        .cloned()
        .collect()
}
