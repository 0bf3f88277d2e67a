//! The structural event vocabulary.
//!
//! A class is described by a single ordered pass of events over these traits. The reader is a
//! producer, the writer is a consumer, and everything in [`crate::transform`] sits in between.
//!
//! # Nested streams
//!
//! Some events open a nested stream: `visit_annotation` returns an [`AnnotationVisitor`] that
//! must receive its own events up to `visit_end` before the parent continues. Returning `None`
//! means "not interested", and the producer skips the nested events. Nested annotation and field
//! consumers borrow their parent; method consumers are owned, so a class consumer can hand out
//! several independent method consumers at the same time.
//!
//! # Ordering
//!
//! Method events arrive in this order:
//!
//! ```text
//! visit_parameter* visit_annotation_default? visit_annotation*
//! (visit_annotable_parameter_count visit_parameter_annotation*)* visit_attribute*
//! ( visit_code visit_try_catch_block*
//!   (visit_frame | visit_insn | visit_label | visit_line_number)*
//!   visit_local_variable* visit_code_attribute* visit_maxs )?
//! visit_end
//! ```
//!
//! Every event returns [`crate::Result`]; a consumer fails the whole class by returning an
//! error.

use crate::{
    classfile::{
        access::AccessFlags,
        frame::{Frame, Maxs},
        instruction::{Insn, Label},
        member::{
            AnnotationValue, Attribute, ClassHeader, FieldHeader, LocalVariable, MethodHeader,
        },
    },
    Result,
};

/// A nested annotation consumer, borrowed from its parent for the lifetime `'a`.
pub type AnnotationSink<'a> = Option<Box<dyn AnnotationVisitor + 'a>>;

/// An owned method consumer.
pub type MethodSink = Option<Box<dyn MethodVisitor>>;

/// Consumer of one annotation (or one annotation array).
pub trait AnnotationVisitor {
    /// A primitive, string or class element value; `name` is `None` inside arrays.
    fn visit(&mut self, name: Option<&str>, value: &AnnotationValue) -> Result<()>;

    /// An enum constant element value.
    fn visit_enum(&mut self, name: Option<&str>, descriptor: &str, value: &str) -> Result<()>;

    /// A nested annotation element value.
    fn visit_annotation(&mut self, name: Option<&str>, descriptor: &str) -> Result<AnnotationSink<'_>>;

    /// An array element value; its elements are visited unnamed on the returned consumer.
    fn visit_array(&mut self, name: Option<&str>) -> Result<AnnotationSink<'_>>;

    /// End of this annotation.
    fn visit_end(&mut self) -> Result<()>;
}

/// Consumer of one field.
pub trait FieldVisitor {
    /// A declaration annotation.
    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>>;

    /// An attribute the codec does not interpret.
    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()>;

    /// End of the field.
    fn visit_end(&mut self) -> Result<()>;
}

/// Consumer of one method: its metadata and its body.
pub trait MethodVisitor {
    /// An entry of `MethodParameters`.
    fn visit_parameter(&mut self, name: Option<&str>, access: AccessFlags) -> Result<()>;

    /// The `AnnotationDefault` of an annotation interface method; the value is visited unnamed.
    fn visit_annotation_default(&mut self) -> Result<AnnotationSink<'_>>;

    /// A declaration annotation.
    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>>;

    /// Number of parameters that may carry annotations, ahead of the parameter annotations of
    /// one visibility.
    fn visit_annotable_parameter_count(&mut self, count: u8, visible: bool) -> Result<()>;

    /// An annotation on parameter `parameter`.
    fn visit_parameter_annotation(
        &mut self,
        parameter: u8,
        descriptor: &str,
        visible: bool,
    ) -> Result<AnnotationSink<'_>>;

    /// A method attribute the codec does not interpret.
    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()>;

    /// Start of the body.
    fn visit_code(&mut self) -> Result<()>;

    /// A stack-map frame at the current position.
    fn visit_frame(&mut self, frame: &Frame) -> Result<()>;

    /// One instruction.
    fn visit_insn(&mut self, insn: &Insn) -> Result<()>;

    /// Places `label` at the current position.
    fn visit_label(&mut self, label: Label) -> Result<()>;

    /// An exception table entry; `catch_type` is `None` for `finally` handlers.
    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<()>;

    /// A local variable debug entry.
    fn visit_local_variable(&mut self, variable: &LocalVariable) -> Result<()>;

    /// A line number for the instructions starting at `start`.
    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<()>;

    /// A `Code` sub-attribute the codec does not interpret.
    fn visit_code_attribute(&mut self, attribute: &Attribute) -> Result<()>;

    /// Stack depth and local slot count of the body.
    fn visit_maxs(&mut self, maxs: Maxs) -> Result<()>;

    /// End of the method.
    fn visit_end(&mut self) -> Result<()>;
}

/// Consumer of one class.
pub trait ClassVisitor {
    /// The class header; always the first event.
    fn visit(&mut self, header: &ClassHeader) -> Result<()>;

    /// A class annotation.
    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>>;

    /// A class attribute the codec does not interpret.
    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()>;

    /// A field declaration.
    fn visit_field(&mut self, header: &FieldHeader)
        -> Result<Option<Box<dyn FieldVisitor + '_>>>;

    /// A method declaration.
    fn visit_method(&mut self, header: &MethodHeader) -> Result<MethodSink>;

    /// End of the class.
    fn visit_end(&mut self) -> Result<()>;
}

impl<T: AnnotationVisitor + ?Sized> AnnotationVisitor for Box<T> {
    fn visit(&mut self, name: Option<&str>, value: &AnnotationValue) -> Result<()> {
        (**self).visit(name, value)
    }

    fn visit_enum(&mut self, name: Option<&str>, descriptor: &str, value: &str) -> Result<()> {
        (**self).visit_enum(name, descriptor, value)
    }

    fn visit_annotation(&mut self, name: Option<&str>, descriptor: &str) -> Result<AnnotationSink<'_>> {
        (**self).visit_annotation(name, descriptor)
    }

    fn visit_array(&mut self, name: Option<&str>) -> Result<AnnotationSink<'_>> {
        (**self).visit_array(name)
    }

    fn visit_end(&mut self) -> Result<()> {
        (**self).visit_end()
    }
}

impl<T: FieldVisitor + ?Sized> FieldVisitor for Box<T> {
    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>> {
        (**self).visit_annotation(descriptor, visible)
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        (**self).visit_attribute(attribute)
    }

    fn visit_end(&mut self) -> Result<()> {
        (**self).visit_end()
    }
}

impl<T: MethodVisitor + ?Sized> MethodVisitor for Box<T> {
    fn visit_parameter(&mut self, name: Option<&str>, access: AccessFlags) -> Result<()> {
        (**self).visit_parameter(name, access)
    }

    fn visit_annotation_default(&mut self) -> Result<AnnotationSink<'_>> {
        (**self).visit_annotation_default()
    }

    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>> {
        (**self).visit_annotation(descriptor, visible)
    }

    fn visit_annotable_parameter_count(&mut self, count: u8, visible: bool) -> Result<()> {
        (**self).visit_annotable_parameter_count(count, visible)
    }

    fn visit_parameter_annotation(
        &mut self,
        parameter: u8,
        descriptor: &str,
        visible: bool,
    ) -> Result<AnnotationSink<'_>> {
        (**self).visit_parameter_annotation(parameter, descriptor, visible)
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        (**self).visit_attribute(attribute)
    }

    fn visit_code(&mut self) -> Result<()> {
        (**self).visit_code()
    }

    fn visit_frame(&mut self, frame: &Frame) -> Result<()> {
        (**self).visit_frame(frame)
    }

    fn visit_insn(&mut self, insn: &Insn) -> Result<()> {
        (**self).visit_insn(insn)
    }

    fn visit_label(&mut self, label: Label) -> Result<()> {
        (**self).visit_label(label)
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<()> {
        (**self).visit_try_catch_block(start, end, handler, catch_type)
    }

    fn visit_local_variable(&mut self, variable: &LocalVariable) -> Result<()> {
        (**self).visit_local_variable(variable)
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<()> {
        (**self).visit_line_number(line, start)
    }

    fn visit_code_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        (**self).visit_code_attribute(attribute)
    }

    fn visit_maxs(&mut self, maxs: Maxs) -> Result<()> {
        (**self).visit_maxs(maxs)
    }

    fn visit_end(&mut self) -> Result<()> {
        (**self).visit_end()
    }
}

impl<T: ClassVisitor + ?Sized> ClassVisitor for Box<T> {
    fn visit(&mut self, header: &ClassHeader) -> Result<()> {
        (**self).visit(header)
    }

    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>> {
        (**self).visit_annotation(descriptor, visible)
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        (**self).visit_attribute(attribute)
    }

    fn visit_field(
        &mut self,
        header: &FieldHeader,
    ) -> Result<Option<Box<dyn FieldVisitor + '_>>> {
        (**self).visit_field(header)
    }

    fn visit_method(&mut self, header: &MethodHeader) -> Result<MethodSink> {
        (**self).visit_method(header)
    }

    fn visit_end(&mut self) -> Result<()> {
        (**self).visit_end()
    }
}
