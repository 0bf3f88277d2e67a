//! Duplication of one event stream into two consumers.
//!
//! [`fanout`] is the entry point: given two optional consumers of the same kind it returns a
//! single optional consumer that forwards every event to the first and then to the second. If
//! either side is absent the other is returned as is, so no wrapper is allocated for a stream
//! only one side wants.

use crate::{
    classfile::{
        AccessFlags, AnnotationSink, AnnotationValue, AnnotationVisitor, Attribute, ClassHeader,
        ClassVisitor, FieldHeader, FieldVisitor, Frame, Insn, Label, LocalVariable, Maxs,
        MethodHeader, MethodSink, MethodVisitor,
    },
    Result,
};

/// Consumer kinds that two boxed consumers can be merged into.
pub trait Join {
    /// A consumer forwarding to `first`, then to `second`.
    fn join(first: Box<Self>, second: Box<Self>) -> Box<Self>;
}

impl<'a> Join for dyn AnnotationVisitor + 'a {
    fn join(first: Box<Self>, second: Box<Self>) -> Box<Self> {
        Box::new(Fanout::new(first, second))
    }
}

impl<'a> Join for dyn FieldVisitor + 'a {
    fn join(first: Box<Self>, second: Box<Self>) -> Box<Self> {
        Box::new(Fanout::new(first, second))
    }
}

impl Join for dyn MethodVisitor {
    fn join(first: Box<Self>, second: Box<Self>) -> Box<Self> {
        Box::new(Fanout::new(first, second))
    }
}

impl<'a> Join for dyn ClassVisitor + 'a {
    fn join(first: Box<Self>, second: Box<Self>) -> Box<Self> {
        Box::new(Fanout::new(first, second))
    }
}

/// Merge two optional consumers.
///
/// # Examples
///
/// ```rust
/// use shadowclass::{classfile::MethodVisitor, transform::{fanout, NullSink}};
///
/// let one: Option<Box<dyn MethodVisitor>> = Some(Box::new(NullSink));
/// assert!(fanout(one, None).is_some());
/// assert!(fanout::<dyn MethodVisitor>(None, None).is_none());
/// ```
pub fn fanout<T: ?Sized + Join>(first: Option<Box<T>>, second: Option<Box<T>>) -> Option<Box<T>> {
    match (first, second) {
        (Some(first), Some(second)) => Some(T::join(first, second)),
        (first, None) => first,
        (None, second) => second,
    }
}

/// Forwards every event to `first`, then to `second`.
///
/// Nested streams are opened on both sides and merged with [`fanout`]. An error from `first`
/// stops the event before it reaches `second`.
pub struct Fanout<A, B> {
    first: A,
    second: B,
}

impl<A, B> Fanout<A, B> {
    /// Fan out to `first` and `second`.
    pub fn new(first: A, second: B) -> Self {
        Fanout { first, second }
    }

    /// The two consumers.
    pub fn into_inner(self) -> (A, B) {
        (self.first, self.second)
    }
}

impl<A: AnnotationVisitor, B: AnnotationVisitor> AnnotationVisitor for Fanout<A, B> {
    fn visit(&mut self, name: Option<&str>, value: &AnnotationValue) -> Result<()> {
        self.first.visit(name, value)?;
        self.second.visit(name, value)
    }

    fn visit_enum(&mut self, name: Option<&str>, descriptor: &str, value: &str) -> Result<()> {
        self.first.visit_enum(name, descriptor, value)?;
        self.second.visit_enum(name, descriptor, value)
    }

    fn visit_annotation(&mut self, name: Option<&str>, descriptor: &str) -> Result<AnnotationSink<'_>> {
        let first = self.first.visit_annotation(name, descriptor)?;
        let second = self.second.visit_annotation(name, descriptor)?;
        Ok(fanout(first, second))
    }

    fn visit_array(&mut self, name: Option<&str>) -> Result<AnnotationSink<'_>> {
        let first = self.first.visit_array(name)?;
        let second = self.second.visit_array(name)?;
        Ok(fanout(first, second))
    }

    fn visit_end(&mut self) -> Result<()> {
        self.first.visit_end()?;
        self.second.visit_end()
    }
}

impl<A: FieldVisitor, B: FieldVisitor> FieldVisitor for Fanout<A, B> {
    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>> {
        let first = self.first.visit_annotation(descriptor, visible)?;
        let second = self.second.visit_annotation(descriptor, visible)?;
        Ok(fanout(first, second))
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        self.first.visit_attribute(attribute)?;
        self.second.visit_attribute(attribute)
    }

    fn visit_end(&mut self) -> Result<()> {
        self.first.visit_end()?;
        self.second.visit_end()
    }
}

impl<A: MethodVisitor, B: MethodVisitor> MethodVisitor for Fanout<A, B> {
    fn visit_parameter(&mut self, name: Option<&str>, access: AccessFlags) -> Result<()> {
        self.first.visit_parameter(name, access)?;
        self.second.visit_parameter(name, access)
    }

    fn visit_annotation_default(&mut self) -> Result<AnnotationSink<'_>> {
        let first = self.first.visit_annotation_default()?;
        let second = self.second.visit_annotation_default()?;
        Ok(fanout(first, second))
    }

    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>> {
        let first = self.first.visit_annotation(descriptor, visible)?;
        let second = self.second.visit_annotation(descriptor, visible)?;
        Ok(fanout(first, second))
    }

    fn visit_annotable_parameter_count(&mut self, count: u8, visible: bool) -> Result<()> {
        self.first.visit_annotable_parameter_count(count, visible)?;
        self.second.visit_annotable_parameter_count(count, visible)
    }

    fn visit_parameter_annotation(
        &mut self,
        parameter: u8,
        descriptor: &str,
        visible: bool,
    ) -> Result<AnnotationSink<'_>> {
        let first = self
            .first
            .visit_parameter_annotation(parameter, descriptor, visible)?;
        let second = self
            .second
            .visit_parameter_annotation(parameter, descriptor, visible)?;
        Ok(fanout(first, second))
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        self.first.visit_attribute(attribute)?;
        self.second.visit_attribute(attribute)
    }

    fn visit_code(&mut self) -> Result<()> {
        self.first.visit_code()?;
        self.second.visit_code()
    }

    fn visit_frame(&mut self, frame: &Frame) -> Result<()> {
        self.first.visit_frame(frame)?;
        self.second.visit_frame(frame)
    }

    fn visit_insn(&mut self, insn: &Insn) -> Result<()> {
        self.first.visit_insn(insn)?;
        self.second.visit_insn(insn)
    }

    fn visit_label(&mut self, label: Label) -> Result<()> {
        self.first.visit_label(label)?;
        self.second.visit_label(label)
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<()> {
        self.first
            .visit_try_catch_block(start, end, handler, catch_type)?;
        self.second
            .visit_try_catch_block(start, end, handler, catch_type)
    }

    fn visit_local_variable(&mut self, variable: &LocalVariable) -> Result<()> {
        self.first.visit_local_variable(variable)?;
        self.second.visit_local_variable(variable)
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<()> {
        self.first.visit_line_number(line, start)?;
        self.second.visit_line_number(line, start)
    }

    fn visit_code_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        self.first.visit_code_attribute(attribute)?;
        self.second.visit_code_attribute(attribute)
    }

    fn visit_maxs(&mut self, maxs: Maxs) -> Result<()> {
        self.first.visit_maxs(maxs)?;
        self.second.visit_maxs(maxs)
    }

    fn visit_end(&mut self) -> Result<()> {
        self.first.visit_end()?;
        self.second.visit_end()
    }
}

impl<A: ClassVisitor, B: ClassVisitor> ClassVisitor for Fanout<A, B> {
    fn visit(&mut self, header: &ClassHeader) -> Result<()> {
        self.first.visit(header)?;
        self.second.visit(header)
    }

    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>> {
        let first = self.first.visit_annotation(descriptor, visible)?;
        let second = self.second.visit_annotation(descriptor, visible)?;
        Ok(fanout(first, second))
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        self.first.visit_attribute(attribute)?;
        self.second.visit_attribute(attribute)
    }

    fn visit_field(
        &mut self,
        header: &FieldHeader,
    ) -> Result<Option<Box<dyn FieldVisitor + '_>>> {
        let first = self.first.visit_field(header)?;
        let second = self.second.visit_field(header)?;
        Ok(fanout(first, second))
    }

    fn visit_method(&mut self, header: &MethodHeader) -> Result<MethodSink> {
        let first = self.first.visit_method(header)?;
        let second = self.second.visit_method(header)?;
        Ok(fanout(first, second))
    }

    fn visit_end(&mut self) -> Result<()> {
        self.first.visit_end()?;
        self.second.visit_end()
    }
}
