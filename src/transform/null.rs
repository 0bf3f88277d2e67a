//! A consumer that accepts every event and keeps nothing.

use crate::{
    classfile::{
        AccessFlags, AnnotationSink, AnnotationValue, AnnotationVisitor, Attribute, ClassHeader,
        ClassVisitor, FieldHeader, FieldVisitor, Frame, Insn, Label, LocalVariable, Maxs,
        MethodHeader, MethodSink, MethodVisitor,
    },
    Result,
};

/// Discards every event and declines every nested stream.
///
/// The shadow pipeline routes the metadata its decoy must not carry here.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NullSink;

impl AnnotationVisitor for NullSink {
    fn visit(&mut self, _name: Option<&str>, _value: &AnnotationValue) -> Result<()> {
        Ok(())
    }

    fn visit_enum(&mut self, _name: Option<&str>, _descriptor: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    fn visit_annotation(
        &mut self,
        _name: Option<&str>,
        _descriptor: &str,
    ) -> Result<AnnotationSink<'_>> {
        Ok(None)
    }

    fn visit_array(&mut self, _name: Option<&str>) -> Result<AnnotationSink<'_>> {
        Ok(None)
    }

    fn visit_end(&mut self) -> Result<()> {
        Ok(())
    }
}

impl FieldVisitor for NullSink {
    fn visit_annotation(&mut self, _descriptor: &str, _visible: bool) -> Result<AnnotationSink<'_>> {
        Ok(None)
    }

    fn visit_attribute(&mut self, _attribute: &Attribute) -> Result<()> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<()> {
        Ok(())
    }
}

impl MethodVisitor for NullSink {
    fn visit_parameter(&mut self, _name: Option<&str>, _access: AccessFlags) -> Result<()> {
        Ok(())
    }

    fn visit_annotation_default(&mut self) -> Result<AnnotationSink<'_>> {
        Ok(None)
    }

    fn visit_annotation(&mut self, _descriptor: &str, _visible: bool) -> Result<AnnotationSink<'_>> {
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
        Ok(())
    }

    fn visit_frame(&mut self, _frame: &Frame) -> Result<()> {
        Ok(())
    }

    fn visit_insn(&mut self, _insn: &Insn) -> Result<()> {
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
        Ok(())
    }

    fn visit_local_variable(&mut self, _variable: &LocalVariable) -> Result<()> {
        Ok(())
    }

    fn visit_line_number(&mut self, _line: u16, _start: Label) -> Result<()> {
        Ok(())
    }

    fn visit_code_attribute(&mut self, _attribute: &Attribute) -> Result<()> {
        Ok(())
    }

    fn visit_maxs(&mut self, _maxs: Maxs) -> Result<()> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<()> {
        Ok(())
    }
}

impl ClassVisitor for NullSink {
    fn visit(&mut self, _header: &ClassHeader) -> Result<()> {
        Ok(())
    }

    fn visit_annotation(&mut self, _descriptor: &str, _visible: bool) -> Result<AnnotationSink<'_>> {
        Ok(None)
    }

    fn visit_attribute(&mut self, _attribute: &Attribute) -> Result<()> {
        Ok(())
    }

    fn visit_field(
        &mut self,
        _header: &FieldHeader,
    ) -> Result<Option<Box<dyn FieldVisitor + '_>>> {
        Ok(None)
    }

    fn visit_method(&mut self, _header: &MethodHeader) -> Result<MethodSink> {
        Ok(None)
    }

    fn visit_end(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classfile::ClassReader, test::single_method_class};

    #[test]
    fn declines_nested_streams() -> Result<()> {
        let mut sink = NullSink;
        assert!(MethodVisitor::visit_annotation(&mut sink, "Ldemo/Marker;", true)?.is_none());
        assert!(sink.visit_annotation_default()?.is_none());
        assert!(sink.visit_parameter_annotation(0, "Ldemo/Marker;", false)?.is_none());
        assert!(AnnotationVisitor::visit_array(&mut sink, Some("names"))?.is_none());
        Ok(())
    }

    #[test]
    fn swallows_a_whole_class() -> Result<()> {
        let bytes = single_method_class()?;
        ClassReader::new(&bytes)?.accept(&mut NullSink)
    }
}
