//! Metadata suppression for shadow bodies.

use crate::{
    classfile::{
        AccessFlags, AnnotationSink, Attribute, Frame, Insn, Label, LocalVariable, Maxs,
        MethodVisitor,
    },
    transform::NullSink,
    Result,
};

/// Passes the executable part of a method body to `inner` and sends everything descriptive to
/// a [`NullSink`].
///
/// Forwarded: `visit_code`, instructions, labels, exception table entries, `visit_maxs` and
/// `visit_end`. Dropped: parameter names, annotations, opaque attributes, stack-map frames,
/// line numbers and local variable tables. Frames are dropped because the shadow body is
/// rewritten and its frames are derived again by the writer.
pub struct MetadataFilter<V> {
    inner: V,
    null: NullSink,
}

impl<V: MethodVisitor> MetadataFilter<V> {
    /// Wrap `inner`.
    pub fn new(inner: V) -> Self {
        MetadataFilter {
            inner,
            null: NullSink,
        }
    }

    /// The wrapped consumer.
    pub fn into_inner(self) -> V {
        self.inner
    }
}

impl<V: MethodVisitor> MethodVisitor for MetadataFilter<V> {
    fn visit_parameter(&mut self, name: Option<&str>, access: AccessFlags) -> Result<()> {
        self.null.visit_parameter(name, access)
    }

    fn visit_annotation_default(&mut self) -> Result<AnnotationSink<'_>> {
        self.null.visit_annotation_default()
    }

    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>> {
        MethodVisitor::visit_annotation(&mut self.null, descriptor, visible)
    }

    fn visit_annotable_parameter_count(&mut self, count: u8, visible: bool) -> Result<()> {
        self.null.visit_annotable_parameter_count(count, visible)
    }

    fn visit_parameter_annotation(
        &mut self,
        parameter: u8,
        descriptor: &str,
        visible: bool,
    ) -> Result<AnnotationSink<'_>> {
        self.null
            .visit_parameter_annotation(parameter, descriptor, visible)
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        MethodVisitor::visit_attribute(&mut self.null, attribute)
    }

    fn visit_code(&mut self) -> Result<()> {
        self.inner.visit_code()
    }

    fn visit_frame(&mut self, frame: &Frame) -> Result<()> {
        self.null.visit_frame(frame)
    }

    fn visit_insn(&mut self, insn: &Insn) -> Result<()> {
        self.inner.visit_insn(insn)
    }

    fn visit_label(&mut self, label: Label) -> Result<()> {
        self.inner.visit_label(label)
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<()> {
        self.inner
            .visit_try_catch_block(start, end, handler, catch_type)
    }

    fn visit_local_variable(&mut self, variable: &LocalVariable) -> Result<()> {
        self.null.visit_local_variable(variable)
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<()> {
        self.null.visit_line_number(line, start)
    }

    fn visit_code_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        self.null.visit_code_attribute(attribute)
    }

    fn visit_maxs(&mut self, maxs: Maxs) -> Result<()> {
        self.inner.visit_maxs(maxs)
    }

    fn visit_end(&mut self) -> Result<()> {
        self.inner.visit_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::opcodes::*,
        test::{replay_wrapped, single_method_class},
    };

    #[test]
    fn keeps_only_the_executable_body() -> Result<()> {
        let bytes = single_method_class()?;
        let events = replay_wrapped(&bytes, |_, sink| Box::new(MetadataFilter::new(sink)))?;

        let body = events
            .iter()
            .skip_while(|event| *event != "method twice(I)I")
            .skip(1)
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(body.first().map(String::as_str), Some("code"));
        assert!(body.iter().all(|event| !event.starts_with("annotation")
            && !event.starts_with("line")
            && !event.starts_with("local")
            && !event.starts_with("parameter")
            && !event.starts_with("frame")));
        assert!(body.contains(&format!("insn {}", Insn::Simple(IMUL))));
        assert!(body.contains(&"label L0".to_string()));
        assert!(body.iter().any(|event| event.starts_with("maxs")));
        assert_eq!(body.last().map(String::as_str), Some("end"));
        Ok(())
    }

    #[test]
    fn class_level_metadata_is_untouched() -> Result<()> {
        let bytes = single_method_class()?;
        let events = replay_wrapped(&bytes, |_, sink| Box::new(MetadataFilter::new(sink)))?;
        assert!(events.contains(&"annotation Ldemo/Marker; true".to_string()));
        assert!(events.contains(&"field LIMITI".to_string()));
        Ok(())
    }
}
