//! Truncation of a method body at its first exit.

use crate::{
    classfile::{
        opcodes::{ICONST_0, IRETURN, RETURN},
        AccessFlags, AnnotationSink, Attribute, Frame, Insn, Label, LocalVariable, Maxs,
        MethodDescriptor, MethodVisitor, ValueCategory,
    },
    Error, Result,
};

/// Replaces the first exit instruction of a body with the default exit of the shadow return type
/// and drops everything that follows it.
///
/// Exits are `ireturn` through `return`; `athrow` is not one. For a `V` shadow the exit becomes
/// `return`, for an `I` shadow it becomes `iconst_0; ireturn`. Instructions, labels, frames,
/// line numbers, exception table entries, local variables and code attributes arriving after
/// the first exit are discarded. Branches that targeted a discarded label are redirected by the
/// writer, which also recomputes the maxs: `visit_maxs` is always forwarded as
/// [`Maxs::Recompute`].
///
/// Metadata events ahead of the body are passed through unchanged.
pub struct ReturnRewriter<V> {
    inner: V,
    category: ValueCategory,
    class: String,
    name: String,
    descriptor: String,
    emitted: bool,
}

impl<V: MethodVisitor> ReturnRewriter<V> {
    /// Rewrite the body of `class.name` + `descriptor` into `inner`.
    ///
    /// `descriptor` is the descriptor of the method being *written*, that is the shadow.
    pub fn new(inner: V, class: &str, name: &str, descriptor: &MethodDescriptor) -> Self {
        ReturnRewriter {
            inner,
            category: descriptor.return_category(),
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            emitted: false,
        }
    }

    /// Whether the replacement exit has been written.
    #[must_use]
    pub fn has_emitted(&self) -> bool {
        self.emitted
    }

    /// The wrapped consumer.
    pub fn into_inner(self) -> V {
        self.inner
    }

    fn emit_exit(&mut self) -> Result<()> {
        match self.category {
            ValueCategory::Void => self.inner.visit_insn(&Insn::Simple(RETURN))?,
            ValueCategory::IntLike => {
                self.inner.visit_insn(&Insn::Simple(ICONST_0))?;
                self.inner.visit_insn(&Insn::Simple(IRETURN))?;
            }
            ValueCategory::Other => {
                return Err(Error::ContractViolation {
                    class: self.class.clone(),
                    method: self.name.clone(),
                    descriptor: self.descriptor.clone(),
                    message: format!("no default exit for a {} return", self.category),
                })
            }
        }
        self.emitted = true;
        Ok(())
    }
}

impl<V: MethodVisitor> MethodVisitor for ReturnRewriter<V> {
    fn visit_parameter(&mut self, name: Option<&str>, access: AccessFlags) -> Result<()> {
        self.inner.visit_parameter(name, access)
    }

    fn visit_annotation_default(&mut self) -> Result<AnnotationSink<'_>> {
        self.inner.visit_annotation_default()
    }

    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>> {
        self.inner.visit_annotation(descriptor, visible)
    }

    fn visit_annotable_parameter_count(&mut self, count: u8, visible: bool) -> Result<()> {
        self.inner.visit_annotable_parameter_count(count, visible)
    }

    fn visit_parameter_annotation(
        &mut self,
        parameter: u8,
        descriptor: &str,
        visible: bool,
    ) -> Result<AnnotationSink<'_>> {
        self.inner
            .visit_parameter_annotation(parameter, descriptor, visible)
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        self.inner.visit_attribute(attribute)
    }

    fn visit_code(&mut self) -> Result<()> {
        self.inner.visit_code()
    }

    fn visit_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.emitted {
            return Ok(());
        }
        self.inner.visit_frame(frame)
    }

    fn visit_insn(&mut self, insn: &Insn) -> Result<()> {
        if self.emitted {
            return Ok(());
        }
        if insn.is_return() {
            return self.emit_exit();
        }
        self.inner.visit_insn(insn)
    }

    fn visit_label(&mut self, label: Label) -> Result<()> {
        if self.emitted {
            return Ok(());
        }
        self.inner.visit_label(label)
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<()> {
        if self.emitted {
            return Ok(());
        }
        self.inner
            .visit_try_catch_block(start, end, handler, catch_type)
    }

    fn visit_local_variable(&mut self, variable: &LocalVariable) -> Result<()> {
        if self.emitted {
            return Ok(());
        }
        self.inner.visit_local_variable(variable)
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<()> {
        if self.emitted {
            return Ok(());
        }
        self.inner.visit_line_number(line, start)
    }

    fn visit_code_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        if self.emitted {
            return Ok(());
        }
        self.inner.visit_code_attribute(attribute)
    }

    fn visit_maxs(&mut self, _maxs: Maxs) -> Result<()> {
        self.inner.visit_maxs(Maxs::Recompute)
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
        test::{method_events, multi_exit_class, replay_wrapped, Recorder},
    };

    fn rewriter(recorder: &Recorder, descriptor: &str) -> Result<ReturnRewriter<Recorder>> {
        Ok(ReturnRewriter::new(
            recorder.clone(),
            "demo/Switch",
            "run",
            &MethodDescriptor::parse(descriptor)?,
        ))
    }

    #[test]
    fn void_shadow_exits_with_return() -> Result<()> {
        let recorder = Recorder::default();
        let mut rewriter = rewriter(&recorder, "()V")?;
        rewriter.visit_code()?;
        rewriter.visit_insn(&Insn::Simple(ICONST_5))?;
        rewriter.visit_insn(&Insn::Simple(IRETURN))?;
        assert!(rewriter.has_emitted());
        rewriter.visit_maxs(Maxs::Explicit { stack: 1, locals: 1 })?;
        rewriter.visit_end()?;

        assert_eq!(
            recorder.events(),
            vec![
                "code".to_string(),
                format!("insn {}", Insn::Simple(ICONST_5)),
                format!("insn {}", Insn::Simple(RETURN)),
                "maxs Recompute".to_string(),
                "end".to_string(),
            ]
        );
        Ok(())
    }

    #[test]
    fn int_shadow_exits_with_zero() -> Result<()> {
        let recorder = Recorder::default();
        let mut rewriter = rewriter(&recorder, "()I")?;
        rewriter.visit_code()?;
        rewriter.visit_insn(&Insn::Simple(RETURN))?;

        assert_eq!(
            recorder.events(),
            vec![
                "code".to_string(),
                format!("insn {}", Insn::Simple(ICONST_0)),
                format!("insn {}", Insn::Simple(IRETURN)),
            ]
        );
        Ok(())
    }

    #[test]
    fn everything_after_the_first_exit_is_dropped() -> Result<()> {
        let recorder = Recorder::default();
        let mut rewriter = rewriter(&recorder, "()V")?;
        rewriter.visit_code()?;
        rewriter.visit_insn(&Insn::Simple(RETURN))?;
        recorder.clear();

        rewriter.visit_label(Label(4))?;
        rewriter.visit_frame(&Frame::Same)?;
        rewriter.visit_line_number(12, Label(4))?;
        rewriter.visit_insn(&Insn::Simple(NOP))?;
        rewriter.visit_insn(&Insn::Simple(RETURN))?;
        rewriter.visit_try_catch_block(Label(0), Label(4), Label(4), None)?;
        rewriter.visit_local_variable(&LocalVariable {
            name: "this".to_string(),
            descriptor: "Ldemo/Switch;".to_string(),
            signature: None,
            start: Label(0),
            end: Label(4),
            index: 0,
        })?;
        rewriter.visit_code_attribute(&Attribute {
            name: "Custom".to_string(),
            data: vec![1],
        })?;
        assert!(recorder.events().is_empty());

        rewriter.visit_maxs(Maxs::Recompute)?;
        rewriter.visit_end()?;
        assert_eq!(recorder.events(), vec!["maxs Recompute", "end"]);
        Ok(())
    }

    #[test]
    fn athrow_is_not_an_exit() -> Result<()> {
        let recorder = Recorder::default();
        let mut rewriter = rewriter(&recorder, "()V")?;
        rewriter.visit_insn(&Insn::Simple(ATHROW))?;
        assert!(!rewriter.has_emitted());
        assert_eq!(recorder.events(), vec![format!("insn {}", Insn::Simple(ATHROW))]);
        Ok(())
    }

    #[test]
    fn metadata_ahead_of_the_body_passes() -> Result<()> {
        let recorder = Recorder::default();
        let mut rewriter = rewriter(&recorder, "()V")?;
        rewriter.visit_parameter(Some("value"), AccessFlags::FINAL)?;
        rewriter.visit_attribute(&Attribute {
            name: "Custom".to_string(),
            data: Vec::new(),
        })?;
        assert_eq!(recorder.events().len(), 2);
        Ok(())
    }

    #[test]
    fn wide_return_category_is_a_contract_violation() -> Result<()> {
        let recorder = Recorder::default();
        let mut rewriter = rewriter(&recorder, "()J")?;
        rewriter.visit_code()?;
        rewriter.visit_insn(&Insn::Simple(LCONST_0))?;
        let result = rewriter.visit_insn(&Insn::Simple(LRETURN));
        assert!(matches!(
            result,
            Err(Error::ContractViolation { ref method, ref descriptor, .. })
                if method == "run" && descriptor == "()J"
        ));
        assert!(!rewriter.has_emitted());
        Ok(())
    }

    #[test]
    fn truncates_a_real_body_at_its_first_exit() -> Result<()> {
        let bytes = multi_exit_class()?;
        let events = replay_wrapped(&bytes, |header, sink| {
            let descriptor = MethodDescriptor::parse(&header.descriptor);
            match descriptor {
                Ok(descriptor) => Box::new(ReturnRewriter::new(
                    sink,
                    "demo/Switch",
                    &header.name,
                    &descriptor,
                )),
                Err(_) => sink,
            }
        })?;

        let count = method_events(&events, "count(I)I");
        let insns = count
            .iter()
            .filter(|event| event.starts_with("insn "))
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(
            insns,
            vec![
                format!("insn {}", Insn::Var { opcode: ILOAD, var: 1 }),
                format!("insn {}", Insn::Jump { opcode: IFEQ, target: Label(6) }),
                format!("insn {}", Insn::Simple(ICONST_1)),
                format!("insn {}", Insn::Simple(ICONST_0)),
                format!("insn {}", Insn::Simple(IRETURN)),
            ]
        );
        assert_eq!(count.last().map(String::as_str), Some("maxs Recompute"));
        Ok(())
    }
}
