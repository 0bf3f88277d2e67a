//! Per-class orchestration of the shadow pipeline.

use crate::{
    classfile::{
        AnnotationSink, Attribute, ClassHeader, ClassVisitor, FieldHeader, FieldVisitor,
        MethodDescriptor, MethodHeader, MethodSink, MethodVisitor,
    },
    transform::{fanout, shadow_header, MetadataFilter, ReturnRewriter},
    Result,
};

/// A class consumer that declares a shadow twin next to every method it forwards to `inner`.
///
/// Constructors and static initializers are forwarded alone. For every other method the
/// shadow is declared on `inner` right after the original, and the one body stream coming from
/// the producer is fanned out to the original consumer and to the shadow pipeline
/// `ReturnRewriter<MetadataFilter<_>>`. A fresh pipeline is built for every method.
///
/// # Examples
///
/// ```rust,no_run
/// use shadowclass::{
///     classfile::{ClassReader, ClassWriter},
///     transform::ShadowTransformer,
/// };
///
/// let bytes = std::fs::read("Example.class")?;
/// let reader = ClassReader::new(&bytes)?;
/// let mut transformer = ShadowTransformer::new(ClassWriter::from_reader(&reader));
/// reader.accept(&mut transformer)?;
/// println!("{} shadows", transformer.shadowed());
/// let output = transformer.into_inner().to_bytes()?;
/// # Ok::<(), shadowclass::Error>(())
/// ```
pub struct ShadowTransformer<C> {
    inner: C,
    class_name: String,
    shadowed: usize,
    initializers: usize,
}

impl<C: ClassVisitor> ShadowTransformer<C> {
    /// Forward the transformed class to `inner`.
    pub fn new(inner: C) -> Self {
        ShadowTransformer {
            inner,
            class_name: String::new(),
            shadowed: 0,
            initializers: 0,
        }
    }

    /// Number of shadow methods declared for the current class.
    #[must_use]
    pub fn shadowed(&self) -> usize {
        self.shadowed
    }

    /// Number of initializers forwarded without a shadow.
    #[must_use]
    pub fn initializers(&self) -> usize {
        self.initializers
    }

    /// The wrapped consumer.
    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: ClassVisitor> ClassVisitor for ShadowTransformer<C> {
    fn visit(&mut self, header: &ClassHeader) -> Result<()> {
        self.class_name.clone_from(&header.name);
        self.shadowed = 0;
        self.initializers = 0;
        self.inner.visit(header)
    }

    fn visit_annotation(&mut self, descriptor: &str, visible: bool) -> Result<AnnotationSink<'_>> {
        self.inner.visit_annotation(descriptor, visible)
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        self.inner.visit_attribute(attribute)
    }

    fn visit_field(
        &mut self,
        header: &FieldHeader,
    ) -> Result<Option<Box<dyn FieldVisitor + '_>>> {
        self.inner.visit_field(header)
    }

    fn visit_method(&mut self, header: &MethodHeader) -> Result<MethodSink> {
        let original = self.inner.visit_method(header)?;
        if header.is_initializer() {
            log::trace!(
                "{}: keeping initializer {}{}",
                self.class_name,
                header.name,
                header.descriptor
            );
            self.initializers += 1;
            return Ok(original);
        }

        let shadow = shadow_header(header)?;
        let descriptor = MethodDescriptor::parse(&shadow.descriptor)?;
        let pipeline = self.inner.visit_method(&shadow)?.map(|sink| {
            Box::new(ReturnRewriter::new(
                MetadataFilter::new(sink),
                &self.class_name,
                &shadow.name,
                &descriptor,
            )) as Box<dyn MethodVisitor>
        });
        self.shadowed += 1;
        Ok(fanout(original, pipeline))
    }

    fn visit_end(&mut self) -> Result<()> {
        log::debug!(
            "{}: {} shadow methods, {} initializers kept",
            self.class_name,
            self.shadowed,
            self.initializers
        );
        self.inner.visit_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::{ClassReader, Insn, Maxs, opcodes::*},
        test::{class_header, method_events, method_header, multi_exit_class, Recorder},
        Error,
    };

    fn transform_into_recorder(bytes: &[u8]) -> Result<Vec<String>> {
        let recorder = Recorder::default();
        let mut transformer = ShadowTransformer::new(recorder.clone());
        ClassReader::new(bytes)?.accept(&mut transformer)?;
        Ok(recorder.events())
    }

    #[test]
    fn declares_the_shadow_after_the_original() -> Result<()> {
        let events = transform_into_recorder(&multi_exit_class()?)?;
        let methods = events
            .iter()
            .filter(|event| event.starts_with("method "))
            .map(String::as_str)
            .collect::<Vec<_>>();
        assert_eq!(
            methods,
            vec![
                "method <init>()V",
                "method pick(I)V",
                "method pick(I)I",
                "method count(I)I",
                "method count(I)V",
                "method idle()V",
                "method idle()I",
            ]
        );
        Ok(())
    }

    #[test]
    fn counts_shadows_and_initializers() -> Result<()> {
        let bytes = multi_exit_class()?;
        let mut transformer = ShadowTransformer::new(Recorder::default());
        ClassReader::new(&bytes)?.accept(&mut transformer)?;
        assert_eq!(transformer.shadowed(), 3);
        assert_eq!(transformer.initializers(), 1);
        Ok(())
    }

    #[test]
    fn shadow_body_is_truncated_at_the_first_exit() -> Result<()> {
        let events = transform_into_recorder(&multi_exit_class()?)?;

        // Both bodies are interleaved in the shared log: original first, then shadow.
        let pick = method_events(&events, "pick(I)V");
        let ret = format!("insn {}", Insn::Simple(RETURN));
        let iinc = format!("insn {}", Insn::Iinc { var: 1, increment: 1 });
        let zero = format!("insn {}", Insn::Simple(ICONST_0));
        let ireturn = format!("insn {}", Insn::Simple(IRETURN));

        // The original still sees both exits and the increment.
        assert_eq!(pick.iter().filter(|event| **event == ret).count(), 2);
        assert_eq!(pick.iter().filter(|event| **event == iinc).count(), 1);
        // The shadow exit replaces the first return, then nothing from the body follows.
        let first_exit = pick.iter().position(|event| *event == ret);
        let shadow_exit = pick.iter().position(|event| *event == zero);
        assert_eq!(shadow_exit.zip(first_exit).map(|(zero, ret)| zero - ret), Some(1));
        assert_eq!(pick.iter().filter(|event| **event == zero).count(), 1);
        assert_eq!(pick.iter().filter(|event| **event == ireturn).count(), 1);
        assert!(pick.contains(&"maxs Recompute".to_string()));
        Ok(())
    }

    #[test]
    fn colliding_shadow_is_rejected() -> Result<()> {
        use crate::classfile::ClassWriter;

        let mut source = ClassWriter::new();
        source.visit(&class_header("demo/Overloads"))?;
        for descriptor in ["()V", "()I"] {
            if let Some(mut method) = source.visit_method(&method_header("run", descriptor))? {
                method.visit_code()?;
                if descriptor == "()I" {
                    method.visit_insn(&Insn::Simple(ICONST_1))?;
                    method.visit_insn(&Insn::Simple(IRETURN))?;
                } else {
                    method.visit_insn(&Insn::Simple(RETURN))?;
                }
                method.visit_maxs(Maxs::Recompute)?;
                method.visit_end()?;
            }
        }
        source.visit_end()?;
        let bytes = source.to_bytes()?;

        let reader = ClassReader::new(&bytes)?;
        let mut transformer = ShadowTransformer::new(ClassWriter::from_reader(&reader));
        let result = reader.accept(&mut transformer);
        assert!(matches!(
            result,
            Err(Error::AlreadyDeclared { ref name, ref descriptor, .. })
                if name == "run" && descriptor == "()I"
        ));
        Ok(())
    }
}
