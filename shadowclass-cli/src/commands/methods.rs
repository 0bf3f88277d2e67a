use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use shadowclass::{
    classfile::{
        AnnotationSink, Attribute, ClassHeader, ClassReader, ClassVisitor, FieldHeader,
        FieldVisitor, MethodDescriptor, MethodHeader, MethodSink,
    },
    transform::shadow_descriptor,
};

use crate::{
    app::GlobalOptions,
    commands::common::{format_access, load_class},
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
pub struct ClassMethods {
    pub class: String,
    pub methods: Vec<MethodInfo>,
}

#[derive(Debug, Serialize)]
pub struct MethodInfo {
    pub access: String,
    pub name: String,
    pub descriptor: String,
    /// Whether the class also declares this method's shadow (or this is one).
    pub paired: bool,
}

/// Collects the method declarations of a class and declines everything else.
#[derive(Default)]
struct Declarations {
    class: String,
    methods: Vec<MethodHeader>,
}

impl ClassVisitor for Declarations {
    fn visit(&mut self, header: &ClassHeader) -> shadowclass::Result<()> {
        self.class.clone_from(&header.name);
        Ok(())
    }

    fn visit_annotation(
        &mut self,
        _descriptor: &str,
        _visible: bool,
    ) -> shadowclass::Result<AnnotationSink<'_>> {
        Ok(None)
    }

    fn visit_attribute(&mut self, _attribute: &Attribute) -> shadowclass::Result<()> {
        Ok(())
    }

    fn visit_field(
        &mut self,
        _header: &FieldHeader,
    ) -> shadowclass::Result<Option<Box<dyn FieldVisitor + '_>>> {
        Ok(None)
    }

    fn visit_method(&mut self, header: &MethodHeader) -> shadowclass::Result<MethodSink> {
        self.methods.push(header.clone());
        Ok(None)
    }

    fn visit_end(&mut self) -> shadowclass::Result<()> {
        Ok(())
    }
}

fn is_paired(header: &MethodHeader, all: &[MethodHeader]) -> bool {
    let Ok(descriptor) = MethodDescriptor::parse(&header.descriptor) else {
        return false;
    };
    let shadow = shadow_descriptor(&descriptor).to_string();
    all.iter()
        .any(|other| other.name == header.name && other.descriptor == shadow)
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let file = load_class(path)?;
    let reader = ClassReader::new(file.data())
        .with_context(|| format!("not a class file: {}", path.display()))?;
    let mut declarations = Declarations::default();
    reader.accept(&mut declarations)?;

    let methods = declarations
        .methods
        .iter()
        .map(|header| MethodInfo {
            access: format_access(header.access.bits()),
            name: header.name.clone(),
            descriptor: header.descriptor.clone(),
            paired: !header.is_initializer() && is_paired(header, &declarations.methods),
        })
        .collect();
    let listing = ClassMethods {
        class: declarations.class,
        methods,
    };

    print_output(&listing, opts, |listing| {
        println!("Class: {}", listing.class);
        println!();
        let mut table = TabWriter::new(&[
            ("ACCESS", Align::Left),
            ("NAME", Align::Left),
            ("DESCRIPTOR", Align::Left),
            ("PAIRED", Align::Left),
        ]);
        for method in &listing.methods {
            table.row(vec![
                method.access.clone(),
                method.name.clone(),
                method.descriptor.clone(),
                if method.paired { "yes" } else { "" }.to_string(),
            ]);
        }
        table.print();
    })
}
