//! Serialization of annotations and annotation element values.

use std::cell::RefCell;

use crate::{
    classfile::{
        constants::{Constant, ConstantPool},
        member::AnnotationValue,
        visitor::{AnnotationSink, AnnotationVisitor},
    },
    file::io::{push_be, write_be_at},
    Error, Result,
};

/// The annotations of one visibility on one element.
#[derive(Debug, Default, Clone)]
pub(crate) struct AnnotationSet {
    count: u16,
    bytes: Vec<u8>,
}

impl AnnotationSet {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append a new annotation of type `descriptor` and return the writer for its body.
    pub fn open<'p>(
        &'p mut self,
        pool: &'p RefCell<ConstantPool>,
        descriptor: &str,
    ) -> Result<AnnotationWriter<'p>> {
        self.count = self
            .count
            .checked_add(1)
            .ok_or_else(|| Error::Error("More than 65535 annotations".to_string()))?;
        push_be(&mut self.bytes, pool.borrow_mut().add_utf8(descriptor)?);
        Ok(AnnotationWriter::new(pool, &mut self.bytes, true))
    }

    /// `num_annotations` followed by the annotations.
    pub fn write(&self, out: &mut Vec<u8>) {
        push_be(out, self.count);
        out.extend_from_slice(&self.bytes);
    }
}

/// Writes the elements of one annotation, or the values of one array, into a shared buffer.
///
/// The element count precedes the elements, so a placeholder is written when the writer is
/// created and patched after every element.
pub(crate) struct AnnotationWriter<'p> {
    pool: &'p RefCell<ConstantPool>,
    out: &'p mut Vec<u8>,
    /// Elements of an annotation carry a name, array values do not
    named: bool,
    count_at: Option<usize>,
    count: u16,
}

impl<'p> AnnotationWriter<'p> {
    fn new(pool: &'p RefCell<ConstantPool>, out: &'p mut Vec<u8>, named: bool) -> Self {
        let count_at = out.len();
        push_be(out, 0_u16);
        AnnotationWriter {
            pool,
            out,
            named,
            count_at: Some(count_at),
            count: 0,
        }
    }

    /// A writer for a bare `element_value`, as used by `AnnotationDefault`.
    pub fn single(pool: &'p RefCell<ConstantPool>, out: &'p mut Vec<u8>) -> Self {
        AnnotationWriter {
            pool,
            out,
            named: false,
            count_at: None,
            count: 0,
        }
    }

    fn element(&mut self, name: Option<&str>) -> Result<()> {
        if self.named {
            let index = self.pool.borrow_mut().add_utf8(name.unwrap_or_default())?;
            push_be(self.out, index);
        }

        if let Some(mut at) = self.count_at {
            self.count = self
                .count
                .checked_add(1)
                .ok_or_else(|| Error::Error("More than 65535 annotation values".to_string()))?;
            write_be_at(self.out.as_mut_slice(), &mut at, self.count)?;
        }
        Ok(())
    }

    fn constant(&mut self, tag: u8, constant: Constant) -> Result<()> {
        let index = self.pool.borrow_mut().intern(constant)?;
        push_be(self.out, tag);
        push_be(self.out, index);
        Ok(())
    }

    fn utf8(&mut self, tag: u8, text: &str) -> Result<()> {
        let index = self.pool.borrow_mut().add_utf8(text)?;
        push_be(self.out, tag);
        push_be(self.out, index);
        Ok(())
    }
}

impl AnnotationVisitor for AnnotationWriter<'_> {
    fn visit(&mut self, name: Option<&str>, value: &AnnotationValue) -> Result<()> {
        self.element(name)?;
        match value {
            AnnotationValue::Byte(value) => self.constant(b'B', Constant::Integer(i32::from(*value))),
            AnnotationValue::Char(value) => self.constant(b'C', Constant::Integer(i32::from(*value))),
            AnnotationValue::Short(value) => {
                self.constant(b'S', Constant::Integer(i32::from(*value)))
            }
            AnnotationValue::Int(value) => self.constant(b'I', Constant::Integer(*value)),
            AnnotationValue::Boolean(value) => {
                self.constant(b'Z', Constant::Integer(i32::from(*value)))
            }
            AnnotationValue::Long(value) => self.constant(b'J', Constant::Long(*value)),
            AnnotationValue::Float(value) => self.constant(b'F', Constant::Float(value.to_bits())),
            AnnotationValue::Double(value) => {
                self.constant(b'D', Constant::Double(value.to_bits()))
            }
            AnnotationValue::String(value) => self.utf8(b's', value),
            AnnotationValue::Utf16(units) => {
                let index = self.pool.borrow_mut().add_utf16(units)?;
                push_be(self.out, b's');
                push_be(self.out, index);
                Ok(())
            }
            AnnotationValue::Class(value) => self.utf8(b'c', value),
        }
    }

    fn visit_enum(&mut self, name: Option<&str>, descriptor: &str, value: &str) -> Result<()> {
        self.element(name)?;
        let mut pool = self.pool.borrow_mut();
        let descriptor = pool.add_utf8(descriptor)?;
        let value = pool.add_utf8(value)?;
        push_be(self.out, b'e');
        push_be(self.out, descriptor);
        push_be(self.out, value);
        Ok(())
    }

    fn visit_annotation(
        &mut self,
        name: Option<&str>,
        descriptor: &str,
    ) -> Result<AnnotationSink<'_>> {
        self.element(name)?;
        let index = self.pool.borrow_mut().add_utf8(descriptor)?;
        push_be(self.out, b'@');
        push_be(self.out, index);
        Ok(Some(Box::new(AnnotationWriter::new(
            self.pool,
            &mut *self.out,
            true,
        ))))
    }

    fn visit_array(&mut self, name: Option<&str>) -> Result<AnnotationSink<'_>> {
        self.element(name)?;
        push_be(self.out, b'[');
        Ok(Some(Box::new(AnnotationWriter::new(
            self.pool,
            &mut *self.out,
            false,
        ))))
    }

    fn visit_end(&mut self) -> Result<()> {
        Ok(())
    }
}
