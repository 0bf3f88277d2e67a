//! Field and method descriptors.
//!
//! A [`MethodDescriptor`] is the call signature of a method: its ordered parameter types and a
//! single return type. Descriptors parse from and print to their class-file string form
//! (`(ILjava/lang/String;)V`), so `parse(d).to_string() == d` for every well-formed `d`.
//!
//! For shadow generation only the return *category* matters, see [`ValueCategory`].

use std::{fmt, str::FromStr};

use strum::Display;

use crate::Result;

/// The value category of a return type.
///
/// The int-like category covers the types the JVM represents as a single `int` on the operand
/// stack and returns with `ireturn`: `I`, `Z`, `B`, `C` and `S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ValueCategory {
    /// No value (`V`)
    #[strum(serialize = "void")]
    Void,
    /// A single word-sized integer-like value
    #[strum(serialize = "int-like")]
    IntLike,
    /// Anything else: `J`, `F`, `D` and references
    #[strum(serialize = "other")]
    Other,
}

/// The type of a field, parameter or local.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
    /// `L<internal name>;`
    Object(String),
    /// `[<component>`
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a complete field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `descriptor` is not exactly one field type.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut cursor = Cursor::new(descriptor);
        let parsed = cursor.field_type()?;
        cursor.finish()?;
        Ok(parsed)
    }

    /// Number of local variable slots (and operand stack words) the type occupies.
    #[must_use]
    pub fn size(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    /// Whether the type is passed around as an `int` by the JVM.
    #[must_use]
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            FieldType::Int
                | FieldType::Boolean
                | FieldType::Byte
                | FieldType::Char
                | FieldType::Short
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => f.write_str("B"),
            FieldType::Char => f.write_str("C"),
            FieldType::Double => f.write_str("D"),
            FieldType::Float => f.write_str("F"),
            FieldType::Int => f.write_str("I"),
            FieldType::Long => f.write_str("J"),
            FieldType::Short => f.write_str("S"),
            FieldType::Boolean => f.write_str("Z"),
            FieldType::Object(name) => write!(f, "L{name};"),
            FieldType::Array(component) => write!(f, "[{component}"),
        }
    }
}

impl FromStr for FieldType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        FieldType::parse(s)
    }
}

/// The return type of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnType {
    /// `V`
    Void,
    /// Any field type
    Value(FieldType),
}

impl ReturnType {
    /// Category of this return type.
    #[must_use]
    pub fn category(&self) -> ValueCategory {
        match self {
            ReturnType::Void => ValueCategory::Void,
            ReturnType::Value(value) if value.is_int_like() => ValueCategory::IntLike,
            ReturnType::Value(_) => ValueCategory::Other,
        }
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnType::Void => f.write_str("V"),
            ReturnType::Value(value) => value.fmt(f),
        }
    }
}

/// The call signature of a method.
///
/// Two descriptors are equal iff their parameters and return types are equal element-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub parameters: Vec<FieldType>,
    /// The return type
    pub return_type: ReturnType,
}

impl MethodDescriptor {
    /// Parse a method descriptor string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `descriptor` is not a well-formed method descriptor.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shadowclass::classfile::{MethodDescriptor, ValueCategory};
    ///
    /// let desc = MethodDescriptor::parse("(I[Ljava/lang/String;J)Z")?;
    /// assert_eq!(desc.parameters.len(), 3);
    /// assert_eq!(desc.return_category(), ValueCategory::IntLike);
    /// assert_eq!(desc.to_string(), "(I[Ljava/lang/String;J)Z");
    /// # Ok::<(), shadowclass::Error>(())
    /// ```
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut cursor = Cursor::new(descriptor);
        cursor.expect(b'(')?;

        let mut parameters = Vec::new();
        while cursor.peek() != Some(b')') {
            parameters.push(cursor.field_type()?);
        }
        cursor.expect(b')')?;

        let return_type = if cursor.peek() == Some(b'V') {
            cursor.bump();
            ReturnType::Void
        } else {
            ReturnType::Value(cursor.field_type()?)
        };
        cursor.finish()?;

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }

    /// Category of the return type.
    #[must_use]
    pub fn return_category(&self) -> ValueCategory {
        self.return_type.category()
    }

    /// Local variable slots taken by the parameters, excluding `this`.
    #[must_use]
    pub fn parameter_slots(&self) -> u16 {
        self.parameters.iter().map(FieldType::size).sum()
    }

    /// The same parameters with a different return type.
    #[must_use]
    pub fn with_return(&self, return_type: ReturnType) -> Self {
        MethodDescriptor {
            parameters: self.parameters.clone(),
            return_type,
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for parameter in &self.parameters {
            parameter.fmt(f)?;
        }
        f.write_str(")")?;
        self.return_type.fmt(f)
    }
}

impl FromStr for MethodDescriptor {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        MethodDescriptor::parse(s)
    }
}

struct Cursor<'a> {
    text: &'a str,
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Cursor { text, position: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.position).copied()
    }

    fn bump(&mut self) {
        self.position += 1;
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() == Some(byte) {
            self.bump();
            Ok(())
        } else {
            Err(malformed_error!(
                "Invalid descriptor '{}' - expected '{}' at {}",
                self.text,
                char::from(byte),
                self.position
            ))
        }
    }

    fn finish(&self) -> Result<()> {
        if self.position == self.text.len() {
            Ok(())
        } else {
            Err(malformed_error!(
                "Invalid descriptor '{}' - trailing data at {}",
                self.text,
                self.position
            ))
        }
    }

    fn field_type(&mut self) -> Result<FieldType> {
        let Some(tag) = self.peek() else {
            return Err(malformed_error!(
                "Invalid descriptor '{}' - unexpected end",
                self.text
            ));
        };
        self.bump();

        Ok(match tag {
            b'B' => FieldType::Byte,
            b'C' => FieldType::Char,
            b'D' => FieldType::Double,
            b'F' => FieldType::Float,
            b'I' => FieldType::Int,
            b'J' => FieldType::Long,
            b'S' => FieldType::Short,
            b'Z' => FieldType::Boolean,
            b'L' => {
                let start = self.position;
                let Some(length) = self.text[start..].find(';') else {
                    return Err(malformed_error!(
                        "Invalid descriptor '{}' - unterminated class name",
                        self.text
                    ));
                };
                if length == 0 {
                    return Err(malformed_error!(
                        "Invalid descriptor '{}' - empty class name",
                        self.text
                    ));
                }
                self.position = start + length + 1;
                FieldType::Object(self.text[start..start + length].to_string())
            }
            b'[' => FieldType::Array(Box::new(self.field_type()?)),
            other => {
                return Err(malformed_error!(
                    "Invalid descriptor '{}' - unknown type tag 0x{:02X}",
                    self.text,
                    other
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() -> Result<()> {
        for text in [
            "()V",
            "(I)I",
            "(JD)Ljava/lang/Object;",
            "([[I[Ljava/util/List;Z)[B",
            "(Ljava/lang/String;CSB)Z",
        ] {
            assert_eq!(MethodDescriptor::parse(text)?.to_string(), text);
        }
        Ok(())
    }

    #[test]
    fn categories() -> Result<()> {
        let cases = [
            ("()V", ValueCategory::Void),
            ("()I", ValueCategory::IntLike),
            ("()Z", ValueCategory::IntLike),
            ("()B", ValueCategory::IntLike),
            ("()C", ValueCategory::IntLike),
            ("()S", ValueCategory::IntLike),
            ("()J", ValueCategory::Other),
            ("()F", ValueCategory::Other),
            ("()D", ValueCategory::Other),
            ("()Ljava/lang/String;", ValueCategory::Other),
            ("()[I", ValueCategory::Other),
        ];
        for (text, category) in cases {
            assert_eq!(MethodDescriptor::parse(text)?.return_category(), category, "{text}");
        }
        Ok(())
    }

    #[test]
    fn parameter_slots() -> Result<()> {
        let desc = MethodDescriptor::parse("(IJLjava/lang/Object;D[J)V")?;
        assert_eq!(desc.parameter_slots(), 1 + 2 + 1 + 2 + 1);
        Ok(())
    }

    #[test]
    fn rejects_malformed() {
        for text in [
            "", "V", "(", "()", "(V)V", "(I)VV", "(L;)V", "(Ljava/lang/String)V", "(Q)V", "()[",
        ] {
            assert!(MethodDescriptor::parse(text).is_err(), "{text}");
        }
        assert!(FieldType::parse("II").is_err());
        assert!(FieldType::parse("V").is_err());
    }

    #[test]
    fn with_return_keeps_parameters() -> Result<()> {
        let desc = MethodDescriptor::parse("(ILjava/lang/String;)V")?;
        let flipped = desc.with_return(ReturnType::Value(FieldType::Int));
        assert_eq!(flipped.parameters, desc.parameters);
        assert_eq!(flipped.to_string(), "(ILjava/lang/String;)I");
        Ok(())
    }
}
