//! Shadow call signatures.

use crate::{
    classfile::{FieldType, MethodDescriptor, MethodHeader, ReturnType},
    Result,
};

/// The shadow signature of `original`: same parameters, return category flipped.
///
/// A method returning nothing gets an `int` return; every other method gets a `void` return.
/// The flip never looks at the other methods of the class, so the result may collide with an
/// existing overload; the class writer rejects such a declaration.
///
/// # Examples
///
/// ```rust
/// use shadowclass::classfile::MethodDescriptor;
/// use shadowclass::transform::shadow_descriptor;
///
/// let original = MethodDescriptor::parse("(Ljava/lang/String;)V")?;
/// assert_eq!(shadow_descriptor(&original).to_string(), "(Ljava/lang/String;)I");
/// # Ok::<(), shadowclass::Error>(())
/// ```
#[must_use]
pub fn shadow_descriptor(original: &MethodDescriptor) -> MethodDescriptor {
    let return_type = match original.return_type {
        ReturnType::Void => ReturnType::Value(FieldType::Int),
        ReturnType::Value(_) => ReturnType::Void,
    };
    original.with_return(return_type)
}

/// The declaration of the shadow twin of `original`.
///
/// Name, access flags and declared exceptions are kept. The generic signature is dropped
/// since it describes the original return type.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the original descriptor does not parse.
pub fn shadow_header(original: &MethodHeader) -> Result<MethodHeader> {
    let descriptor = shadow_descriptor(&MethodDescriptor::parse(&original.descriptor)?);
    Ok(MethodHeader {
        access: original.access,
        name: original.name.clone(),
        descriptor: descriptor.to_string(),
        signature: None,
        exceptions: original.exceptions.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{AccessFlags, ValueCategory};

    fn flip(descriptor: &str) -> Result<String> {
        Ok(shadow_descriptor(&MethodDescriptor::parse(descriptor)?).to_string())
    }

    #[test]
    fn flips_return_category() -> Result<()> {
        assert_eq!(flip("()V")?, "()I");
        assert_eq!(flip("(IJ)I")?, "(IJ)V");
        assert_eq!(flip("(Z)Z")?, "(Z)V");
        assert_eq!(flip("([Ljava/lang/String;)Ljava/lang/Object;")?, "([Ljava/lang/String;)V");
        assert_eq!(flip("(D)D")?, "(D)V");
        Ok(())
    }

    #[test]
    fn never_returns_the_input() -> Result<()> {
        for descriptor in ["()V", "()I", "()B", "()J", "(Ljava/util/List;)[I"] {
            let original = MethodDescriptor::parse(descriptor)?;
            let shadow = shadow_descriptor(&original);
            assert_ne!(shadow, original);
            assert_eq!(shadow.parameters, original.parameters);
        }
        Ok(())
    }

    #[test]
    fn involution_on_two_categories() -> Result<()> {
        for descriptor in ["(I)V", "(Ljava/lang/String;J)I", "()S", "()C"] {
            let original = MethodDescriptor::parse(descriptor)?;
            let twice = shadow_descriptor(&shadow_descriptor(&original));
            assert_eq!(twice.return_category(), original.return_category());
            assert_eq!(twice.parameters, original.parameters);
        }
        assert_eq!(flip("()S")?, "()V");
        assert_eq!(
            shadow_descriptor(&MethodDescriptor::parse("()V")?).return_category(),
            ValueCategory::IntLike
        );
        Ok(())
    }

    #[test]
    fn header_keeps_exceptions_and_drops_signature() -> Result<()> {
        let original = MethodHeader {
            access: AccessFlags::PUBLIC | AccessFlags::SYNCHRONIZED,
            name: "load".to_string(),
            descriptor: "(Ljava/lang/String;)Ljava/util/List;".to_string(),
            signature: Some("(Ljava/lang/String;)Ljava/util/List<Ljava/lang/String;>;".to_string()),
            exceptions: vec!["java/io/IOException".to_string()],
        };

        let shadow = shadow_header(&original)?;
        assert_eq!(shadow.name, "load");
        assert_eq!(shadow.descriptor, "(Ljava/lang/String;)V");
        assert_eq!(shadow.access, original.access);
        assert_eq!(shadow.exceptions, original.exceptions);
        assert!(shadow.signature.is_none());
        Ok(())
    }
}
