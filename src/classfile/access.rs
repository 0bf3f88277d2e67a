//! Access and property flags for classes, fields and methods.
//!
//! The class-file format reuses bit positions across member kinds (`0x0020` is `ACC_SUPER` on a
//! class and `ACC_SYNCHRONIZED` on a method, `0x0040` is `ACC_VOLATILE` or `ACC_BRIDGE`, ...).
//! A single [`AccessFlags`] set is used everywhere, with aliases for the overloaded bits.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// `access_flags` of a class, field or method.
    pub struct AccessFlags: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final
        const FINAL = 0x0010;
        /// Class: treat superclass methods specially on `invokespecial`
        const SUPER = 0x0020;
        /// Method: invocation is wrapped by a monitor
        const SYNCHRONIZED = 0x0020;
        /// Field: declared volatile
        const VOLATILE = 0x0040;
        /// Method: compiler-generated bridge method
        const BRIDGE = 0x0040;
        /// Field: declared transient
        const TRANSIENT = 0x0080;
        /// Method: declared with variable arity
        const VARARGS = 0x0080;
        /// Method: implemented in a language other than Java
        const NATIVE = 0x0100;
        /// Class: is an interface
        const INTERFACE = 0x0200;
        /// Declared abstract
        const ABSTRACT = 0x0400;
        /// Method: floating-point mode is FP-strict
        const STRICT = 0x0800;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
        /// Class: declared as an annotation interface
        const ANNOTATION = 0x2000;
        /// Declared as an enum class or enum constant
        const ENUM = 0x4000;
        /// Class: is a module, not a class or interface
        const MODULE = 0x8000;
    }
}

impl AccessFlags {
    /// Build from the raw `u2` in a class file, keeping unknown bits.
    #[must_use]
    pub fn from_raw(bits: u16) -> Self {
        Self::from_bits_retain(bits)
    }

    /// Whether the member is static.
    #[must_use]
    pub fn is_static(self) -> bool {
        self.contains(AccessFlags::STATIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_bits_round_trip_unknown_flags() {
        let flags = AccessFlags::from_raw(0x0009);
        assert!(flags.contains(AccessFlags::PUBLIC));
        assert!(flags.is_static());
        assert_eq!(flags.bits(), 0x0009);

        // Reserved bit positions are preserved verbatim.
        let odd = AccessFlags::from_raw(0x0001 | 0x0400 | 0x1000 | 0x8000);
        assert_eq!(odd.bits(), 0x9401);
    }

    #[test]
    fn aliases_share_bits() {
        assert_eq!(AccessFlags::SUPER.bits(), AccessFlags::SYNCHRONIZED.bits());
        assert_eq!(AccessFlags::VOLATILE.bits(), AccessFlags::BRIDGE.bits());
        assert_eq!(AccessFlags::TRANSIENT.bits(), AccessFlags::VARARGS.bits());
    }
}
