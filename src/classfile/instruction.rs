//! Instruction events.
//!
//! One [`Insn`] describes one bytecode instruction with symbolic operands: constant pool
//! references are resolved to names and descriptors, branch targets are [`Label`]s. The reader
//! normalizes the short forms (`iload_0`, `ldc_w`, `wide iinc`, ...) into their generic
//! variants and the writer picks the shortest encoding again, so a read/write cycle keeps the
//! bytes of the original code.

use std::fmt;

use crate::classfile::opcodes::{self, ARETURN, DRETURN, FRETURN, IRETURN, LRETURN, RETURN};

/// A position in one method body, referenced by branches, exception ranges, debug tables and
/// stack-map frames.
///
/// Labels are plain identifiers; they are only meaningful within the body they were created
/// for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Method handle kinds (`reference_kind` of `CONSTANT_MethodHandle`).
pub mod handle_kind {
    #![allow(missing_docs)]
    pub const GET_FIELD: u8 = 1;
    pub const GET_STATIC: u8 = 2;
    pub const PUT_FIELD: u8 = 3;
    pub const PUT_STATIC: u8 = 4;
    pub const INVOKE_VIRTUAL: u8 = 5;
    pub const INVOKE_STATIC: u8 = 6;
    pub const INVOKE_SPECIAL: u8 = 7;
    pub const NEW_INVOKE_SPECIAL: u8 = 8;
    pub const INVOKE_INTERFACE: u8 = 9;
}

/// A `CONSTANT_MethodHandle`, resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    /// One of the [`handle_kind`] values
    pub kind: u8,
    /// Internal name of the owner class
    pub owner: String,
    /// Member name
    pub name: String,
    /// Member descriptor
    pub descriptor: String,
    /// Whether the owner is an interface
    pub interface: bool,
}

/// A dynamically computed constant (`CONSTANT_Dynamic`).
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDynamic {
    /// Name of the constant
    pub name: String,
    /// Field descriptor of the constant
    pub descriptor: String,
    /// Bootstrap method
    pub bootstrap: Handle,
    /// Static bootstrap arguments
    pub arguments: Vec<LdcConstant>,
}

/// A loadable constant, as pushed by `ldc` or passed as a bootstrap argument.
#[derive(Debug, Clone, PartialEq)]
pub enum LdcConstant {
    /// `CONSTANT_Integer`
    Int(i32),
    /// `CONSTANT_Float`
    Float(f32),
    /// `CONSTANT_Long`
    Long(i64),
    /// `CONSTANT_Double`
    Double(f64),
    /// `CONSTANT_String`
    String(String),
    /// `CONSTANT_String` whose text is not valid Unicode (it holds an unpaired surrogate), as
    /// UTF-16 code units
    Utf16(Vec<u16>),
    /// `CONSTANT_Class`, internal name or array descriptor
    Class(String),
    /// `CONSTANT_MethodType`, a method descriptor
    MethodType(String),
    /// `CONSTANT_MethodHandle`
    MethodHandle(Handle),
    /// `CONSTANT_Dynamic`
    Dynamic(Box<ConstantDynamic>),
}

impl LdcConstant {
    /// Whether the constant takes two stack words (`ldc2_w`).
    #[must_use]
    pub fn is_wide(&self) -> bool {
        match self {
            LdcConstant::Long(_) | LdcConstant::Double(_) => true,
            LdcConstant::Dynamic(dynamic) => {
                matches!(dynamic.descriptor.as_str(), "J" | "D")
            }
            _ => false,
        }
    }
}

/// One bytecode instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    /// An instruction without operands (`nop`, `iadd`, `ireturn`, `athrow`, ...)
    Simple(u8),
    /// `bipush`, `sipush` or `newarray`
    Int {
        /// The opcode
        opcode: u8,
        /// The immediate (for `newarray` one of the `T_*` codes)
        operand: i32,
    },
    /// A local variable load or store, or `ret`
    Var {
        /// The opcode, always the generic form (`iload`, never `iload_0`)
        opcode: u8,
        /// Local variable index
        var: u16,
    },
    /// `new`, `anewarray`, `checkcast` or `instanceof`
    Type {
        /// The opcode
        opcode: u8,
        /// Internal name or array descriptor
        class: String,
    },
    /// `getstatic`, `putstatic`, `getfield` or `putfield`
    Field {
        /// The opcode
        opcode: u8,
        /// Internal name of the owner
        owner: String,
        /// Field name
        name: String,
        /// Field descriptor
        descriptor: String,
    },
    /// `invokevirtual`, `invokespecial`, `invokestatic` or `invokeinterface`
    Method {
        /// The opcode
        opcode: u8,
        /// Internal name of the owner
        owner: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
        /// Whether the owner is an interface (`InterfaceMethodref`)
        interface: bool,
    },
    /// `invokedynamic`
    InvokeDynamic {
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
        /// Bootstrap method
        bootstrap: Handle,
        /// Static bootstrap arguments
        arguments: Vec<LdcConstant>,
    },
    /// A conditional or unconditional branch, or a subroutine call
    Jump {
        /// The opcode (`goto_w` and `jsr_w` are kept as such)
        opcode: u8,
        /// Branch target
        target: Label,
    },
    /// `ldc`, `ldc_w` or `ldc2_w`
    Ldc(LdcConstant),
    /// `iinc`
    Iinc {
        /// Local variable index
        var: u16,
        /// Signed increment
        increment: i16,
    },
    /// `tableswitch`
    TableSwitch {
        /// Lowest key
        low: i32,
        /// Highest key
        high: i32,
        /// Default target
        default: Label,
        /// One target per key in `low..=high`
        targets: Vec<Label>,
    },
    /// `lookupswitch`
    LookupSwitch {
        /// Default target
        default: Label,
        /// Keys, in ascending order
        keys: Vec<i32>,
        /// One target per key
        targets: Vec<Label>,
    },
    /// `multianewarray`
    MultiANewArray {
        /// Array descriptor
        descriptor: String,
        /// Number of dimensions to create
        dimensions: u8,
    },
}

impl Insn {
    /// The generic opcode of this instruction.
    #[must_use]
    pub fn opcode(&self) -> u8 {
        match self {
            Insn::Simple(opcode)
            | Insn::Int { opcode, .. }
            | Insn::Var { opcode, .. }
            | Insn::Type { opcode, .. }
            | Insn::Field { opcode, .. }
            | Insn::Method { opcode, .. }
            | Insn::Jump { opcode, .. } => *opcode,
            Insn::InvokeDynamic { .. } => opcodes::INVOKEDYNAMIC,
            Insn::Ldc(constant) => {
                if constant.is_wide() {
                    opcodes::LDC2_W
                } else {
                    opcodes::LDC
                }
            }
            Insn::Iinc { .. } => opcodes::IINC,
            Insn::TableSwitch { .. } => opcodes::TABLESWITCH,
            Insn::LookupSwitch { .. } => opcodes::LOOKUPSWITCH,
            Insn::MultiANewArray { .. } => opcodes::MULTIANEWARRAY,
        }
    }

    /// Whether this is one of the method exit instructions `ireturn` through `return`.
    ///
    /// `athrow` leaves the method too, but abruptly; it is not part of the family.
    #[must_use]
    pub fn is_return(&self) -> bool {
        matches!(
            self,
            Insn::Simple(IRETURN | LRETURN | FRETURN | DRETURN | ARETURN | RETURN)
        )
    }

    /// Branch targets referenced by this instruction.
    #[must_use]
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Insn::Jump { target, .. } => vec![*target],
            Insn::TableSwitch {
                default, targets, ..
            }
            | Insn::LookupSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = opcodes::mnemonic(self.opcode()).unwrap_or("???");
        match self {
            Insn::Simple(_) => f.write_str(mnemonic),
            Insn::Int { operand, .. } => write!(f, "{mnemonic} {operand}"),
            Insn::Var { var, .. } => write!(f, "{mnemonic} {var}"),
            Insn::Type { class, .. } => write!(f, "{mnemonic} {class}"),
            Insn::Field {
                owner,
                name,
                descriptor,
                ..
            }
            | Insn::Method {
                owner,
                name,
                descriptor,
                ..
            } => write!(f, "{mnemonic} {owner}.{name}{descriptor}"),
            Insn::InvokeDynamic {
                name, descriptor, ..
            } => write!(f, "{mnemonic} {name}{descriptor}"),
            Insn::Jump { target, .. } => write!(f, "{mnemonic} {target}"),
            Insn::Ldc(constant) => write!(f, "{mnemonic} {constant:?}"),
            Insn::Iinc { var, increment } => write!(f, "{mnemonic} {var} {increment}"),
            Insn::TableSwitch { low, high, .. } => write!(f, "{mnemonic} {low}..={high}"),
            Insn::LookupSwitch { keys, .. } => write!(f, "{mnemonic} [{} keys]", keys.len()),
            Insn::MultiANewArray {
                descriptor,
                dimensions,
            } => write!(f, "{mnemonic} {descriptor} {dimensions}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::opcodes::*;

    #[test]
    fn return_family() {
        for op in [IRETURN, LRETURN, FRETURN, DRETURN, ARETURN, RETURN] {
            assert!(Insn::Simple(op).is_return());
        }
        assert!(!Insn::Simple(ATHROW).is_return());
        assert!(!Insn::Simple(NOP).is_return());
        assert!(!Insn::Var {
            opcode: RET,
            var: 1
        }
        .is_return());
    }

    #[test]
    fn ldc_opcode_follows_width() {
        assert_eq!(Insn::Ldc(LdcConstant::Int(70000)).opcode(), LDC);
        assert_eq!(Insn::Ldc(LdcConstant::Long(1)).opcode(), LDC2_W);
        assert_eq!(Insn::Ldc(LdcConstant::Double(1.5)).opcode(), LDC2_W);
    }

    #[test]
    fn switch_targets_start_with_default() {
        let insn = Insn::LookupSwitch {
            default: Label(9),
            keys: vec![1, 5],
            targets: vec![Label(2), Label(3)],
        };
        assert_eq!(insn.targets(), vec![Label(9), Label(2), Label(3)]);
        assert_eq!(insn.to_string(), "lookupswitch [2 keys]");
    }
}
