//! Stack-map frames and the layout event.

use crate::classfile::instruction::Label;

/// One entry of a stack-map frame (`verification_type_info`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VerificationType {
    /// `Top_variable_info`
    Top,
    /// `Integer_variable_info`
    Integer,
    /// `Float_variable_info`
    Float,
    /// `Double_variable_info`, a single entry covering two slots
    Double,
    /// `Long_variable_info`, a single entry covering two slots
    Long,
    /// `Null_variable_info`
    Null,
    /// `UninitializedThis_variable_info`
    UninitializedThis,
    /// `Object_variable_info`, internal name or array descriptor
    Object(String),
    /// `Uninitialized_variable_info`, the label of the `new` that created the value
    Uninitialized(Label),
}

/// A stack-map frame as stored in `StackMapTable`, delta-encoded against the previous frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Same locals, empty stack
    Same,
    /// Same locals, one stack item
    SameLocals1StackItem(VerificationType),
    /// The last 1 to 3 locals are absent, empty stack
    Chop(u8),
    /// 1 to 3 additional locals, empty stack
    Append(Vec<VerificationType>),
    /// Complete frame
    Full {
        /// Locals
        locals: Vec<VerificationType>,
        /// Operand stack, bottom first
        stack: Vec<VerificationType>,
    },
}

impl Frame {
    /// Every verification type the frame lists, locals before stack.
    #[must_use]
    pub fn entries(&self) -> Vec<&VerificationType> {
        match self {
            Frame::Same | Frame::Chop(_) => Vec::new(),
            Frame::SameLocals1StackItem(entry) => vec![entry],
            Frame::Append(locals) => locals.iter().collect(),
            Frame::Full { locals, stack } => locals.iter().chain(stack).collect(),
        }
    }
}

/// The finalization/layout event of a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maxs {
    /// Measured values, written as given together with the forwarded frames
    Explicit {
        /// `max_stack`
        stack: u16,
        /// `max_locals`
        locals: u16,
    },
    /// Ask the writer to derive the values (and the frames) from the final instructions
    Recompute,
}
