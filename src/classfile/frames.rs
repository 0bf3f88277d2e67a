//! Max stack, max locals and stack-map frames derived from an instruction sequence.
//!
//! The analysis is a classic forward data-flow pass over instructions: every reachable
//! instruction gets an input frame (locals and operand stack types), frames are merged where
//! control flow joins, and the worklist runs until nothing changes.
//!
//! Two different reference types merge to their closest common superclass, looked up in the
//! [`Resolver`] of the class being written; arrays of references merge element-wise. A merge
//! that cannot be resolved fails the method, since a guessed type would not verify. Without a
//! resolver (class files older than version 50, which carry no frames) references merge to
//! `java/lang/Object`, which keeps the stack heights exact.
//!
//! The encoding half of the module turns frames into `StackMapTable` entries, picking the
//! shortest delta form relative to the previous frame.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::{
    classfile::{
        descriptor::{FieldType, MethodDescriptor, ReturnType},
        hierarchy::Resolver,
        instruction::{Insn, Label, LdcConstant},
        opcodes::*,
    },
    file::io::push_be,
    Error, Result,
};

/// A verification type during analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AbstractType {
    Top,
    Int,
    Float,
    Long,
    Double,
    Null,
    UninitializedThis,
    /// Created by the `new` at this code offset
    Uninitialized(usize),
    /// Internal name or array descriptor
    Object(String),
    ReturnAddress,
}

impl AbstractType {
    fn size(&self) -> usize {
        match self {
            AbstractType::Long | AbstractType::Double => 2,
            _ => 1,
        }
    }

    fn from_field(field: &FieldType) -> Self {
        match field {
            FieldType::Boolean
            | FieldType::Byte
            | FieldType::Char
            | FieldType::Short
            | FieldType::Int => AbstractType::Int,
            FieldType::Float => AbstractType::Float,
            FieldType::Long => AbstractType::Long,
            FieldType::Double => AbstractType::Double,
            FieldType::Object(name) => AbstractType::Object(name.clone()),
            FieldType::Array(_) => AbstractType::Object(field.to_string()),
        }
    }

    fn is_reference(&self) -> bool {
        matches!(self, AbstractType::Null | AbstractType::Object(_))
    }
}

/// Locals and operand stack at one instruction.
///
/// Locals are slot-indexed (a `long` is followed by `Top`); the stack holds one entry per
/// value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FrameState {
    pub locals: Vec<AbstractType>,
    pub stack: Vec<AbstractType>,
}

impl FrameState {
    fn height(&self) -> usize {
        self.stack.iter().map(AbstractType::size).sum()
    }

    /// Locals in `StackMapTable` form: one entry per value, trailing `Top`s removed.
    pub fn frame_locals(&self) -> Vec<AbstractType> {
        let mut locals = Vec::with_capacity(self.locals.len());
        let mut slot = 0;
        while slot < self.locals.len() {
            let local = &self.locals[slot];
            slot += local.size();
            locals.push(match local {
                AbstractType::ReturnAddress => AbstractType::Top,
                other => other.clone(),
            });
        }
        while locals.last() == Some(&AbstractType::Top) {
            locals.pop();
        }
        locals
    }

    /// The operand stack in `StackMapTable` form.
    pub fn frame_stack(&self) -> Vec<AbstractType> {
        self.stack
            .iter()
            .map(|value| match value {
                AbstractType::ReturnAddress => AbstractType::Top,
                other => other.clone(),
            })
            .collect()
    }
}

/// A resolved exception table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Handler {
    pub start: usize,
    pub end: usize,
    pub handler: usize,
    pub catch_type: Option<String>,
}

/// What the analysis needs to know about the method.
pub(crate) struct MethodShape<'a> {
    /// `Owner.name(descriptor)`, for error messages
    pub display: &'a str,
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a MethodDescriptor,
    pub is_static: bool,
    /// Common superclass lookups; `None` when no frames will be written
    pub resolver: Option<&'a Resolver>,
}

/// Result of [`analyze`].
#[derive(Debug)]
pub(crate) struct Analysis {
    pub max_stack: u16,
    pub max_locals: u16,
    pub initial: FrameState,
    /// Input frames at every reachable block start that needs one, by code offset
    pub frames: Vec<(usize, FrameState)>,
    /// Unreachable code ranges `[start, end)`
    pub dead: Vec<(usize, usize)>,
}

/// Run the data-flow analysis over `insns` (each paired with its code offset).
pub(crate) fn analyze(
    shape: &MethodShape<'_>,
    insns: &[(usize, Insn)],
    labels: &HashMap<Label, usize>,
    handlers: &[Handler],
    code_length: usize,
) -> Result<Analysis> {
    Analyzer::new(shape, insns, labels, handlers)?.run(code_length)
}

struct Analyzer<'a> {
    shape: &'a MethodShape<'a>,
    insns: &'a [(usize, Insn)],
    labels: &'a HashMap<Label, usize>,
    handlers: Vec<(usize, usize, usize, AbstractType)>,
    index: HashMap<usize, usize>,
    /// Class created by the `new` at each offset
    allocations: HashMap<usize, String>,
    states: Vec<Option<FrameState>>,
    queue: VecDeque<usize>,
    queued: Vec<bool>,
}

impl<'a> Analyzer<'a> {
    fn new(
        shape: &'a MethodShape<'a>,
        insns: &'a [(usize, Insn)],
        labels: &'a HashMap<Label, usize>,
        handlers: &[Handler],
    ) -> Result<Self> {
        let index = insns
            .iter()
            .enumerate()
            .map(|(position, (offset, _))| (*offset, position))
            .collect::<HashMap<_, _>>();
        let allocations = insns
            .iter()
            .filter_map(|(offset, insn)| match insn {
                Insn::Type { opcode: NEW, class } => Some((*offset, class.clone())),
                _ => None,
            })
            .collect();

        let mut analyzer = Analyzer {
            shape,
            insns,
            labels,
            handlers: Vec::with_capacity(handlers.len()),
            index,
            allocations,
            states: vec![None; insns.len()],
            queue: VecDeque::new(),
            queued: vec![false; insns.len()],
        };

        for handler in handlers {
            let target = analyzer.position_of(handler.handler)?;
            let caught = AbstractType::Object(
                handler
                    .catch_type
                    .clone()
                    .unwrap_or_else(|| "java/lang/Throwable".to_string()),
            );
            analyzer
                .handlers
                .push((handler.start, handler.end, target, caught));
        }
        Ok(analyzer)
    }

    fn fail(&self, message: impl Into<String>) -> Error {
        Error::FrameComputation {
            method: self.shape.display.to_string(),
            message: message.into(),
        }
    }

    fn position_of(&self, offset: usize) -> Result<usize> {
        self.index
            .get(&offset)
            .copied()
            .ok_or_else(|| self.fail(format!("offset {offset} is not an instruction")))
    }

    fn target(&self, label: Label) -> Result<usize> {
        let Some(offset) = self.labels.get(&label) else {
            return Err(self.fail(format!("label {label} is not placed")));
        };
        self.position_of(*offset)
    }

    fn max_locals(&self) -> Result<usize> {
        let mut max = usize::from(self.shape.descriptor.parameter_slots())
            + usize::from(!self.shape.is_static);
        for (_, insn) in self.insns {
            let end = match insn {
                Insn::Var { opcode, var } => {
                    let size = match *opcode {
                        LLOAD | DLOAD | LSTORE | DSTORE => 2,
                        _ => 1,
                    };
                    usize::from(*var) + size
                }
                Insn::Iinc { var, .. } => usize::from(*var) + 1,
                _ => 0,
            };
            max = max.max(end);
        }
        if max > usize::from(u16::MAX) {
            return Err(self.fail("more than 65535 local slots"));
        }
        Ok(max)
    }

    fn initial_state(&self, max_locals: usize) -> Result<FrameState> {
        let mut state = FrameState {
            locals: vec![AbstractType::Top; max_locals],
            stack: Vec::new(),
        };
        let mut slot = 0;
        if !self.shape.is_static {
            state.locals[0] =
                if self.shape.name == "<init>" && self.shape.class_name != "java/lang/Object" {
                    AbstractType::UninitializedThis
                } else {
                    AbstractType::Object(self.shape.class_name.to_string())
                };
            slot = 1;
        }
        for parameter in &self.shape.descriptor.parameters {
            let value = AbstractType::from_field(parameter);
            let size = value.size();
            self.store(&mut state, slot, value)?;
            slot += size;
        }
        Ok(state)
    }

    fn run(mut self, code_length: usize) -> Result<Analysis> {
        let insns = self.insns;
        if insns.is_empty() {
            return Err(self.fail("empty code"));
        }

        let max_locals = self.max_locals()?;
        let initial = self.initial_state(max_locals)?;
        self.merge_into(0, initial.clone())?;

        let mut max_stack = 0;
        while let Some(position) = self.queue.pop_front() {
            self.queued[position] = false;
            let Some(input) = self.states[position].clone() else {
                continue;
            };
            let (offset, insn) = &insns[position];

            let mut output = input.clone();
            self.execute(&mut output, insn, *offset)?;
            max_stack = max_stack.max(input.height()).max(output.height());

            let covering = self
                .handlers
                .iter()
                .filter(|(start, end, _, _)| (*start..*end).contains(offset))
                .map(|(_, _, target, caught)| (*target, caught.clone()))
                .collect::<Vec<_>>();
            for (target, caught) in covering {
                for locals in [&input.locals, &output.locals] {
                    self.merge_into(
                        target,
                        FrameState {
                            locals: locals.clone(),
                            stack: vec![caught.clone()],
                        },
                    )?;
                }
            }

            for (successor, state) in self.successors(position, insn, &input, output)? {
                self.merge_into(successor, state)?;
            }
        }

        let mut frame_points = BTreeMap::new();
        for (position, (_, insn)) in self.insns.iter().enumerate() {
            for label in insn.targets() {
                frame_points.insert(self.target(label)?, ());
            }
            if ends_block(insn) && position + 1 < self.insns.len() {
                frame_points.insert(position + 1, ());
            }
        }
        for (_, _, target, _) in &self.handlers {
            frame_points.insert(*target, ());
        }

        let frames = frame_points
            .keys()
            .filter_map(|position| {
                self.states[*position]
                    .as_ref()
                    .map(|state| (self.insns[*position].0, state.clone()))
            })
            .collect();

        let mut dead = Vec::new();
        let mut position = 0;
        while position < self.insns.len() {
            if self.states[position].is_some() {
                position += 1;
                continue;
            }
            let start = self.insns[position].0;
            while position < self.insns.len() && self.states[position].is_none() {
                position += 1;
            }
            let end = self
                .insns
                .get(position)
                .map_or(code_length, |(offset, _)| *offset);
            dead.push((start, end));
        }
        if !dead.is_empty() {
            max_stack = max_stack.max(1);
        }

        let Ok(max_stack) = u16::try_from(max_stack) else {
            return Err(self.fail("operand stack deeper than 65535"));
        };
        #[allow(clippy::cast_possible_truncation)]
        let max_locals = max_locals as u16;
        Ok(Analysis {
            max_stack,
            max_locals,
            initial,
            frames,
            dead,
        })
    }

    fn successors(
        &self,
        position: usize,
        insn: &Insn,
        input: &FrameState,
        output: FrameState,
    ) -> Result<Vec<(usize, FrameState)>> {
        let fallthrough = || -> Result<usize> {
            if position + 1 < self.insns.len() {
                Ok(position + 1)
            } else {
                Err(self.fail("execution falls off the end of the code"))
            }
        };

        Ok(match insn {
            Insn::Jump {
                opcode: GOTO | GOTO_W,
                target,
            } => vec![(self.target(*target)?, output)],
            Insn::Jump {
                opcode: JSR | JSR_W,
                target,
            } => vec![
                (self.target(*target)?, output),
                (fallthrough()?, input.clone()),
            ],
            Insn::Jump { target, .. } => vec![
                (self.target(*target)?, output.clone()),
                (fallthrough()?, output),
            ],
            Insn::TableSwitch {
                default, targets, ..
            }
            | Insn::LookupSwitch {
                default, targets, ..
            } => {
                let mut successors = vec![(self.target(*default)?, output.clone())];
                for target in targets {
                    successors.push((self.target(*target)?, output.clone()));
                }
                successors
            }
            Insn::Var { opcode: RET, .. } => Vec::new(),
            Insn::Simple(ATHROW) => Vec::new(),
            insn if insn.is_return() => Vec::new(),
            _ => vec![(fallthrough()?, output)],
        })
    }

    fn merge_into(&mut self, position: usize, incoming: FrameState) -> Result<()> {
        let changed = match self.states[position].take() {
            None => {
                self.states[position] = Some(incoming);
                true
            }
            Some(mut existing) => {
                if existing.stack.len() != incoming.stack.len() {
                    let offset = self.insns[position].0;
                    return Err(self.fail(format!(
                        "stack heights {} and {} meet at offset {}",
                        existing.stack.len(),
                        incoming.stack.len(),
                        offset
                    )));
                }
                let mut changed = false;
                for (current, other) in existing
                    .locals
                    .iter_mut()
                    .chain(existing.stack.iter_mut())
                    .zip(incoming.locals.iter().chain(incoming.stack.iter()))
                {
                    let merged = self.merge(current, other)?;
                    if merged != *current {
                        *current = merged;
                        changed = true;
                    }
                }
                self.states[position] = Some(existing);
                changed
            }
        };

        if changed && !self.queued[position] {
            self.queued[position] = true;
            self.queue.push_back(position);
        }
        Ok(())
    }

    /// Least upper bound of two types.
    fn merge(&self, current: &AbstractType, other: &AbstractType) -> Result<AbstractType> {
        if current == other {
            return Ok(current.clone());
        }
        Ok(match (current, other) {
            (AbstractType::Null, value) | (value, AbstractType::Null) if value.is_reference() => {
                value.clone()
            }
            (AbstractType::Object(left), AbstractType::Object(right)) => {
                AbstractType::Object(self.merge_references(left, right)?)
            }
            _ => AbstractType::Top,
        })
    }

    fn merge_references(&self, left: &str, right: &str) -> Result<String> {
        let (left_dims, left_element) = array_shape(left);
        let (right_dims, right_element) = array_shape(right);

        if left_dims == right_dims && left_element && right_element {
            let element = |name: &str| name[left_dims + 1..name.len() - 1].to_string();
            let (left_name, right_name) = if left_dims == 0 {
                (left.to_string(), right.to_string())
            } else {
                (element(left), element(right))
            };
            let common = match self.shape.resolver {
                Some(resolver) => resolver
                    .common_super_class(&left_name, &right_name)
                    .ok_or_else(|| {
                        self.fail(format!(
                            "cannot find a common superclass of {left_name} and {right_name}"
                        ))
                    })?,
                None => "java/lang/Object".to_string(),
            };
            return Ok(object_array(left_dims, &common));
        }

        // Arrays of different shapes only share Object (or Object[] at the common depth).
        let common = if left_dims == 0 || right_dims == 0 {
            0
        } else if left_dims == right_dims {
            left_dims - 1
        } else {
            let (dims, element) = if left_dims < right_dims {
                (left_dims, left_element)
            } else {
                (right_dims, right_element)
            };
            if element {
                dims
            } else {
                dims - 1
            }
        };
        Ok(object_array(common, "java/lang/Object"))
    }

    fn pop(&self, state: &mut FrameState) -> Result<AbstractType> {
        state
            .stack
            .pop()
            .ok_or_else(|| self.fail("operand stack underflow"))
    }

    fn pop_n(&self, state: &mut FrameState, count: usize) -> Result<()> {
        for _ in 0..count {
            self.pop(state)?;
        }
        Ok(())
    }

    fn load(&self, state: &FrameState, var: u16) -> Result<AbstractType> {
        state
            .locals
            .get(usize::from(var))
            .cloned()
            .ok_or_else(|| self.fail(format!("local {var} out of range")))
    }

    fn store(&self, state: &mut FrameState, slot: usize, value: AbstractType) -> Result<()> {
        let size = value.size();
        if slot + size > state.locals.len() {
            return Err(self.fail(format!("local {slot} out of range")));
        }
        if slot > 0 && state.locals[slot - 1].size() == 2 {
            state.locals[slot - 1] = AbstractType::Top;
        }
        state.locals[slot] = value;
        if size == 2 {
            state.locals[slot + 1] = AbstractType::Top;
        }
        Ok(())
    }

    fn descriptor_type(&self, descriptor: &str) -> Result<AbstractType> {
        Ok(AbstractType::from_field(&FieldType::parse(descriptor)?))
    }

    fn invoke(&self, state: &mut FrameState, descriptor: &str) -> Result<()> {
        let descriptor = MethodDescriptor::parse(descriptor)?;
        self.pop_n(state, descriptor.parameters.len())?;
        Ok(())
    }

    fn push_return(state: &mut FrameState, descriptor: &str) -> Result<()> {
        let descriptor = MethodDescriptor::parse(descriptor)?;
        if let ReturnType::Value(value) = &descriptor.return_type {
            state.stack.push(AbstractType::from_field(value));
        }
        Ok(())
    }

    fn execute(&self, state: &mut FrameState, insn: &Insn, offset: usize) -> Result<()> {
        match insn {
            Insn::Simple(opcode) => self.simple(state, *opcode)?,
            Insn::Int { opcode, operand } => {
                if *opcode == NEWARRAY {
                    self.pop(state)?;
                    let component = match u8::try_from(*operand) {
                        Ok(T_BOOLEAN) => "Z",
                        Ok(T_CHAR) => "C",
                        Ok(T_FLOAT) => "F",
                        Ok(T_DOUBLE) => "D",
                        Ok(T_BYTE) => "B",
                        Ok(T_SHORT) => "S",
                        Ok(T_INT) => "I",
                        Ok(T_LONG) => "J",
                        _ => return Err(self.fail(format!("invalid newarray type {operand}"))),
                    };
                    state.stack.push(AbstractType::Object(format!("[{component}")));
                } else {
                    state.stack.push(AbstractType::Int);
                }
            }
            Insn::Var { opcode, var } => match *opcode {
                ILOAD => state.stack.push(AbstractType::Int),
                LLOAD => state.stack.push(AbstractType::Long),
                FLOAD => state.stack.push(AbstractType::Float),
                DLOAD => state.stack.push(AbstractType::Double),
                ALOAD => {
                    let value = self.load(state, *var)?;
                    state.stack.push(value);
                }
                ISTORE | LSTORE | FSTORE | DSTORE | ASTORE => {
                    let value = self.pop(state)?;
                    let value = match *opcode {
                        ISTORE => AbstractType::Int,
                        LSTORE => AbstractType::Long,
                        FSTORE => AbstractType::Float,
                        DSTORE => AbstractType::Double,
                        _ => value,
                    };
                    self.store(state, usize::from(*var), value)?;
                }
                RET => {}
                other => return Err(self.fail(format!("invalid local variable opcode {other}"))),
            },
            Insn::Iinc { var, .. } => self.store(state, usize::from(*var), AbstractType::Int)?,
            Insn::Type { opcode, class } => match *opcode {
                NEW => state.stack.push(AbstractType::Uninitialized(offset)),
                ANEWARRAY => {
                    self.pop(state)?;
                    let array = if class.starts_with('[') {
                        format!("[{class}")
                    } else {
                        format!("[L{class};")
                    };
                    state.stack.push(AbstractType::Object(array));
                }
                CHECKCAST => {
                    self.pop(state)?;
                    state.stack.push(AbstractType::Object(class.clone()));
                }
                INSTANCEOF => {
                    self.pop(state)?;
                    state.stack.push(AbstractType::Int);
                }
                other => return Err(self.fail(format!("invalid type opcode {other}"))),
            },
            Insn::Field {
                opcode, descriptor, ..
            } => {
                let value = self.descriptor_type(descriptor)?;
                match *opcode {
                    GETSTATIC => state.stack.push(value),
                    PUTSTATIC => {
                        self.pop(state)?;
                    }
                    GETFIELD => {
                        self.pop(state)?;
                        state.stack.push(value);
                    }
                    PUTFIELD => self.pop_n(state, 2)?,
                    other => return Err(self.fail(format!("invalid field opcode {other}"))),
                }
            }
            Insn::Method {
                opcode,
                name,
                descriptor,
                ..
            } => {
                self.invoke(state, descriptor)?;
                if *opcode != INVOKESTATIC {
                    let receiver = self.pop(state)?;
                    if *opcode == INVOKESPECIAL && name == "<init>" {
                        let initialized = match &receiver {
                            AbstractType::UninitializedThis => {
                                Some(AbstractType::Object(self.shape.class_name.to_string()))
                            }
                            AbstractType::Uninitialized(at) => self
                                .allocations
                                .get(at)
                                .map(|class| AbstractType::Object(class.clone())),
                            _ => None,
                        };
                        if let Some(initialized) = initialized {
                            for value in state.locals.iter_mut().chain(state.stack.iter_mut()) {
                                if *value == receiver {
                                    *value = initialized.clone();
                                }
                            }
                        }
                    }
                }
                Self::push_return(state, descriptor)?;
            }
            Insn::InvokeDynamic { descriptor, .. } => {
                self.invoke(state, descriptor)?;
                Self::push_return(state, descriptor)?;
            }
            Insn::Jump { opcode, .. } => match *opcode {
                IFEQ..=IFLE | IFNULL | IFNONNULL => {
                    self.pop(state)?;
                }
                IF_ICMPEQ..=IF_ACMPNE => self.pop_n(state, 2)?,
                GOTO | GOTO_W => {}
                JSR | JSR_W => state.stack.push(AbstractType::ReturnAddress),
                other => return Err(self.fail(format!("invalid jump opcode {other}"))),
            },
            Insn::Ldc(constant) => state.stack.push(match constant {
                LdcConstant::Int(_) => AbstractType::Int,
                LdcConstant::Float(_) => AbstractType::Float,
                LdcConstant::Long(_) => AbstractType::Long,
                LdcConstant::Double(_) => AbstractType::Double,
                LdcConstant::String(_) | LdcConstant::Utf16(_) => {
                    AbstractType::Object("java/lang/String".to_string())
                }
                LdcConstant::Class(_) => AbstractType::Object("java/lang/Class".to_string()),
                LdcConstant::MethodType(_) => {
                    AbstractType::Object("java/lang/invoke/MethodType".to_string())
                }
                LdcConstant::MethodHandle(_) => {
                    AbstractType::Object("java/lang/invoke/MethodHandle".to_string())
                }
                LdcConstant::Dynamic(dynamic) => self.descriptor_type(&dynamic.descriptor)?,
            }),
            Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => {
                self.pop(state)?;
            }
            Insn::MultiANewArray {
                descriptor,
                dimensions,
            } => {
                self.pop_n(state, usize::from(*dimensions))?;
                state.stack.push(AbstractType::Object(descriptor.clone()));
            }
        }
        Ok(())
    }

    fn simple(&self, state: &mut FrameState, opcode: u8) -> Result<()> {
        use AbstractType::{Double, Float, Int, Long, Null};

        let push = |state: &mut FrameState, value: AbstractType| state.stack.push(value);
        match opcode {
            NOP | RETURN => {}
            ACONST_NULL => push(state, Null),
            ICONST_M1..=ICONST_5 => push(state, Int),
            LCONST_0 | LCONST_1 => push(state, Long),
            FCONST_0..=FCONST_2 => push(state, Float),
            DCONST_0 | DCONST_1 => push(state, Double),
            IALOAD | BALOAD | CALOAD | SALOAD => {
                self.pop_n(state, 2)?;
                push(state, Int);
            }
            LALOAD => {
                self.pop_n(state, 2)?;
                push(state, Long);
            }
            FALOAD => {
                self.pop_n(state, 2)?;
                push(state, Float);
            }
            DALOAD => {
                self.pop_n(state, 2)?;
                push(state, Double);
            }
            AALOAD => {
                self.pop(state)?;
                let array = self.pop(state)?;
                push(state, component_of(&array));
            }
            IASTORE..=SASTORE => self.pop_n(state, 3)?,
            POP => {
                self.pop(state)?;
            }
            POP2 => {
                if self.pop(state)?.size() == 1 {
                    self.pop(state)?;
                }
            }
            DUP => {
                let value = self.pop(state)?;
                state.stack.extend([value.clone(), value]);
            }
            DUP_X1 => {
                let first = self.pop(state)?;
                let second = self.pop(state)?;
                state.stack.extend([first.clone(), second, first]);
            }
            DUP_X2 => {
                let first = self.pop(state)?;
                let second = self.pop(state)?;
                if second.size() == 2 {
                    state.stack.extend([first.clone(), second, first]);
                } else {
                    let third = self.pop(state)?;
                    state.stack.extend([first.clone(), third, second, first]);
                }
            }
            DUP2 => {
                let first = self.pop(state)?;
                if first.size() == 2 {
                    state.stack.extend([first.clone(), first]);
                } else {
                    let second = self.pop(state)?;
                    state
                        .stack
                        .extend([second.clone(), first.clone(), second, first]);
                }
            }
            DUP2_X1 => {
                let first = self.pop(state)?;
                let second = self.pop(state)?;
                if first.size() == 2 {
                    state.stack.extend([first.clone(), second, first]);
                } else {
                    let third = self.pop(state)?;
                    state
                        .stack
                        .extend([second.clone(), first.clone(), third, second, first]);
                }
            }
            DUP2_X2 => {
                let first = self.pop(state)?;
                let second = self.pop(state)?;
                match (first.size(), second.size()) {
                    (2, 2) => state.stack.extend([first.clone(), second, first]),
                    (2, _) => {
                        let third = self.pop(state)?;
                        state.stack.extend([first.clone(), third, second, first]);
                    }
                    _ => {
                        let third = self.pop(state)?;
                        if third.size() == 2 {
                            state
                                .stack
                                .extend([second.clone(), first.clone(), third, second, first]);
                        } else {
                            let fourth = self.pop(state)?;
                            state.stack.extend([
                                second.clone(),
                                first.clone(),
                                fourth,
                                third,
                                second,
                                first,
                            ]);
                        }
                    }
                }
            }
            SWAP => {
                let first = self.pop(state)?;
                let second = self.pop(state)?;
                state.stack.extend([first, second]);
            }
            IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR | LCMP
            | FCMPL | FCMPG | DCMPL | DCMPG => {
                self.pop_n(state, 2)?;
                push(state, Int);
            }
            LADD | LSUB | LMUL | LDIV | LREM | LSHL | LSHR | LUSHR | LAND | LOR | LXOR => {
                self.pop_n(state, 2)?;
                push(state, Long);
            }
            FADD | FSUB | FMUL | FDIV | FREM => {
                self.pop_n(state, 2)?;
                push(state, Float);
            }
            DADD | DSUB | DMUL | DDIV | DREM => {
                self.pop_n(state, 2)?;
                push(state, Double);
            }
            INEG | L2I | F2I | D2I | I2B | I2C | I2S | ARRAYLENGTH => {
                self.pop(state)?;
                push(state, Int);
            }
            LNEG | I2L | F2L | D2L => {
                self.pop(state)?;
                push(state, Long);
            }
            FNEG | I2F | L2F | D2F => {
                self.pop(state)?;
                push(state, Float);
            }
            DNEG | I2D | L2D | F2D => {
                self.pop(state)?;
                push(state, Double);
            }
            IRETURN..=ARETURN | ATHROW | MONITORENTER | MONITOREXIT => {
                self.pop(state)?;
            }
            other => return Err(self.fail(format!("opcode {other} takes operands"))),
        }
        Ok(())
    }
}

/// Whether control never falls through to the next instruction.
fn ends_block(insn: &Insn) -> bool {
    matches!(
        insn,
        Insn::Jump {
            opcode: GOTO | GOTO_W,
            ..
        } | Insn::TableSwitch { .. }
            | Insn::LookupSwitch { .. }
            | Insn::Simple(ATHROW)
            | Insn::Var { opcode: RET, .. }
    ) || insn.is_return()
}

fn component_of(array: &AbstractType) -> AbstractType {
    match array {
        AbstractType::Object(descriptor) if descriptor.starts_with('[') => {
            let component = &descriptor[1..];
            if component.starts_with('[') {
                AbstractType::Object(component.to_string())
            } else if let Some(name) = component
                .strip_prefix('L')
                .and_then(|rest| rest.strip_suffix(';'))
            {
                AbstractType::Object(name.to_string())
            } else {
                AbstractType::Top
            }
        }
        AbstractType::Null => AbstractType::Null,
        _ => AbstractType::Object("java/lang/Object".to_string()),
    }
}

/// Nesting depth of an array descriptor and whether its element is a reference.
fn array_shape(name: &str) -> (usize, bool) {
    let dimensions = name.bytes().take_while(|byte| *byte == b'[').count();
    if dimensions == 0 {
        return (0, true);
    }
    (dimensions, name.as_bytes().get(dimensions) == Some(&b'L'))
}

fn object_array(dimensions: usize, element: &str) -> String {
    if dimensions == 0 {
        element.to_string()
    } else {
        format!("{}L{element};", "[".repeat(dimensions))
    }
}

/// A verification type ready to be written, references resolved to pool indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Entry {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(u16),
    Uninitialized(u16),
}

/// One `stack_map_frame`, without its offset delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EncodedFrame {
    Same,
    SameLocals1(Entry),
    Chop(u8),
    Append(Vec<Entry>),
    Full(Vec<Entry>, Vec<Entry>),
}

/// Pick the shortest frame form describing `locals`/`stack` relative to `previous` locals.
pub(crate) fn compress(previous: &[Entry], locals: Vec<Entry>, stack: Vec<Entry>) -> EncodedFrame {
    if stack.is_empty() {
        if locals == previous {
            return EncodedFrame::Same;
        }
        if locals.len() < previous.len()
            && previous.len() - locals.len() <= 3
            && previous.starts_with(&locals)
        {
            #[allow(clippy::cast_possible_truncation)]
            return EncodedFrame::Chop((previous.len() - locals.len()) as u8);
        }
        if locals.len() > previous.len()
            && locals.len() - previous.len() <= 3
            && locals.starts_with(previous)
        {
            return EncodedFrame::Append(locals[previous.len()..].to_vec());
        }
    } else if stack.len() == 1 && locals == previous {
        return EncodedFrame::SameLocals1(stack.into_iter().next().unwrap_or(Entry::Top));
    }
    EncodedFrame::Full(locals, stack)
}

/// Serialize the body of a `StackMapTable` attribute. Offsets must be strictly increasing.
pub(crate) fn write_stack_map(frames: &[(usize, EncodedFrame)], method: &str) -> Result<Vec<u8>> {
    let fail = |message: String| Error::FrameComputation {
        method: method.to_string(),
        message,
    };

    let mut out = Vec::new();
    let Ok(count) = u16::try_from(frames.len()) else {
        return Err(fail("more than 65535 frames".to_string()));
    };
    push_be(&mut out, count);

    let mut previous: Option<usize> = None;
    for (offset, frame) in frames {
        let delta = match previous {
            None => Some(*offset),
            Some(previous) => offset.checked_sub(previous + 1),
        };
        let Some(delta) = delta.and_then(|delta| u16::try_from(delta).ok()) else {
            return Err(fail(format!("frame at offset {offset} is out of order")));
        };
        previous = Some(*offset);

        match frame {
            EncodedFrame::Same if delta < 64 => push_be(&mut out, delta as u8),
            EncodedFrame::Same => {
                push_be(&mut out, 251_u8);
                push_be(&mut out, delta);
            }
            EncodedFrame::SameLocals1(entry) => {
                if delta < 64 {
                    push_be(&mut out, 64 + delta as u8);
                } else {
                    push_be(&mut out, 247_u8);
                    push_be(&mut out, delta);
                }
                write_entry(&mut out, entry);
            }
            EncodedFrame::Chop(count) => {
                push_be(&mut out, 251 - count);
                push_be(&mut out, delta);
            }
            EncodedFrame::Append(locals) => {
                #[allow(clippy::cast_possible_truncation)]
                push_be(&mut out, 251 + locals.len() as u8);
                push_be(&mut out, delta);
                for entry in locals {
                    write_entry(&mut out, entry);
                }
            }
            EncodedFrame::Full(locals, stack) => {
                push_be(&mut out, 255_u8);
                push_be(&mut out, delta);
                for entries in [locals, stack] {
                    let Ok(count) = u16::try_from(entries.len()) else {
                        return Err(fail(format!("frame at offset {offset} is too large")));
                    };
                    push_be(&mut out, count);
                    for entry in entries {
                        write_entry(&mut out, entry);
                    }
                }
            }
        }
    }
    Ok(out)
}

fn write_entry(out: &mut Vec<u8>, entry: &Entry) {
    match entry {
        Entry::Top => push_be(out, 0_u8),
        Entry::Integer => push_be(out, 1_u8),
        Entry::Float => push_be(out, 2_u8),
        Entry::Double => push_be(out, 3_u8),
        Entry::Long => push_be(out, 4_u8),
        Entry::Null => push_be(out, 5_u8),
        Entry::UninitializedThis => push_be(out, 6_u8),
        Entry::Object(class) => {
            push_be(out, 7_u8);
            push_be(out, *class);
        }
        Entry::Uninitialized(offset) => {
            push_be(out, 8_u8);
            push_be(out, *offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::hierarchy::{ClassEntry, ClassHierarchy};
    use std::sync::{Arc, OnceLock};

    fn jdk() -> &'static Resolver {
        static RESOLVER: OnceLock<Resolver> = OnceLock::new();
        RESOLVER.get_or_init(|| Resolver::new(ClassHierarchy::jdk(), None))
    }

    fn shape<'a>(descriptor: &'a MethodDescriptor, is_static: bool) -> MethodShape<'a> {
        MethodShape {
            display: "demo/Widget.test",
            class_name: "demo/Widget",
            name: "test",
            descriptor,
            is_static,
            resolver: Some(jdk()),
        }
    }

    fn sequential(insns: Vec<Insn>) -> Vec<(usize, Insn)> {
        // Offsets only need to be distinct and ordered for the analysis.
        insns.into_iter().enumerate().collect()
    }

    #[test]
    fn straight_line_maxs() -> Result<()> {
        let descriptor = MethodDescriptor::parse("(JI)J")?;
        let insns = sequential(vec![
            Insn::Var {
                opcode: LLOAD,
                var: 1,
            },
            Insn::Var {
                opcode: ILOAD,
                var: 3,
            },
            Insn::Simple(I2L),
            Insn::Simple(LADD),
            Insn::Simple(LRETURN),
        ]);

        let analysis = analyze(&shape(&descriptor, false), &insns, &HashMap::new(), &[], 5)?;
        assert_eq!(analysis.max_stack, 4);
        assert_eq!(analysis.max_locals, 4);
        assert!(analysis.frames.is_empty());
        assert!(analysis.dead.is_empty());
        assert_eq!(
            analysis.initial.frame_locals(),
            vec![
                AbstractType::Object("demo/Widget".to_string()),
                AbstractType::Long,
                AbstractType::Int
            ]
        );
        Ok(())
    }

    #[test]
    fn subroutine_calls_resume_with_the_caller_stack() -> Result<()> {
        let descriptor = MethodDescriptor::parse("(I)V")?;
        let subroutine = Label(3);
        let insns = sequential(vec![
            Insn::Jump {
                opcode: JSR,
                target: subroutine,
            },
            Insn::Jump {
                opcode: JSR,
                target: subroutine,
            },
            Insn::Simple(RETURN),
            Insn::Var {
                opcode: ASTORE,
                var: 1,
            },
            Insn::Var {
                opcode: RET,
                var: 1,
            },
        ]);
        let labels = HashMap::from([(subroutine, 3)]);

        let mut shape = shape(&descriptor, true);
        shape.resolver = None;
        let analysis = analyze(&shape, &insns, &labels, &[], 5)?;
        assert_eq!(analysis.max_stack, 1);
        assert_eq!(analysis.max_locals, 2);
        assert!(analysis.dead.is_empty());
        Ok(())
    }

    #[test]
    fn branch_target_gets_frame() -> Result<()> {
        let descriptor = MethodDescriptor::parse("(I)V")?;
        let insns = sequential(vec![
            Insn::Var {
                opcode: ILOAD,
                var: 0,
            },
            Insn::Jump {
                opcode: IFEQ,
                target: Label(7),
            },
            Insn::Simple(ICONST_1),
            Insn::Simple(RETURN),
            Insn::Simple(RETURN),
        ]);
        let labels = HashMap::from([(Label(7), 4)]);

        let analysis = analyze(&shape(&descriptor, true), &insns, &labels, &[], 5)?;
        assert_eq!(analysis.max_stack, 1);
        assert_eq!(analysis.frames.len(), 1);
        assert_eq!(analysis.frames[0].0, 4);
        assert_eq!(analysis.frames[0].1.frame_locals(), vec![AbstractType::Int]);
        assert!(analysis.frames[0].1.stack.is_empty());
        Ok(())
    }

    #[test]
    fn unreachable_code_is_reported() -> Result<()> {
        let descriptor = MethodDescriptor::parse("()V")?;
        let insns = sequential(vec![
            Insn::Simple(RETURN),
            Insn::Simple(ICONST_0),
            Insn::Simple(POP),
            Insn::Simple(RETURN),
        ]);

        let analysis = analyze(&shape(&descriptor, true), &insns, &HashMap::new(), &[], 4)?;
        assert_eq!(analysis.dead, vec![(1, 4)]);
        assert!(analysis.frames.is_empty());
        Ok(())
    }

    #[test]
    fn constructor_initializes_this() -> Result<()> {
        let descriptor = MethodDescriptor::parse("()V")?;
        let shape = MethodShape {
            display: "demo/Widget.<init>",
            class_name: "demo/Widget",
            name: "<init>",
            descriptor: &descriptor,
            is_static: false,
            resolver: Some(jdk()),
        };
        let insns = sequential(vec![
            Insn::Var {
                opcode: ALOAD,
                var: 0,
            },
            Insn::Method {
                opcode: INVOKESPECIAL,
                owner: "java/lang/Object".to_string(),
                name: "<init>".to_string(),
                descriptor: "()V".to_string(),
                interface: false,
            },
            Insn::Var {
                opcode: ALOAD,
                var: 0,
            },
            Insn::Simple(POP),
            Insn::Simple(RETURN),
        ]);

        let analysis = analyze(&shape, &insns, &HashMap::new(), &[], 5)?;
        assert_eq!(
            analysis.initial.locals,
            vec![AbstractType::UninitializedThis]
        );
        assert_eq!(analysis.max_stack, 1);
        Ok(())
    }

    #[test]
    fn mismatched_stack_heights_fail() -> Result<()> {
        let descriptor = MethodDescriptor::parse("(I)V")?;
        let insns = sequential(vec![
            Insn::Simple(ICONST_1),
            Insn::Var {
                opcode: ILOAD,
                var: 0,
            },
            Insn::Jump {
                opcode: IFEQ,
                target: Label(1),
            },
            Insn::Simple(RETURN),
        ]);
        let labels = HashMap::from([(Label(1), 0)]);

        let result = analyze(&shape(&descriptor, true), &insns, &labels, &[], 4);
        assert!(matches!(result, Err(Error::FrameComputation { .. })));
        Ok(())
    }

    #[test]
    fn handler_sees_caught_type() -> Result<()> {
        let descriptor = MethodDescriptor::parse("()V")?;
        let insns = sequential(vec![
            Insn::Simple(NOP),
            Insn::Simple(RETURN),
            Insn::Var {
                opcode: ASTORE,
                var: 0,
            },
            Insn::Simple(RETURN),
        ]);
        let handlers = [Handler {
            start: 0,
            end: 1,
            handler: 2,
            catch_type: Some("java/io/IOException".to_string()),
        }];

        let analysis = analyze(&shape(&descriptor, true), &insns, &HashMap::new(), &handlers, 4)?;
        assert_eq!(analysis.max_locals, 1);
        assert_eq!(analysis.frames.len(), 1);
        assert_eq!(
            analysis.frames[0].1.stack,
            vec![AbstractType::Object("java/io/IOException".to_string())]
        );
        Ok(())
    }

    #[test]
    fn reference_merges() -> Result<()> {
        let descriptor = MethodDescriptor::parse("()V")?;
        let shape = shape(&descriptor, true);
        let labels = HashMap::new();
        let analyzer = Analyzer::new(&shape, &[], &labels, &[])?;
        let object = |name: &str| AbstractType::Object(name.to_string());

        assert_eq!(
            analyzer.merge_references("java/io/EOFException", "java/lang/NullPointerException")?,
            "java/lang/Exception"
        );
        assert_eq!(
            analyzer.merge_references("[Ljava/lang/Integer;", "[Ljava/lang/Long;")?,
            "[Ljava/lang/Number;"
        );
        assert_eq!(
            analyzer.merge_references("[Ljava/lang/String;", "java/lang/String")?,
            "java/lang/Object"
        );
        assert_eq!(analyzer.merge_references("[I", "[J")?, "java/lang/Object");
        assert_eq!(
            analyzer.merge_references("[[I", "[Ljava/lang/String;")?,
            "[Ljava/lang/Object;"
        );
        assert_eq!(
            analyzer.merge(&AbstractType::Null, &object("a/B"))?,
            object("a/B")
        );
        assert_eq!(
            analyzer.merge(&AbstractType::Int, &AbstractType::Float)?,
            AbstractType::Top
        );
        assert!(matches!(
            analyzer.merge(&object("a/B"), &object("c/D")),
            Err(Error::FrameComputation { .. })
        ));
        Ok(())
    }

    #[test]
    fn references_merge_loosely_without_resolver() -> Result<()> {
        let descriptor = MethodDescriptor::parse("()V")?;
        let mut shape = shape(&descriptor, true);
        shape.resolver = None;
        let labels = HashMap::new();
        let analyzer = Analyzer::new(&shape, &[], &labels, &[])?;
        assert_eq!(analyzer.merge_references("a/B", "c/D")?, "java/lang/Object");
        assert_eq!(
            analyzer.merge_references("[La/B;", "[Lc/D;")?,
            "[Ljava/lang/Object;"
        );
        Ok(())
    }

    /// `Exception e = flag ? new IOException() : new RuntimeException(); e.getMessage()`
    fn divergent_exceptions() -> (Vec<(usize, Insn)>, HashMap<Label, usize>) {
        let construct = |class: &str| {
            [
                Insn::Type {
                    opcode: NEW,
                    class: class.to_string(),
                },
                Insn::Simple(DUP),
                Insn::Method {
                    opcode: INVOKESPECIAL,
                    owner: class.to_string(),
                    name: "<init>".to_string(),
                    descriptor: "()V".to_string(),
                    interface: false,
                },
            ]
        };
        let mut insns = vec![
            Insn::Var {
                opcode: ILOAD,
                var: 0,
            },
            Insn::Jump {
                opcode: IFEQ,
                target: Label(1),
            },
        ];
        insns.extend(construct("java/io/IOException"));
        insns.push(Insn::Jump {
            opcode: GOTO,
            target: Label(2),
        });
        // Label(1) at 6
        insns.extend(construct("java/lang/RuntimeException"));
        // Label(2) at 9
        insns.push(Insn::Method {
            opcode: INVOKEVIRTUAL,
            owner: "java/lang/Exception".to_string(),
            name: "getMessage".to_string(),
            descriptor: "()Ljava/lang/String;".to_string(),
            interface: false,
        });
        insns.push(Insn::Simple(ARETURN));
        (
            sequential(insns),
            HashMap::from([(Label(1), 6), (Label(2), 9)]),
        )
    }

    #[test]
    fn divergent_references_meet_at_common_superclass() -> Result<()> {
        let descriptor = MethodDescriptor::parse("(Z)Ljava/lang/String;")?;
        let (insns, labels) = divergent_exceptions();

        let analysis = analyze(&shape(&descriptor, true), &insns, &labels, &[], 11)?;
        let (_, join) = analysis
            .frames
            .iter()
            .find(|(offset, _)| *offset == 9)
            .ok_or_else(|| Error::Error("no frame at the join".to_string()))?;
        assert_eq!(
            join.stack,
            vec![AbstractType::Object("java/lang/Exception".to_string())]
        );
        Ok(())
    }

    #[test]
    fn unknown_references_fail_the_merge() -> Result<()> {
        let descriptor = MethodDescriptor::parse("(Z)Ljava/lang/String;")?;
        let (mut insns, labels) = divergent_exceptions();
        for (_, insn) in &mut insns {
            match insn {
                Insn::Type { class, .. } | Insn::Method { owner: class, .. }
                    if class.starts_with("java/io") =>
                {
                    *class = "demo/Left".to_string();
                }
                Insn::Type { class, .. } | Insn::Method { owner: class, .. }
                    if class == "java/lang/RuntimeException" =>
                {
                    *class = "demo/Right".to_string();
                }
                _ => {}
            }
        }

        let result = analyze(&shape(&descriptor, true), &insns, &labels, &[], 11);
        assert!(matches!(
            result,
            Err(Error::FrameComputation { ref message, .. })
                if message.contains("demo/Left") && message.contains("demo/Right")
        ));

        // Once the classes are known, the same body resolves.
        let mut hierarchy = ClassHierarchy::with_jdk();
        for name in ["demo/Left", "demo/Right"] {
            hierarchy.insert(
                name,
                ClassEntry {
                    super_name: Some("java/lang/IllegalStateException".to_string()),
                    interface: false,
                },
            );
        }
        let resolver = Resolver::new(Arc::new(hierarchy), None);
        let mut shape = shape(&descriptor, true);
        shape.resolver = Some(&resolver);
        let analysis = analyze(&shape, &insns, &labels, &[], 11)?;
        assert!(analysis.frames.iter().any(|(offset, state)| *offset == 9
            && state.stack
                == vec![AbstractType::Object(
                    "java/lang/IllegalStateException".to_string()
                )]));
        Ok(())
    }

    #[test]
    fn compression_forms() {
        let base = vec![Entry::Integer];
        assert_eq!(
            compress(&base, vec![Entry::Integer], vec![]),
            EncodedFrame::Same
        );
        assert_eq!(
            compress(&base, vec![Entry::Integer], vec![Entry::Null]),
            EncodedFrame::SameLocals1(Entry::Null)
        );
        assert_eq!(compress(&base, vec![], vec![]), EncodedFrame::Chop(1));
        assert_eq!(
            compress(&base, vec![Entry::Integer, Entry::Long], vec![]),
            EncodedFrame::Append(vec![Entry::Long])
        );
        assert_eq!(
            compress(&base, vec![Entry::Float], vec![]),
            EncodedFrame::Full(vec![Entry::Float], vec![])
        );
    }

    #[test]
    fn stack_map_deltas() -> Result<()> {
        let frames = [
            (3, EncodedFrame::Same),
            (100, EncodedFrame::Same),
            (101, EncodedFrame::Chop(2)),
        ];
        let bytes = write_stack_map(&frames, "m")?;
        assert_eq!(bytes, vec![0, 3, 3, 251, 0, 96, 249, 0, 0]);

        assert!(write_stack_map(&[(5, EncodedFrame::Same), (5, EncodedFrame::Same)], "m").is_err());
        Ok(())
    }
}
