//! Bytecode assembly for one method body.
//!
//! Instructions are encoded as they arrive. Branches to labels that are not placed yet get a
//! placeholder that is patched in [`CodeBuffer::finish`], once every label has an offset.
//! Encodings are canonical: the short `xload_n` forms where they exist, `wide` only when an
//! operand needs it, and `ldc` whenever the constant index fits in one byte.

use std::{
    cell::RefCell,
    collections::{hash_map::Entry as Slot, BTreeSet, HashMap},
};

use crate::{
    classfile::{
        constants::ConstantPool,
        descriptor::{FieldType, MethodDescriptor, ReturnType},
        frame::{Frame, Maxs, VerificationType},
        frames::{self, AbstractType, EncodedFrame, Entry, Handler, MethodShape},
        instruction::{Insn, Label},
        member::{Attribute, LocalVariable},
        opcodes::*,
        writer::{AttributeTable, MethodContext},
    },
    file::io::{push_be, write_be_at},
    Error, Result,
};

struct Fixup {
    label: Label,
    /// Offset of the branching instruction
    source: usize,
    /// Offset of the placeholder
    at: usize,
    wide: bool,
}

struct TryCatch {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: Option<String>,
}

/// The body of a method while it is being written.
#[derive(Default)]
pub(crate) struct CodeBuffer {
    code: Vec<u8>,
    insns: Vec<(usize, Insn)>,
    labels: HashMap<Label, usize>,
    fixups: Vec<Fixup>,
    try_catch: Vec<TryCatch>,
    lines: Vec<(Label, u16)>,
    locals: Vec<LocalVariable>,
    frames: Vec<(usize, Frame)>,
    attributes: Vec<Attribute>,
}

impl CodeBuffer {
    pub fn label(&mut self, label: Label, method: &str) -> Result<()> {
        let offset = self.code.len();
        match self.labels.entry(label) {
            Slot::Occupied(existing) if *existing.get() != offset => Err(Error::Error(format!(
                "{method}: label {label} placed at both {} and {offset}",
                existing.get()
            ))),
            Slot::Occupied(_) => Ok(()),
            Slot::Vacant(slot) => {
                slot.insert(offset);
                Ok(())
            }
        }
    }

    pub fn frame(&mut self, frame: &Frame) {
        self.frames.push((self.code.len(), frame.clone()));
    }

    pub fn try_catch(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) {
        self.try_catch.push(TryCatch {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_string),
        });
    }

    pub fn line_number(&mut self, line: u16, start: Label) {
        self.lines.push((start, line));
    }

    pub fn local_variable(&mut self, variable: &LocalVariable) {
        self.locals.push(variable.clone());
    }

    pub fn attribute(&mut self, attribute: &Attribute) {
        self.attributes.push(attribute.clone());
    }

    fn jump(&mut self, label: Label, source: usize, wide: bool) {
        self.fixups.push(Fixup {
            label,
            source,
            at: self.code.len(),
            wide,
        });
        if wide {
            push_be(&mut self.code, 0_i32);
        } else {
            push_be(&mut self.code, 0_i16);
        }
    }

    fn align(&mut self) {
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
    }

    /// Encode one instruction at the current position.
    pub fn insn(&mut self, insn: &Insn, pool: &RefCell<ConstantPool>, method: &str) -> Result<()> {
        let offset = self.code.len();
        let invalid = |what: String| Error::Error(format!("{method}: {what} at offset {offset}"));

        match insn {
            Insn::Simple(opcode) => self.code.push(*opcode),
            Insn::Int { opcode, operand } => {
                self.code.push(*opcode);
                match *opcode {
                    BIPUSH => match i8::try_from(*operand) {
                        Ok(value) => push_be(&mut self.code, value),
                        Err(_) => return Err(invalid(format!("bipush operand {operand}"))),
                    },
                    SIPUSH => match i16::try_from(*operand) {
                        Ok(value) => push_be(&mut self.code, value),
                        Err(_) => return Err(invalid(format!("sipush operand {operand}"))),
                    },
                    NEWARRAY => match u8::try_from(*operand) {
                        Ok(value) => push_be(&mut self.code, value),
                        Err(_) => return Err(invalid(format!("newarray type {operand}"))),
                    },
                    other => return Err(invalid(format!("opcode {other} with an int operand"))),
                }
            }
            Insn::Var { opcode, var } => match (*opcode, u8::try_from(*var)) {
                (ILOAD..=ALOAD, _) if *var <= 3 => {
                    #[allow(clippy::cast_possible_truncation)]
                    self.code.push(ILOAD_0 + (opcode - ILOAD) * 4 + *var as u8);
                }
                (ISTORE..=ASTORE, _) if *var <= 3 => {
                    #[allow(clippy::cast_possible_truncation)]
                    self.code.push(ISTORE_0 + (opcode - ISTORE) * 4 + *var as u8);
                }
                (ILOAD..=ALOAD | ISTORE..=ASTORE | RET, Ok(var)) => {
                    self.code.extend_from_slice(&[*opcode, var]);
                }
                (ILOAD..=ALOAD | ISTORE..=ASTORE | RET, Err(_)) => {
                    self.code.extend_from_slice(&[WIDE, *opcode]);
                    push_be(&mut self.code, *var);
                }
                (other, _) => return Err(invalid(format!("opcode {other} with a local operand"))),
            },
            Insn::Iinc { var, increment } => {
                match (u8::try_from(*var), i8::try_from(*increment)) {
                    (Ok(var), Ok(increment)) => {
                        self.code.extend_from_slice(&[IINC, var]);
                        push_be(&mut self.code, increment);
                    }
                    _ => {
                        self.code.extend_from_slice(&[WIDE, IINC]);
                        push_be(&mut self.code, *var);
                        push_be(&mut self.code, *increment);
                    }
                }
            }
            Insn::Type { opcode, class } => {
                let index = pool.borrow_mut().add_class(class)?;
                self.code.push(*opcode);
                push_be(&mut self.code, index);
            }
            Insn::Field {
                opcode,
                owner,
                name,
                descriptor,
            } => {
                let index = pool.borrow_mut().add_field_ref(owner, name, descriptor)?;
                self.code.push(*opcode);
                push_be(&mut self.code, index);
            }
            Insn::Method {
                opcode,
                owner,
                name,
                descriptor,
                interface,
            } => {
                let index = pool
                    .borrow_mut()
                    .add_method_ref(owner, name, descriptor, *interface)?;
                self.code.push(*opcode);
                push_be(&mut self.code, index);
                if *opcode == INVOKEINTERFACE {
                    let slots = MethodDescriptor::parse(descriptor)?.parameter_slots() + 1;
                    let Ok(count) = u8::try_from(slots) else {
                        return Err(invalid(format!("{slots} argument slots")));
                    };
                    self.code.extend_from_slice(&[count, 0]);
                }
            }
            Insn::InvokeDynamic {
                name,
                descriptor,
                bootstrap,
                arguments,
            } => {
                let index =
                    pool.borrow_mut()
                        .add_invoke_dynamic(name, descriptor, bootstrap, arguments)?;
                self.code.push(INVOKEDYNAMIC);
                push_be(&mut self.code, index);
                push_be(&mut self.code, 0_u16);
            }
            Insn::Jump { opcode, target } => {
                self.code.push(*opcode);
                self.jump(*target, offset, matches!(*opcode, GOTO_W | JSR_W));
            }
            Insn::Ldc(constant) => {
                let index = pool.borrow_mut().add_loadable(constant)?;
                if constant.is_wide() {
                    self.code.push(LDC2_W);
                    push_be(&mut self.code, index);
                } else if let Ok(index) = u8::try_from(index) {
                    self.code.extend_from_slice(&[LDC, index]);
                } else {
                    self.code.push(LDC_W);
                    push_be(&mut self.code, index);
                }
            }
            Insn::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                if i64::from(*high) - i64::from(*low) + 1 != targets.len() as i64 {
                    return Err(invalid(format!(
                        "tableswitch {low}..={high} with {} targets",
                        targets.len()
                    )));
                }
                self.code.push(TABLESWITCH);
                self.align();
                self.jump(*default, offset, true);
                push_be(&mut self.code, *low);
                push_be(&mut self.code, *high);
                for target in targets {
                    self.jump(*target, offset, true);
                }
            }
            Insn::LookupSwitch {
                default,
                keys,
                targets,
            } => {
                if keys.len() != targets.len() {
                    return Err(invalid(format!(
                        "lookupswitch with {} keys and {} targets",
                        keys.len(),
                        targets.len()
                    )));
                }
                let Ok(count) = i32::try_from(keys.len()) else {
                    return Err(invalid("oversized lookupswitch".to_string()));
                };
                self.code.push(LOOKUPSWITCH);
                self.align();
                self.jump(*default, offset, true);
                push_be(&mut self.code, count);
                for (key, target) in keys.iter().zip(targets) {
                    push_be(&mut self.code, *key);
                    self.jump(*target, offset, true);
                }
            }
            Insn::MultiANewArray {
                descriptor,
                dimensions,
            } => {
                let index = pool.borrow_mut().add_class(descriptor)?;
                self.code.push(MULTIANEWARRAY);
                push_be(&mut self.code, index);
                self.code.push(*dimensions);
            }
        }

        self.insns.push((offset, insn.clone()));
        Ok(())
    }

    fn resolve_fixups(&mut self, method: &str) -> Result<()> {
        for fixup in &self.fixups {
            let Some(target) = self.labels.get(&fixup.label) else {
                return Err(Error::UnresolvedLabel {
                    method: method.to_string(),
                });
            };
            let delta = *target as i64 - fixup.source as i64;
            let mut at = fixup.at;
            if fixup.wide {
                #[allow(clippy::cast_possible_truncation)]
                write_be_at(&mut self.code, &mut at, delta as i32)?;
            } else {
                let Ok(delta) = i16::try_from(delta) else {
                    return Err(Error::BranchOutOfRange {
                        method: method.to_string(),
                        offset: delta,
                    });
                };
                write_be_at(&mut self.code, &mut at, delta)?;
            }
        }
        Ok(())
    }

    fn offset_of(&self, label: Label) -> Option<usize> {
        self.labels.get(&label).copied()
    }

    /// Finish the body and serialize the `Code` attribute (without its name and length).
    ///
    /// With [`Maxs::Recompute`], branches to labels that were never placed land on appended
    /// default exits (one per label), incomplete exception entries are dropped, and maxs and frames
    /// are derived from the code. With [`Maxs::Explicit`], every referenced label must be
    /// placed and frames are written as they were visited.
    pub fn finish(
        mut self,
        context: &MethodContext,
        maxs: Maxs,
        pool: &RefCell<ConstantPool>,
    ) -> Result<Vec<u8>> {
        let method = context.display();
        let descriptor = MethodDescriptor::parse(&context.descriptor)?;
        let recompute = matches!(maxs, Maxs::Recompute);

        let dangling = self
            .fixups
            .iter()
            .map(|fixup| fixup.label)
            .filter(|label| !self.labels.contains_key(label))
            .collect::<BTreeSet<_>>();
        if !dangling.is_empty() {
            if !recompute {
                return Err(Error::UnresolvedLabel { method });
            }
            // One pad per label: branches to different labels may carry different stack
            // heights (a `jsr` pushes its return address).
            for label in &dangling {
                self.labels.insert(*label, self.code.len());
                for insn in default_exit(&descriptor.return_type) {
                    self.insn(&insn, pool, &method)?;
                }
            }
            log::debug!(
                "{}: {} dangling labels bound to default exits",
                method,
                dangling.len()
            );
        }

        if self.code.is_empty() || self.code.len() > usize::from(u16::MAX) {
            return Err(Error::Error(format!(
                "{method}: code length {} outside 1..=65535",
                self.code.len()
            )));
        }
        self.resolve_fixups(&method)?;

        let mut handlers = Vec::with_capacity(self.try_catch.len());
        for entry in &self.try_catch {
            match (
                self.offset_of(entry.start),
                self.offset_of(entry.end),
                self.offset_of(entry.handler),
            ) {
                (Some(start), Some(end), Some(handler)) if start < end => handlers.push(Handler {
                    start,
                    end,
                    handler,
                    catch_type: entry.catch_type.clone(),
                }),
                (Some(_), Some(_), Some(_)) => {
                    log::debug!("{method}: dropping empty exception range");
                }
                _ if recompute => {
                    log::debug!("{method}: dropping exception range with an unplaced label");
                }
                _ => return Err(Error::UnresolvedLabel { method }),
            }
        }

        let (max_stack, max_locals, stack_map) = match maxs {
            Maxs::Explicit { stack, locals } => {
                (stack, locals, self.explicit_stack_map(pool, &method)?)
            }
            Maxs::Recompute => {
                let shape = MethodShape {
                    display: &method,
                    class_name: &context.class_name,
                    name: &context.name,
                    descriptor: &descriptor,
                    is_static: context.access.is_static(),
                    // Types are only written out with frames; below version 50 a
                    // merge only has to keep the stack height.
                    resolver: (context.major_version >= 50).then_some(&*context.resolver),
                };
                let analysis =
                    frames::analyze(&shape, &self.insns, &self.labels, &handlers, self.code.len())?;
                let stack_map = if context.major_version >= 50 {
                    handlers = self.erase_dead_code(&analysis.dead, handlers);
                    self.computed_stack_map(&analysis, pool, &method)?
                } else {
                    None
                };
                (analysis.max_stack, analysis.max_locals, stack_map)
            }
        };

        let mut attributes = AttributeTable::default();
        let mut pool_ref = pool.borrow_mut();

        let mut lines = Vec::new();
        for (label, line) in &self.lines {
            if let Some(offset) = self.offset_of(*label).filter(|offset| *offset < self.code.len()) {
                #[allow(clippy::cast_possible_truncation)]
                lines.push((offset as u16, *line));
            }
        }
        if !lines.is_empty() {
            let mut body = Vec::with_capacity(2 + lines.len() * 4);
            push_be(&mut body, table_length(lines.len(), &method)?);
            for (start, line) in lines {
                push_be(&mut body, start);
                push_be(&mut body, line);
            }
            attributes.add(&mut pool_ref, "LineNumberTable", body)?;
        }

        let mut variables = Vec::new();
        let mut variable_types = Vec::new();
        for local in &self.locals {
            let (Some(start), Some(end)) = (self.offset_of(local.start), self.offset_of(local.end))
            else {
                continue;
            };
            if end < start {
                continue;
            }
            #[allow(clippy::cast_possible_truncation)]
            let range = (start as u16, (end - start) as u16);
            let name = pool_ref.add_utf8(&local.name)?;
            variables.push((range, name, pool_ref.add_utf8(&local.descriptor)?, local.index));
            if let Some(signature) = &local.signature {
                variable_types.push((range, name, pool_ref.add_utf8(signature)?, local.index));
            }
        }
        for (name, table) in [
            ("LocalVariableTable", variables),
            ("LocalVariableTypeTable", variable_types),
        ] {
            if table.is_empty() {
                continue;
            }
            let mut body = Vec::with_capacity(2 + table.len() * 10);
            push_be(&mut body, table_length(table.len(), &method)?);
            for ((start, length), name, descriptor, index) in table {
                push_be(&mut body, start);
                push_be(&mut body, length);
                push_be(&mut body, name);
                push_be(&mut body, descriptor);
                push_be(&mut body, index);
            }
            attributes.add(&mut pool_ref, name, body)?;
        }

        if let Some(body) = stack_map {
            attributes.add(&mut pool_ref, "StackMapTable", body)?;
        }
        for attribute in &self.attributes {
            attributes.add(&mut pool_ref, &attribute.name, attribute.data.clone())?;
        }

        let mut out = Vec::with_capacity(self.code.len() + 32);
        push_be(&mut out, max_stack);
        push_be(&mut out, max_locals);
        #[allow(clippy::cast_possible_truncation)]
        push_be(&mut out, self.code.len() as u32);
        out.extend_from_slice(&self.code);
        push_be(&mut out, table_length(handlers.len(), &method)?);
        for handler in &handlers {
            let catch_type = match &handler.catch_type {
                Some(name) => pool_ref.add_class(name)?,
                None => 0,
            };
            #[allow(clippy::cast_possible_truncation)]
            for value in [
                handler.start as u16,
                handler.end as u16,
                handler.handler as u16,
                catch_type,
            ] {
                push_be(&mut out, value);
            }
        }
        attributes.write(&mut out)?;
        Ok(out)
    }

    /// Replace unreachable ranges with `nop ... athrow` and cut them out of the handlers.
    fn erase_dead_code(&mut self, dead: &[(usize, usize)], handlers: Vec<Handler>) -> Vec<Handler> {
        if dead.is_empty() {
            return handlers;
        }

        for (start, end) in dead {
            self.code[*start..*end].fill(NOP);
            self.code[*end - 1] = ATHROW;
        }

        let mut remaining = handlers;
        for (dead_start, dead_end) in dead {
            remaining = remaining
                .into_iter()
                .flat_map(|handler| {
                    if handler.end <= *dead_start || handler.start >= *dead_end {
                        return vec![handler];
                    }
                    let mut pieces = Vec::with_capacity(2);
                    if handler.start < *dead_start {
                        pieces.push(Handler {
                            end: *dead_start,
                            ..handler.clone()
                        });
                    }
                    if *dead_end < handler.end {
                        pieces.push(Handler {
                            start: *dead_end,
                            ..handler
                        });
                    }
                    pieces
                })
                .collect();
        }
        remaining
    }

    fn computed_stack_map(
        &self,
        analysis: &frames::Analysis,
        pool: &RefCell<ConstantPool>,
        method: &str,
    ) -> Result<Option<Vec<u8>>> {
        let mut states = analysis
            .frames
            .iter()
            .map(|(offset, state)| (*offset, state.frame_locals(), state.frame_stack()))
            .collect::<Vec<_>>();
        for (start, _) in &analysis.dead {
            states.push((
                *start,
                Vec::new(),
                vec![AbstractType::Object("java/lang/Throwable".to_string())],
            ));
        }
        if states.is_empty() {
            return Ok(None);
        }
        states.sort_by_key(|(offset, ..)| *offset);

        let mut pool = pool.borrow_mut();
        let mut previous = abstract_entries(&analysis.initial.frame_locals(), &mut pool)?;
        let mut encoded = Vec::with_capacity(states.len());
        for (offset, locals, stack) in states {
            let locals = abstract_entries(&locals, &mut pool)?;
            let stack = abstract_entries(&stack, &mut pool)?;
            encoded.push((offset, frames::compress(&previous, locals.clone(), stack)));
            previous = locals;
        }
        frames::write_stack_map(&encoded, method).map(Some)
    }

    fn explicit_stack_map(
        &self,
        pool: &RefCell<ConstantPool>,
        method: &str,
    ) -> Result<Option<Vec<u8>>> {
        if self.frames.is_empty() {
            return Ok(None);
        }

        let mut pool = pool.borrow_mut();
        let mut entries = |types: &[VerificationType]| -> Result<Vec<Entry>> {
            types
                .iter()
                .map(|value| self.verification_entry(value, &mut pool, method))
                .collect()
        };

        let mut encoded = Vec::with_capacity(self.frames.len());
        for (offset, frame) in &self.frames {
            let frame = match frame {
                Frame::Same => EncodedFrame::Same,
                Frame::SameLocals1StackItem(value) => EncodedFrame::SameLocals1(
                    entries(std::slice::from_ref(value))?
                        .pop()
                        .unwrap_or(Entry::Top),
                ),
                Frame::Chop(count) => EncodedFrame::Chop(*count),
                Frame::Append(locals) => EncodedFrame::Append(entries(locals)?),
                Frame::Full { locals, stack } => {
                    EncodedFrame::Full(entries(locals)?, entries(stack)?)
                }
            };
            encoded.push((*offset, frame));
        }
        frames::write_stack_map(&encoded, method).map(Some)
    }

    fn verification_entry(
        &self,
        value: &VerificationType,
        pool: &mut ConstantPool,
        method: &str,
    ) -> Result<Entry> {
        Ok(match value {
            VerificationType::Top => Entry::Top,
            VerificationType::Integer => Entry::Integer,
            VerificationType::Float => Entry::Float,
            VerificationType::Double => Entry::Double,
            VerificationType::Long => Entry::Long,
            VerificationType::Null => Entry::Null,
            VerificationType::UninitializedThis => Entry::UninitializedThis,
            VerificationType::Object(name) => Entry::Object(pool.add_class(name)?),
            VerificationType::Uninitialized(label) => {
                let Some(offset) = self.offset_of(*label) else {
                    return Err(Error::UnresolvedLabel {
                        method: method.to_string(),
                    });
                };
                #[allow(clippy::cast_possible_truncation)]
                Entry::Uninitialized(offset as u16)
            }
        })
    }
}

fn abstract_entries(types: &[AbstractType], pool: &mut ConstantPool) -> Result<Vec<Entry>> {
    types
        .iter()
        .map(|value| {
            Ok(match value {
                AbstractType::Top | AbstractType::ReturnAddress => Entry::Top,
                AbstractType::Int => Entry::Integer,
                AbstractType::Float => Entry::Float,
                AbstractType::Long => Entry::Long,
                AbstractType::Double => Entry::Double,
                AbstractType::Null => Entry::Null,
                AbstractType::UninitializedThis => Entry::UninitializedThis,
                #[allow(clippy::cast_possible_truncation)]
                AbstractType::Uninitialized(offset) => Entry::Uninitialized(*offset as u16),
                AbstractType::Object(name) => Entry::Object(pool.add_class(name)?),
            })
        })
        .collect()
}

fn table_length(length: usize, method: &str) -> Result<u16> {
    u16::try_from(length).map_err(|_| Error::Error(format!("{method}: table with {length} entries")))
}

/// The instructions that return the default value of `return_type`.
pub(crate) fn default_exit(return_type: &ReturnType) -> Vec<Insn> {
    let (constant, exit) = match return_type {
        ReturnType::Void => return vec![Insn::Simple(RETURN)],
        ReturnType::Value(FieldType::Long) => (LCONST_0, LRETURN),
        ReturnType::Value(FieldType::Float) => (FCONST_0, FRETURN),
        ReturnType::Value(FieldType::Double) => (DCONST_0, DRETURN),
        ReturnType::Value(FieldType::Object(_) | FieldType::Array(_)) => (ACONST_NULL, ARETURN),
        ReturnType::Value(_) => (ICONST_0, IRETURN),
    };
    vec![Insn::Simple(constant), Insn::Simple(exit)]
}
