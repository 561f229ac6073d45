//! Editable CIL method bodies.
//!
//! A [`MethodBody`] is an arena of [`Instruction`]s addressed by [`InstrId`], plus an ordered
//! list of ids that defines the executable order. Branches never point at instructions
//! directly; they reference a [`LabelId`], and the label table binds each label to an
//! instruction identity. Exception regions anchor on identities as well.
//!
//! This gives the editing model its key property: inserting or removing an instruction is a
//! change to `order` and, for removals, a rebind of the labels and regions that anchored on the
//! removed instruction. Nothing else has to be rewritten, and byte offsets are only computed
//! when they are needed (branch form fitting, display).
//!
//! # Finalization
//!
//! [`MethodBody::finalize`] is the gate every edited body passes before it is handed back to the
//! host. It checks that
//! - every label referenced by a branch is bound to a live instruction,
//! - every exception region boundary is live and the regions are well ordered,
//!
//! and then brings the short/long branch forms in line with the chosen [`BranchFormPolicy`].

use std::fmt;

use crate::{
    assembly::{InstrId, Instruction, LabelId, Operand},
    metadata::method::exceptions::ExceptionHandler,
    Error, Result,
};

/// Binding state of one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelState {
    /// Created, not yet marked
    Unbound,
    /// Bound to a live instruction
    Bound(InstrId),
    /// Marked at the append point; binds to the next appended instruction
    PendingEnd,
}

/// How finalization treats short branch forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchFormPolicy {
    /// Rewrite every short branch to its long form
    Widen,
    /// Keep short forms where the displacement fits into an `i8`, widen the rest
    #[default]
    Fit,
}

/// An editable method body.
///
/// # Examples
///
/// ```rust
/// use cilpatch::assembly::{Instruction, OpCode, Operand};
/// use cilpatch::metadata::method::MethodBody;
///
/// let mut body = MethodBody::new();
/// let exit = body.define_label();
/// body.push(Instruction::new(OpCode::BrS, Operand::Label(exit))?);
/// body.push(Instruction::simple(OpCode::Nop)?);
/// body.mark_label_at(exit, body.len())?;
/// body.push(Instruction::simple(OpCode::Ret)?);
///
/// assert_eq!(body.len(), 3);
/// body.finalize("Demo::Run", Default::default(), 16)?;
/// # Ok::<(), cilpatch::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    instructions: Vec<Instruction>,
    order: Vec<InstrId>,
    labels: Vec<LabelState>,
    /// Exception handling regions, anchored on instruction identities
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Zero-initialize locals on entry
    pub init_locals: bool,
    /// Local variable types, by full type name
    pub locals: Vec<String>,
}

impl Default for MethodBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodBody {
    /// Creates an empty body.
    #[must_use]
    pub fn new() -> Self {
        MethodBody {
            instructions: Vec::new(),
            order: Vec::new(),
            labels: Vec::new(),
            exception_handlers: Vec::new(),
            max_stack: 8,
            init_locals: true,
            locals: Vec::new(),
        }
    }

    /// Creates a body from a straight-line list of instructions.
    #[must_use]
    pub fn from_instructions(instructions: Vec<Instruction>) -> Self {
        let mut body = Self::new();
        for instr in instructions {
            body.push(instr);
        }
        body
    }

    /// Number of live instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if the body has no live instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Live instruction ids in executable order.
    #[must_use]
    pub fn ids(&self) -> &[InstrId] {
        &self.order
    }

    /// Live instructions in executable order.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.order
            .iter()
            .map(move |id| &self.instructions[id.0 as usize])
    }

    /// Id of the instruction at `index`.
    #[must_use]
    pub fn id_at(&self, index: usize) -> Option<InstrId> {
        self.order.get(index).copied()
    }

    /// Position of a live instruction in executable order.
    #[must_use]
    pub fn index_of(&self, id: InstrId) -> Option<usize> {
        self.order.iter().position(|candidate| *candidate == id)
    }

    /// Returns `true` if `id` names a live instruction.
    #[must_use]
    pub fn contains(&self, id: InstrId) -> bool {
        self.index_of(id).is_some()
    }

    /// Instruction by id. Removed instructions are not returned.
    #[must_use]
    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        if self.contains(id) {
            self.instructions.get(id.0 as usize)
        } else {
            None
        }
    }

    /// Mutable instruction by id. Removed instructions are not returned.
    pub fn get_mut(&mut self, id: InstrId) -> Option<&mut Instruction> {
        if self.contains(id) {
            self.instructions.get_mut(id.0 as usize)
        } else {
            None
        }
    }

    /// Instruction at a position in executable order.
    #[must_use]
    pub fn instruction_at(&self, index: usize) -> Option<&Instruction> {
        let id = self.order.get(index)?;
        self.instructions.get(id.0 as usize)
    }

    /// Mutable instruction at a position in executable order.
    pub fn instruction_at_mut(&mut self, index: usize) -> Option<&mut Instruction> {
        let id = *self.order.get(index)?;
        self.instructions.get_mut(id.0 as usize)
    }

    /// Appends an instruction and binds every pending label to it.
    pub fn push(&mut self, instr: Instruction) -> InstrId {
        let id = self.alloc(instr);
        self.order.push(id);
        self.bind_pending(id);
        id
    }

    /// Inserts an instruction at `index` (`index == len` appends).
    ///
    /// Labels already bound to the instruction that used to sit at `index` stay with it, so
    /// existing jumps skip the inserted code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CursorOutOfBounds`] if `index > len`.
    pub fn insert_at(&mut self, index: usize, instr: Instruction) -> Result<InstrId> {
        let len = self.order.len();
        if index > len {
            return Err(Error::CursorOutOfBounds { index, len });
        }

        let id = self.alloc(instr);
        self.order.insert(index, id);
        if index == len {
            self.bind_pending(id);
        }
        Ok(id)
    }

    /// Removes the instruction at `index`.
    ///
    /// Labels bound to the removed instruction move to the next remaining instruction, or
    /// become [`LabelState::PendingEnd`] when the tail is removed.
    ///
    /// An instruction that anchors an exception region boundary can only be removed with
    /// `reanchor` set; the boundary then moves to the next remaining instruction. A start
    /// boundary cannot move past the end of the method.
    ///
    /// # Errors
    ///
    /// - [`Error::CursorOutOfBounds`] if there is no instruction at `index`
    /// - [`Error::InvalidRemoval`] if a region boundary would be lost
    pub fn remove_at(&mut self, index: usize, reanchor: bool, method: &str) -> Result<Instruction> {
        let Some(&id) = self.order.get(index) else {
            return Err(Error::CursorOutOfBounds {
                index,
                len: self.order.len(),
            });
        };
        let next = self.order.get(index + 1).copied();

        for (region, handler) in self.exception_handlers.iter().enumerate() {
            let boundaries = handler.boundaries_at(id);
            if boundaries.is_empty() {
                continue;
            }

            let starts_at_tail = next.is_none()
                && (handler.try_start == id
                    || handler.handler_start == id
                    || handler.filter_start == Some(id));
            if !reanchor || starts_at_tail {
                return Err(Error::InvalidRemoval {
                    method: method.to_string(),
                    index,
                    reason: format!(
                        "{id} anchors {boundaries:?} of exception region {region}"
                    ),
                });
            }
        }

        for handler in &mut self.exception_handlers {
            handler.reanchor(id, next);
        }

        let rebound = match next {
            Some(next) => LabelState::Bound(next),
            None => LabelState::PendingEnd,
        };
        for state in &mut self.labels {
            if *state == LabelState::Bound(id) {
                *state = rebound;
            }
        }

        self.order.remove(index);
        Ok(self.instructions[id.0 as usize].clone())
    }

    /// Creates a new unbound label.
    pub fn define_label(&mut self) -> LabelId {
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(LabelState::Unbound);
        id
    }

    /// Number of labels defined on this body.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Binding state of a label.
    #[must_use]
    pub fn label_state(&self, label: LabelId) -> Option<LabelState> {
        self.labels.get(label.0 as usize).copied()
    }

    /// Instruction a label is bound to, if it is bound to a live instruction.
    #[must_use]
    pub fn label_target(&self, label: LabelId) -> Option<InstrId> {
        match self.label_state(label)? {
            LabelState::Bound(id) if self.contains(id) => Some(id),
            _ => None,
        }
    }

    /// Binds a label to a live instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the label is unknown or `id` is not live.
    pub fn bind_label(&mut self, label: LabelId, id: InstrId) -> Result<()> {
        if !self.contains(id) {
            return Err(malformed_error!("Cannot bind {} to removed instruction {}", label, id));
        }
        let Some(state) = self.labels.get_mut(label.0 as usize) else {
            return Err(malformed_error!("Unknown label {}", label));
        };
        *state = LabelState::Bound(id);
        Ok(())
    }

    /// Binds a label to the instruction at `index`; `index == len` leaves it pending until the
    /// next append.
    ///
    /// # Errors
    ///
    /// - [`Error::CursorOutOfBounds`] if `index > len`
    /// - [`Error::Malformed`] if the label is unknown
    pub fn mark_label_at(&mut self, label: LabelId, index: usize) -> Result<()> {
        let len = self.order.len();
        if index > len {
            return Err(Error::CursorOutOfBounds { index, len });
        }
        match self.order.get(index).copied() {
            Some(id) => self.bind_label(label, id),
            None => {
                let Some(state) = self.labels.get_mut(label.0 as usize) else {
                    return Err(malformed_error!("Unknown label {}", label));
                };
                *state = LabelState::PendingEnd;
                Ok(())
            }
        }
    }

    /// Every label currently bound to `id`.
    #[must_use]
    pub fn labels_targeting(&self, id: InstrId) -> Vec<LabelId> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, state)| **state == LabelState::Bound(id))
            .map(|(label, _)| LabelId(label as u32))
            .collect()
    }

    /// Labels that are still waiting for the next appended instruction.
    #[must_use]
    pub fn pending_labels(&self) -> Vec<LabelId> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, state)| **state == LabelState::PendingEnd)
            .map(|(label, _)| LabelId(label as u32))
            .collect()
    }

    /// Moves every label bound to `from` onto `to`. Returns the number of labels moved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if `to` is not a live instruction.
    pub fn retarget_labels(&mut self, from: InstrId, to: InstrId) -> Result<usize> {
        if !self.contains(to) {
            return Err(malformed_error!("Cannot retarget labels to removed instruction {}", to));
        }
        let mut moved = 0;
        for state in &mut self.labels {
            if *state == LabelState::Bound(from) {
                *state = LabelState::Bound(to);
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Byte offsets of all live instructions, in executable order.
    #[must_use]
    pub fn compute_offsets(&self) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(self.order.len());
        let mut offset = 0u32;
        for instr in self.iter() {
            offsets.push(offset);
            offset += instr.size() as u32;
        }
        offsets
    }

    /// Byte offset of a live instruction.
    #[must_use]
    pub fn offset_of(&self, id: InstrId) -> Option<u32> {
        let index = self.index_of(id)?;
        self.compute_offsets().get(index).copied()
    }

    /// Total encoded size of the instruction stream.
    #[must_use]
    pub fn code_size(&self) -> u32 {
        self.iter().map(|instr| instr.size() as u32).sum()
    }

    /// Rewrites every short branch to its long form. Returns the number of rewritten branches.
    pub fn widen_branches(&mut self) -> usize {
        let mut widened = 0;
        for id in &self.order {
            let instr = &mut self.instructions[id.0 as usize];
            if instr.opcode.is_short_branch() {
                instr.opcode = instr.opcode.long_form();
                widened += 1;
            }
        }
        widened
    }

    /// Widens every short branch whose displacement does not fit into an `i8`.
    ///
    /// Widening a branch grows the code between other branches and their targets, so this
    /// repeats until no branch changes. Returns the number of widened branches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if no fixpoint is reached within `max_iterations` passes.
    pub fn fit_branch_forms(&mut self, max_iterations: usize) -> Result<usize> {
        let mut total = 0;
        for _ in 0..max_iterations {
            let offsets = self.compute_offsets();
            let mut widen = Vec::new();

            for (index, id) in self.order.iter().enumerate() {
                let instr = &self.instructions[id.0 as usize];
                if !instr.opcode.is_short_branch() {
                    continue;
                }
                let Some(target) = instr.operand.as_label().and_then(|l| self.label_target(l))
                else {
                    continue;
                };
                let Some(target_index) = self.index_of(target) else {
                    continue;
                };

                let from = i64::from(offsets[index]) + instr.size() as i64;
                let displacement = i64::from(offsets[target_index]) - from;
                if i8::try_from(displacement).is_err() {
                    widen.push(*id);
                }
            }

            if widen.is_empty() {
                return Ok(total);
            }
            for id in widen {
                let instr = &mut self.instructions[id.0 as usize];
                instr.opcode = instr.opcode.long_form();
                total += 1;
            }
        }

        Err(malformed_error!(
            "Branch form fitting did not converge after {} passes",
            max_iterations
        ))
    }

    /// Checks label and exception region integrity.
    ///
    /// # Errors
    ///
    /// - [`Error::UnboundLabelAtFinalization`] if a branch references a label that is not bound
    ///   to a live instruction
    /// - [`Error::Malformed`] if an exception region boundary is dead or out of order
    pub fn validate(&self, method: &str) -> Result<()> {
        for instr in self.iter() {
            for label in instr.operand.labels() {
                if self.label_target(label).is_none() {
                    return Err(Error::UnboundLabelAtFinalization {
                        method: method.to_string(),
                        label,
                    });
                }
            }
        }

        let len = self.order.len();
        let position = |id: Option<InstrId>| -> Option<usize> {
            match id {
                Some(id) => self.index_of(id),
                None => Some(len),
            }
        };

        for (region, handler) in self.exception_handlers.iter().enumerate() {
            let try_start = position(Some(handler.try_start));
            let try_end = position(handler.try_end);
            let handler_start = position(Some(handler.handler_start));
            let handler_end = position(handler.handler_end);

            let (Some(try_start), Some(try_end), Some(handler_start), Some(handler_end)) =
                (try_start, try_end, handler_start, handler_end)
            else {
                return Err(malformed_error!(
                    "Exception region {} of {} anchors on a removed instruction",
                    region,
                    method
                ));
            };

            if try_start >= try_end || handler_start >= handler_end {
                return Err(malformed_error!(
                    "Exception region {} of {} is empty or inverted",
                    region,
                    method
                ));
            }

            if let Some(filter) = handler.filter_start {
                match self.index_of(filter) {
                    Some(filter) if filter < handler_start => {}
                    _ => {
                        return Err(malformed_error!(
                            "Filter of exception region {} of {} does not precede its handler",
                            region,
                            method
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Validates the body and normalizes its branch forms.
    ///
    /// Returns the number of branches that were widened.
    ///
    /// # Errors
    ///
    /// Any error of [`MethodBody::validate`] or [`MethodBody::fit_branch_forms`].
    pub fn finalize(
        &mut self,
        method: &str,
        policy: BranchFormPolicy,
        max_iterations: usize,
    ) -> Result<usize> {
        self.validate(method)?;
        match policy {
            BranchFormPolicy::Widen => Ok(self.widen_branches()),
            BranchFormPolicy::Fit => self.fit_branch_forms(max_iterations),
        }
    }

    fn alloc(&mut self, instr: Instruction) -> InstrId {
        let id = InstrId(self.instructions.len() as u32);
        self.instructions.push(instr);
        id
    }

    fn bind_pending(&mut self, id: InstrId) {
        for state in &mut self.labels {
            if *state == LabelState::PendingEnd {
                *state = LabelState::Bound(id);
            }
        }
    }
}

impl fmt::Display for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let offsets = self.compute_offsets();
        for (index, id) in self.order.iter().enumerate() {
            for label in self.labels_targeting(*id) {
                writeln!(f, "{label}:")?;
            }
            let instr = &self.instructions[id.0 as usize];
            match &instr.operand {
                Operand::None => writeln!(f, "  IL_{:04x}: {}", offsets[index], instr.opcode)?,
                _ => writeln!(f, "  IL_{:04x}: {}", offsets[index], instr)?,
            }
        }
        for label in self.pending_labels() {
            writeln!(f, "{label}:")?;
        }
        Ok(())
    }
}
