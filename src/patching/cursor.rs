//! Instruction cursor over one editable method body.
//!
//! [`ILCursor`] is the API patch rules use to read and mutate code. It holds the only mutable
//! borrow of a [`MethodBody`] for its lifetime and a position in `[0, len]`, where `len` is the
//! append point. The instruction *at* the position is called `next`, the one before it `prev`.
//!
//! # Searching
//!
//! Searches match a contiguous *window*: predicate `i` must accept the instruction at
//! `start + i`. Forward searches consider window starts from the current position on, backward
//! searches consider starts before it. The `goto_*` family moves to the first match and fails
//! with [`Error::PatternNotFound`]; `try_goto_*` returns `false` instead. The `find_*` family
//! returns every match as a [`CursorMark`] without moving.
//!
//! # Labels
//!
//! Labels attach to the instruction at the cursor. Inserting at a position whose instruction
//! has incoming labels leaves those labels where they are by default, so existing jumps skip
//! the inserted code. After [`ILCursor::move_after_labels`] the inserted code takes the labels
//! over instead and every incoming edge runs through it.
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::assembly::{Instruction, OpCode, Operand};
//! use cilpatch::metadata::method::MethodBody;
//! use cilpatch::patching::{cursor::ILCursor, matchers};
//!
//! let mut body = MethodBody::from_instructions(vec![
//!     Instruction::simple(OpCode::Ldarg0)?,
//!     Instruction::simple(OpCode::Pop)?,
//!     Instruction::simple(OpCode::Ret)?,
//! ]);
//!
//! let mut cursor = ILCursor::new(&mut body, "Demo::Run");
//! cursor.goto_next(&[&matchers::opcode(OpCode::Pop)])?;
//! cursor.remove()?;
//! cursor.emit(OpCode::Nop, Operand::None)?;
//! assert_eq!(cursor.index(), 2);
//! # Ok::<(), cilpatch::Error>(())
//! ```

use crate::{
    assembly::{InstrId, Instruction, LabelId, OpCode, Operand},
    metadata::method::{LabelState, MethodBody},
    patching::matchers::Matcher,
    Error, Result,
};

/// Where a successful `goto` leaves the cursor relative to the matched window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveType {
    /// At the first instruction of the window; inserts are skipped by jumps into it
    #[default]
    Before,
    /// Right after the last instruction of the window
    After,
    /// At the first instruction of the window; inserts take over its incoming labels
    AfterLabel,
}

/// A position remembered by instruction identity.
///
/// Marks survive edits elsewhere in the body: re-entering a mark finds the anchored
/// instruction wherever it ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorMark {
    anchor: Option<InstrId>,
}

impl CursorMark {
    /// The anchored instruction; `None` for the append point.
    #[must_use]
    pub fn anchor(&self) -> Option<InstrId> {
        self.anchor
    }
}

/// A movable position inside one method body.
pub struct ILCursor<'a> {
    body: &'a mut MethodBody,
    method: String,
    index: usize,
    after_labels: bool,
}

impl<'a> ILCursor<'a> {
    /// Creates a cursor at index 0. `method` is the qualified method name used in errors.
    pub fn new(body: &'a mut MethodBody, method: impl Into<String>) -> Self {
        ILCursor {
            body,
            method: method.into(),
            index: 0,
            after_labels: false,
        }
    }

    /// Qualified name of the method being edited.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The underlying body.
    #[must_use]
    pub fn body(&self) -> &MethodBody {
        self.body
    }

    /// The underlying body, for edits the cursor does not model (exception regions, explicit
    /// label binding).
    pub fn body_mut(&mut self) -> &mut MethodBody {
        self.body
    }

    /// Current position.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of live instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Returns `true` if the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// The instruction at the cursor.
    #[must_use]
    pub fn next(&self) -> Option<&Instruction> {
        self.body.instruction_at(self.index)
    }

    /// The instruction before the cursor.
    #[must_use]
    pub fn prev(&self) -> Option<&Instruction> {
        self.index
            .checked_sub(1)
            .and_then(|i| self.body.instruction_at(i))
    }

    /// Mutable instruction at the cursor.
    pub fn next_mut(&mut self) -> Option<&mut Instruction> {
        self.body.instruction_at_mut(self.index)
    }

    /// Mutable instruction before the cursor.
    pub fn prev_mut(&mut self) -> Option<&mut Instruction> {
        let index = self.index.checked_sub(1)?;
        self.body.instruction_at_mut(index)
    }

    /// Instruction at an arbitrary position.
    #[must_use]
    pub fn instruction_at(&self, index: usize) -> Option<&Instruction> {
        self.body.instruction_at(index)
    }

    /// The current position as a mark.
    #[must_use]
    pub fn mark(&self) -> CursorMark {
        CursorMark {
            anchor: self.body.id_at(self.index),
        }
    }

    /// Moves to an absolute position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CursorOutOfBounds`] if `index > len`.
    pub fn goto_index(&mut self, index: usize) -> Result<()> {
        let len = self.body.len();
        if index > len {
            return Err(Error::CursorOutOfBounds { index, len });
        }
        self.set_position(index, false);
        Ok(())
    }

    /// Moves to a previously taken mark.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the anchored instruction was removed.
    pub fn goto_mark(&mut self, mark: CursorMark) -> Result<()> {
        let index = match mark.anchor {
            Some(id) => self.body.index_of(id).ok_or_else(|| {
                malformed_error!("Mark anchors removed instruction {} in {}", id, self.method)
            })?,
            None => self.body.len(),
        };
        self.set_position(index, false);
        Ok(())
    }

    /// Moves to the instruction a label is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnboundLabel`] if the label has not been marked.
    pub fn goto_label(&mut self, label: LabelId) -> Result<()> {
        let index = match self.body.label_state(label) {
            Some(LabelState::Bound(id)) => self.body.index_of(id),
            Some(LabelState::PendingEnd) => Some(self.body.len()),
            _ => None,
        };
        let Some(index) = index else {
            return Err(Error::UnboundLabel(label));
        };
        self.set_position(index, false);
        Ok(())
    }

    /// Moves to the first window at or after the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PatternNotFound`] if no window matches.
    pub fn goto_next(&mut self, predicates: &[Matcher<'_>]) -> Result<()> {
        self.goto_next_with(MoveType::Before, predicates)
    }

    /// Moves to the first window at or after the cursor, placing the cursor per `move_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PatternNotFound`] if no window matches.
    pub fn goto_next_with(&mut self, move_type: MoveType, predicates: &[Matcher<'_>]) -> Result<()> {
        if self.try_goto_next_with(move_type, predicates) {
            Ok(())
        } else {
            Err(self.not_found("next", predicates.len()))
        }
    }

    /// Like [`ILCursor::goto_next`], returning whether a window was found.
    pub fn try_goto_next(&mut self, predicates: &[Matcher<'_>]) -> bool {
        self.try_goto_next_with(MoveType::Before, predicates)
    }

    /// Like [`ILCursor::goto_next_with`], returning whether a window was found.
    pub fn try_goto_next_with(&mut self, move_type: MoveType, predicates: &[Matcher<'_>]) -> bool {
        match self.search_forward(self.index, predicates) {
            Some(start) => {
                self.land(start, move_type, predicates.len());
                true
            }
            None => false,
        }
    }

    /// Moves to the nearest window starting before the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PatternNotFound`] if no window matches.
    pub fn goto_prev(&mut self, predicates: &[Matcher<'_>]) -> Result<()> {
        self.goto_prev_with(MoveType::Before, predicates)
    }

    /// Moves to the nearest window starting before the cursor, placing the cursor per
    /// `move_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PatternNotFound`] if no window matches.
    pub fn goto_prev_with(&mut self, move_type: MoveType, predicates: &[Matcher<'_>]) -> Result<()> {
        if self.try_goto_prev_with(move_type, predicates) {
            Ok(())
        } else {
            Err(self.not_found("previous", predicates.len()))
        }
    }

    /// Like [`ILCursor::goto_prev`], returning whether a window was found.
    pub fn try_goto_prev(&mut self, predicates: &[Matcher<'_>]) -> bool {
        self.try_goto_prev_with(MoveType::Before, predicates)
    }

    /// Like [`ILCursor::goto_prev_with`], returning whether a window was found.
    pub fn try_goto_prev_with(&mut self, move_type: MoveType, predicates: &[Matcher<'_>]) -> bool {
        let found = self.search_backward(self.index, predicates).next();
        match found {
            Some(start) => {
                self.land(start, move_type, predicates.len());
                true
            }
            None => false,
        }
    }

    /// Every window starting at or after the cursor, in order, without moving.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PatternNotFound`] if no window matches.
    pub fn find_next(&self, predicates: &[Matcher<'_>]) -> Result<Vec<CursorMark>> {
        let marks = self.try_find_next(predicates);
        if marks.is_empty() {
            Err(self.not_found("next", predicates.len()))
        } else {
            Ok(marks)
        }
    }

    /// Every window starting at or after the cursor; empty if none matches.
    #[must_use]
    pub fn try_find_next(&self, predicates: &[Matcher<'_>]) -> Vec<CursorMark> {
        let mut marks = Vec::new();
        let mut from = self.index;
        while let Some(start) = self.search_forward(from, predicates) {
            marks.push(CursorMark {
                anchor: self.body.id_at(start),
            });
            from = start + 1;
        }
        marks
    }

    /// Every window starting before the cursor, nearest first, without moving.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PatternNotFound`] if no window matches.
    pub fn find_prev(&self, predicates: &[Matcher<'_>]) -> Result<Vec<CursorMark>> {
        let marks = self.try_find_prev(predicates);
        if marks.is_empty() {
            Err(self.not_found("previous", predicates.len()))
        } else {
            Ok(marks)
        }
    }

    /// Every window starting before the cursor, nearest first; empty if none matches.
    #[must_use]
    pub fn try_find_prev(&self, predicates: &[Matcher<'_>]) -> Vec<CursorMark> {
        self.search_backward(self.index, predicates)
            .map(|start| CursorMark {
                anchor: self.body.id_at(start),
            })
            .collect()
    }

    /// Inserts at the cursor without advancing; the cursor points at the new instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CursorOutOfBounds`] if the cursor is past the end.
    pub fn insert(&mut self, instr: Instruction) -> Result<InstrId> {
        let displaced = self.body.id_at(self.index);
        let id = self.body.insert_at(self.index, instr)?;
        if self.after_labels {
            if let Some(displaced) = displaced {
                self.body.retarget_labels(displaced, id)?;
            }
        }
        Ok(id)
    }

    /// Inserts at the cursor and moves past the new instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CursorOutOfBounds`] if the cursor is past the end.
    pub fn insert_and_advance(&mut self, instr: Instruction) -> Result<InstrId> {
        let id = self.insert(instr)?;
        self.index += 1;
        Ok(id)
    }

    /// Builds an instruction and inserts it with [`ILCursor::insert_and_advance`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperand`] if the operand does not fit the opcode.
    pub fn emit(&mut self, opcode: OpCode, operand: Operand) -> Result<InstrId> {
        let instr = Instruction::new(opcode, operand)?;
        self.insert_and_advance(instr)
    }

    /// Replaces opcode and operand of the instruction at the cursor, keeping its identity and
    /// therefore its incoming labels.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOperand`] if the operand does not fit the opcode
    /// - [`Error::CursorOutOfBounds`] at the append point
    pub fn replace(&mut self, opcode: OpCode, operand: Operand) -> Result<()> {
        let instr = Instruction::new(opcode, operand)?;
        let (index, len) = (self.index, self.body.len());
        let Some(next) = self.body.instruction_at_mut(index) else {
            return Err(Error::CursorOutOfBounds { index, len });
        };
        *next = instr;
        Ok(())
    }

    /// Removes the instruction at the cursor. Its incoming labels move to the following
    /// instruction.
    ///
    /// # Errors
    ///
    /// - [`Error::CursorOutOfBounds`] at the append point
    /// - [`Error::InvalidRemoval`] if the instruction anchors an exception region boundary
    pub fn remove(&mut self) -> Result<Instruction> {
        self.body.remove_at(self.index, false, &self.method)
    }

    /// Removes `count` instructions starting at the cursor. Nothing is removed if any of them
    /// cannot be.
    ///
    /// # Errors
    ///
    /// - [`Error::CursorOutOfBounds`] if fewer than `count` instructions follow the cursor
    /// - [`Error::InvalidRemoval`] if one of them anchors an exception region boundary
    pub fn remove_range(&mut self, count: usize) -> Result<()> {
        let len = self.body.len();
        let end = self
            .index
            .checked_add(count)
            .filter(|&end| end <= len)
            .ok_or(Error::CursorOutOfBounds {
                index: self.index.saturating_add(count),
                len,
            })?;

        for index in self.index..end {
            let Some(id) = self.body.id_at(index) else {
                continue;
            };
            for (region, handler) in self.body.exception_handlers.iter().enumerate() {
                let boundaries = handler.boundaries_at(id);
                if !boundaries.is_empty() {
                    return Err(Error::InvalidRemoval {
                        method: self.method.clone(),
                        index,
                        reason: format!(
                            "{id} anchors {boundaries:?} of exception region {region}"
                        ),
                    });
                }
            }
        }

        for _ in 0..count {
            self.body.remove_at(self.index, false, &self.method)?;
        }
        Ok(())
    }

    /// Removes the instruction at the cursor, moving any exception region boundary it anchors
    /// to the following instruction.
    ///
    /// # Errors
    ///
    /// - [`Error::CursorOutOfBounds`] at the append point
    /// - [`Error::InvalidRemoval`] if a region would have to start past the end of the method
    pub fn remove_reanchoring(&mut self) -> Result<Instruction> {
        self.body.remove_at(self.index, true, &self.method)
    }

    /// Creates a new unbound label.
    pub fn define_label(&mut self) -> LabelId {
        self.body.define_label()
    }

    /// Binds `label` to the instruction at the cursor (or to the next appended instruction at
    /// the append point).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the label does not belong to this body.
    pub fn mark_label(&mut self, label: LabelId) -> Result<()> {
        self.body.mark_label_at(label, self.index)
    }

    /// Defines a label and binds it to the instruction at the cursor.
    ///
    /// # Errors
    ///
    /// See [`ILCursor::mark_label`].
    pub fn mark_new_label(&mut self) -> Result<LabelId> {
        let label = self.body.define_label();
        self.mark_label(label)?;
        Ok(label)
    }

    /// Labels currently bound to the instruction at the cursor.
    #[must_use]
    pub fn incoming_labels(&self) -> Vec<LabelId> {
        match self.body.id_at(self.index) {
            Some(id) => self.body.labels_targeting(id),
            None => self.body.pending_labels(),
        }
    }

    /// Makes subsequent inserts take over the labels bound to the instruction at the cursor.
    pub fn move_after_labels(&mut self) {
        self.after_labels = true;
    }

    /// Makes subsequent inserts leave incoming labels on the instruction at the cursor.
    pub fn move_before_labels(&mut self) {
        self.after_labels = false;
    }

    /// Returns `true` while inserts take over incoming labels.
    #[must_use]
    pub fn is_after_labels(&self) -> bool {
        self.after_labels
    }

    /// Moves every label bound to `from` onto `to`. Returns the number of labels moved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if `to` is not live.
    pub fn retarget_labels(&mut self, from: InstrId, to: InstrId) -> Result<usize> {
        self.body.retarget_labels(from, to)
    }

    fn set_position(&mut self, index: usize, after_labels: bool) {
        self.index = index;
        self.after_labels = after_labels;
    }

    fn land(&mut self, start: usize, move_type: MoveType, width: usize) {
        log::trace!(
            "{}: window of {} matched at {}",
            self.method,
            width,
            start
        );
        match move_type {
            MoveType::Before => self.set_position(start, false),
            MoveType::After => self.set_position(start + width, false),
            MoveType::AfterLabel => self.set_position(start, true),
        }
    }

    fn window_matches(&self, start: usize, predicates: &[Matcher<'_>]) -> bool {
        predicates.iter().enumerate().all(|(offset, predicate)| {
            self.body
                .instruction_at(start + offset)
                .is_some_and(|instr| predicate(instr))
        })
    }

    fn search_forward(&self, from: usize, predicates: &[Matcher<'_>]) -> Option<usize> {
        let len = self.body.len();
        if predicates.len() > len {
            return None;
        }
        (from..=len - predicates.len()).find(|start| self.window_matches(*start, predicates))
    }

    fn search_backward<'s>(
        &'s self,
        before: usize,
        predicates: &'s [Matcher<'s>],
    ) -> impl Iterator<Item = usize> + 's {
        let len = self.body.len();
        let last_start = len.saturating_sub(predicates.len());
        let upper = before.min(last_start + 1);
        let fits = predicates.len() <= len;
        (0..upper)
            .rev()
            .filter(move |start| fits && self.window_matches(*start, predicates))
    }

    fn not_found(&self, direction: &str, width: usize) -> Error {
        Error::PatternNotFound {
            method: self.method.clone(),
            pattern: format!(
                "{width}-instruction window ({direction} from index {})",
                self.index
            ),
        }
    }
}
