//! Widening an `isinst` type test to a second type.
//!
//! The rule looks for a field type test in either of two compiled shapes and adds an
//! equivalent test for the extra type next to it:
//!
//! ```text
//! A:  brtrue.s L                      B:  ldarg.0
//!     ldarg.0                             ldfld F
//!     ldfld F                             isinst Anchor
//!     isinst Anchor                       brfalse.s X
//!                                         <next>
//! ```
//!
//! In shape A the test is one arm of an `||` chain that jumps to `L` on success, so
//! `ldarg.0; ldfld F; isinst Extra; brtrue.s L` is inserted after the `brtrue.s`. In shape B a
//! failed test jumps away, so `ldfld F; isinst Extra; brtrue.s <next>; ldarg.0` is inserted
//! after the leading `ldarg.0`: an `Extra` instance skips the original test and continues on
//! its success path.

use crate::{
    assembly::{OpCode, Operand},
    patching::{
        cursor::ILCursor,
        matchers::{self, Matcher},
        rule::{ILContext, PatchRule, RuleScope},
    },
    Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    OrChain,
    Guard,
}

/// Adds a test for argument 1 wherever a field is tested against argument 0.
///
/// Every occurrence in the method is patched; finding none is
/// [`Error::PatternNotFound`]. Iterator methods are patched in their state machine.
pub struct PatchTypeCheck;

impl PatchRule for PatchTypeCheck {
    fn name(&self) -> &'static str {
        "PatchTypeCheck"
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Il
    }

    fn apply_il(&self, ctx: &mut ILContext<'_>) -> Result<()> {
        let request = ctx.request;
        let anchor = request.string_arg(0)?;
        let extra = request.string_arg(1)?;

        let brtrue = matchers::opcode(OpCode::BrtrueS);
        let brfalse = matchers::opcode(OpCode::BrfalseS);
        let this = matchers::opcode(OpCode::Ldarg0);
        let field = matchers::ldfld_any();
        let test = matchers::isinst(anchor);
        let or_chain: [Matcher<'_>; 4] = [&brtrue, &this, &field, &test];
        let guard: [Matcher<'_>; 4] = [&this, &field, &test, &brfalse];

        let mut cursor = ctx.cursor();
        let mut patched = 0;
        loop {
            let from = cursor.index();
            let at_or_chain = cursor.try_goto_next(&or_chain).then(|| cursor.index());
            cursor.goto_index(from)?;
            let at_guard = cursor.try_goto_next(&guard).then(|| cursor.index());

            let (at, shape) = match (at_or_chain, at_guard) {
                (Some(a), Some(b)) if a <= b => (a, Shape::OrChain),
                (Some(a), None) => (a, Shape::OrChain),
                (_, Some(b)) => (b, Shape::Guard),
                (None, None) => break,
            };

            log::debug!("{}: {:?} type test at {}", cursor.method(), shape, at);
            match shape {
                Shape::OrChain => insert_or_arm(&mut cursor, at, extra)?,
                Shape::Guard => insert_guard_bypass(&mut cursor, at, extra)?,
            }
            patched += 1;
        }

        if patched == 0 {
            return Err(Error::PatternNotFound {
                method: cursor.method().to_string(),
                pattern: format!("isinst {anchor} on a field of this"),
            });
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Extends isinst checks on a field to a second type"
    }
}

fn operand_at(cursor: &ILCursor<'_>, index: usize) -> Result<Operand> {
    cursor
        .instruction_at(index)
        .map(|instr| instr.operand.clone())
        .ok_or(Error::CursorOutOfBounds {
            index,
            len: cursor.len(),
        })
}

/// `brtrue.s L; ldarg.0; ldfld F; isinst Anchor` at `at`.
fn insert_or_arm(cursor: &mut ILCursor<'_>, at: usize, extra: &str) -> Result<()> {
    let success = operand_at(cursor, at)?;
    let field = operand_at(cursor, at + 2)?;

    cursor.goto_index(at + 1)?;
    cursor.emit(OpCode::Ldarg0, Operand::None)?;
    cursor.emit(OpCode::Ldfld, field)?;
    cursor.emit(OpCode::Isinst, Operand::Type(extra.to_string()))?;
    cursor.emit(OpCode::BrtrueS, success)?;

    // past the original ldarg.0, ldfld, isinst
    let resume = cursor.index() + 3;
    cursor.goto_index(resume)
}

/// `ldarg.0; ldfld F; isinst Anchor; brfalse.s X` at `at`.
fn insert_guard_bypass(cursor: &mut ILCursor<'_>, at: usize, extra: &str) -> Result<()> {
    let field = operand_at(cursor, at + 1)?;

    let success = cursor.define_label();
    cursor.body_mut().mark_label_at(success, at + 4)?;

    cursor.goto_index(at + 1)?;
    cursor.emit(OpCode::Ldfld, field)?;
    cursor.emit(OpCode::Isinst, Operand::Type(extra.to_string()))?;
    cursor.emit(OpCode::BrtrueS, Operand::Label(success))?;
    cursor.emit(OpCode::Ldarg0, Operand::None)?;

    // past the original ldfld, isinst, brfalse.s
    let resume = cursor.index() + 3;
    cursor.goto_index(resume)
}
