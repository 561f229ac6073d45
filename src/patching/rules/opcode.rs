//! Placeholder call substitution.
//!
//! Some opcodes have no source-level spelling. Code that needs them calls an empty
//! placeholder method instead, and these rules rewrite every such call into the bare opcode.

use crate::{
    assembly::{OpCode, Operand, OperandKind},
    patching::{
        matchers,
        rule::{ILContext, PatchRule, RuleScope},
    },
    Error, Result,
};

/// Name of the placeholder [`PatchInitblk`] replaces.
pub const INITBLK_PLACEHOLDER: &str = "_initblk";

/// Replaces every `call <placeholder>` with an operand-less opcode.
///
/// Arguments: placeholder method name, opcode mnemonic (e.g. `"initblk"`). The call keeps its
/// identity, so jumps to it now land on the opcode. No match is not an error.
pub struct SubstituteOpcode;

impl PatchRule for SubstituteOpcode {
    fn name(&self) -> &'static str {
        "SubstituteOpcode"
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Il
    }

    fn apply_il(&self, ctx: &mut ILContext<'_>) -> Result<()> {
        let request = ctx.request;
        let placeholder = request.string_arg(0)?;
        let mnemonic = request.string_arg(1)?;

        let opcode: OpCode = mnemonic.parse().map_err(|_| Error::InvalidArgument {
            rule: request.rule.clone(),
            message: format!("unknown opcode '{mnemonic}'"),
        })?;
        if opcode.operand_kind() != OperandKind::None {
            return Err(Error::InvalidArgument {
                rule: request.rule.clone(),
                message: format!("opcode '{mnemonic}' takes an operand"),
            });
        }

        substitute(ctx, placeholder, opcode).map(|_| ())
    }

    fn description(&self) -> &'static str {
        "Replaces calls to a placeholder method with an operand-less opcode"
    }
}

/// Replaces every `call _initblk` with `initblk`.
pub struct PatchInitblk;

impl PatchRule for PatchInitblk {
    fn name(&self) -> &'static str {
        "PatchInitblk"
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Il
    }

    fn apply_il(&self, ctx: &mut ILContext<'_>) -> Result<()> {
        substitute(ctx, INITBLK_PLACEHOLDER, OpCode::Initblk).map(|_| ())
    }

    fn description(&self) -> &'static str {
        "Replaces calls to _initblk with the initblk opcode"
    }
}

fn substitute(ctx: &mut ILContext<'_>, placeholder: &str, opcode: OpCode) -> Result<usize> {
    let placeholder_call = matchers::call("", placeholder);
    let mut cursor = ctx.cursor();
    let mut replaced = 0;
    while cursor.try_goto_next(&[&placeholder_call]) {
        cursor.replace(opcode, Operand::None)?;
        replaced += 1;
    }
    log::debug!(
        "{}: replaced {} call(s) to {} with {}",
        cursor.method(),
        replaced,
        placeholder,
        opcode
    );
    Ok(replaced)
}
