// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cilpatch
//!
//! An attribute-driven patch engine for .NET CIL method bodies and module metadata.
//!
//! Patches are declared as requests on the members they change. A dispatcher routes each
//! request to a named rule; rules rename members, adjust flags and entry points, or rewrite
//! method bodies through a label-preserving cursor. Module-wide passes then rewrite assembly
//! references and normalize branch forms. A run is transactional: it applies every request or
//! leaves the module exactly as it was.
//!
//! ## Features
//!
//! - **🧭 Positional IL editing** - [`patching::ILCursor`] with window searches, marks and
//!   labels that survive insertion and removal
//! - **🔗 Stable identities** - Instructions and labels are arena ids, so branches and
//!   exception regions never dangle
//! - **📋 Rule registry** - Built-in rules for entry points, interface flags, renames, opcode
//!   substitution and common IL rewrites, plus host-defined rules
//! - **🔁 State machines** - IL rules on iterator methods edit the generated `MoveNext`
//! - **📦 Reference rewriting** - Replace a family of assembly references with one
//! - **🛡️ All or nothing** - Failed runs never leave a half-patched module behind
//!
//! ## Quick Start
//!
//! ```rust
//! use cilpatch::prelude::*;
//!
//! let mut module = CilModule::new("Game");
//! let native = module.add_type("Game", "Native");
//! let clear = module.add_method(
//!     native,
//!     MethodDef::new("Clear", "System.Void").with_body(MethodBody::from_instructions(vec![
//!         Instruction::new(
//!             OpCode::Call,
//!             Operand::Member(MemberRef::method("Game.Native", "_initblk", "System.Void ()")),
//!         )?,
//!         Instruction::simple(OpCode::Ret)?,
//!     ])),
//! )?;
//! module.request(MemberId::Method(clear), PatchRequest::new("PatchInitblk"))?;
//!
//! let dispatcher = PatchDispatcher::new(RuleRegistry::with_defaults(), PatchConfig::new());
//! dispatcher.run(&mut module)?;
//!
//! let body = module.method(clear)?.body.as_ref().map(|body| body.len());
//! assert_eq!(body, Some(2));
//! # Ok::<(), cilpatch::Error>(())
//! ```
//!
//! ## Writing a rule
//!
//! ```rust
//! use cilpatch::prelude::*;
//!
//! /// Inserts a `nop` in front of every `ret`.
//! struct PadReturns;
//!
//! impl PatchRule for PadReturns {
//!     fn name(&self) -> &'static str {
//!         "PadReturns"
//!     }
//!
//!     fn scope(&self) -> RuleScope {
//!         RuleScope::Il
//!     }
//!
//!     fn apply_il(&self, ctx: &mut ILContext<'_>) -> Result<()> {
//!         let ret = matchers::opcode(OpCode::Ret);
//!         let mut cursor = ctx.cursor();
//!         while cursor.try_goto_next(&[&ret]) {
//!             cursor.emit(OpCode::Nop, Operand::None)?;
//!             let past = cursor.index() + 1;
//!             cursor.goto_index(past)?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = RuleRegistry::with_defaults();
//! registry.register(std::sync::Arc::new(PadReturns));
//! assert!(registry.contains("PadReturns"));
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`] with [`Error`]. Errors raised inside a rule
//! reach the caller wrapped in [`Error::RuleFailed`]; [`Error::kind`] reports the kind of the
//! innermost error.
//!
//! ## Logging
//!
//! The crate emits through the [`log`](https://docs.rs/log) facade only: dispatched requests
//! and module passes at `debug`, cursor movement at `trace`, aborted runs at `warn`.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// ```rust
/// use cilpatch::prelude::*;
///
/// let module = CilModule::new("Game");
/// assert!(module.entry_point.is_none());
/// ```
pub mod prelude;

/// CIL opcodes and instructions
///
/// Opcode table with operand kinds and encoded sizes, and the [`assembly::Instruction`] /
/// [`assembly::Operand`] pair rules emit. Branch operands are [`assembly::LabelId`]s, member
/// operands are [`assembly::MemberRef`]s by qualified name.
pub mod assembly;

/// The module graph: types, members, bodies, attributes and references
pub mod metadata;

/// Patch dispatch, the IL cursor and the built-in rules
pub mod patching;

/// `cilpatch` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilpatch` Error type
///
/// The main error type for all operations in this crate. See [`ErrorKind`] for matching on
/// the kind of an error regardless of rule wrapping.
pub use error::{Error, ErrorKind};
