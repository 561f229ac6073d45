//! The patch engine.
//!
//! Patching is request driven. A host attaches [`PatchRequest`](crate::metadata::customattributes::PatchRequest)s
//! to the members of a [`CilModule`](crate::metadata::module::CilModule), registers the rules
//! those requests name, and hands the module to a [`PatchDispatcher`]. The dispatcher walks
//! the module in declaration order and invokes one rule per request, then runs the module
//! passes. A run either applies everything or leaves the module untouched.
//!
//! # Architecture
//!
//! - [`rule`] - The [`PatchRule`] and [`ModulePass`] traits and the contexts they receive
//! - [`dispatcher`] - [`RuleRegistry`] and [`PatchDispatcher`]
//! - [`cursor`] - [`ILCursor`], the positional editor IL rules work through
//! - [`matchers`] - Instruction predicates for cursor searches
//! - [`rules`] - The built-in rules and module passes
//! - [`config`] / [`result`] - Run configuration and the [`PatchReport`]
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::prelude::*;
//!
//! let mut module = CilModule::new("Game");
//! let program = module.add_type("Game", "Program");
//! let main = module.add_method(program, MethodDef::new("Main", "System.Void"))?;
//! module.request(MemberId::Method(main), PatchRequest::new("MakeEntryPoint"))?;
//!
//! let mut dispatcher = PatchDispatcher::new(RuleRegistry::with_defaults(), PatchConfig::new());
//! dispatcher.add_pass(FixShortLongOps::new());
//!
//! let report = dispatcher.run(&mut module)?;
//! assert_eq!(module.entry_point, Some(main));
//! assert_eq!(report.rule_count(), 1);
//! # Ok::<(), cilpatch::Error>(())
//! ```

pub mod config;
pub mod cursor;
pub mod dispatcher;
pub mod matchers;
pub mod result;
pub mod rule;
pub mod rules;

pub use config::{BranchFormPolicy, PatchConfig};
pub use cursor::{CursorMark, ILCursor, MoveType};
pub use dispatcher::{PatchDispatcher, RuleRegistry};
pub use result::{AppliedRule, PatchReport};
pub use rule::{ConflictLedger, ILContext, MemberContext, ModulePass, PatchRule, RuleScope};
