//! The structured module graph the patch engine operates on.
//!
//! The host's loader parses the container format and builds this graph; its writer turns the
//! graph back into bytes after a run. Nothing in here touches raw bytes.
//!
//! # Key Components
//!
//! - [`module`] - [`CilModule`](module::CilModule), the arena of types, methods and fields
//! - [`typedef`] - Type definitions and their flags
//! - [`method`] - Method definitions and editable method bodies
//!   - Instruction arena, labels and exception regions
//!   - Branch form fitting and body finalization
//! - [`field`] - Field definitions and their flags
//! - [`customattributes`] - Custom attributes and patch requests
//! - [`identity`] - External assembly references and strong-name tokens
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::metadata::{
//!     customattributes::PatchRequest,
//!     method::MethodDef,
//!     module::{CilModule, MemberId},
//! };
//!
//! let mut module = CilModule::new("Game");
//! let program = module.add_type("Game", "Program");
//! let main = module.add_method(program, MethodDef::new("Main", "System.Void"))?;
//! module.request(MemberId::Method(main), PatchRequest::new("MakeEntryPoint"))?;
//!
//! assert_eq!(module.requests(MemberId::Method(main))?.len(), 1);
//! # Ok::<(), cilpatch::Error>(())
//! ```

/// Custom attributes and patch requests
pub mod customattributes;
/// Field definitions
pub mod field;
/// External references and strong-name identities
pub mod identity;
/// Method definitions and bodies
pub mod method;
/// The module index
pub mod module;
/// Type definitions
pub mod typedef;
