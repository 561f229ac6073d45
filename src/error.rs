use strum::{Display, EnumIter, IntoStaticStr};
use thiserror::Error;

use crate::assembly::{LabelId, OpCode, OperandKind};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every variant is fatal to a patch run. The dispatcher never recovers locally: a module that
/// was only partially patched is unsafe to load, so the first error aborts the run and the
/// caller's module is left exactly as it was before the run started.
///
/// # Error Categories
///
/// ## Pattern and rule errors
/// - [`Error::PatternNotFound`] - An anchor window required by a rule is absent
/// - [`Error::UnknownRule`] - A patch request names a rule that was never registered
/// - [`Error::InvalidTarget`] - A rule was attached to a member kind it cannot handle
/// - [`Error::InvalidArgument`] - A patch request carries unusable arguments
/// - [`Error::DependencyConflict`] - Two rules requested incompatible values for one member
///
/// ## Instruction stream errors
/// - [`Error::UnboundLabelAtFinalization`] - A branch references a label that was never marked
/// - [`Error::UnboundLabel`] - A cursor tried to jump to an unbound label
/// - [`Error::InvalidRemoval`] - An exception-handler boundary was removed without re-anchoring
/// - [`Error::InvalidOperand`] - An operand does not match its opcode's operand shape
/// - [`Error::CursorOutOfBounds`] - A cursor index left `[0, len]`
///
/// ## Wrapping
/// - [`Error::RuleFailed`] - Carries the failing member and rule name around the root cause
///
/// # Examples
///
/// ```rust,no_run
/// use cilpatch::{Error, ErrorKind};
///
/// fn report(err: &Error) {
///     match err {
///         Error::RuleFailed { member, rule, source } => {
///             eprintln!("{rule} failed on {member}: {source}");
///         }
///         other => eprintln!("{other}"),
///     }
///     if err.kind() == ErrorKind::PatternNotFound {
///         eprintln!("the target binary no longer has the expected shape");
///     }
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An anchor window a rule requires is absent from the method.
    ///
    /// Window based rules tolerate the anchor moving around inside a method, but never its
    /// absence. Treat this as a signal that the target binary differs from the shape the rule
    /// was written against.
    #[error("Pattern not found in {method}: {pattern}")]
    PatternNotFound {
        /// Qualified name of the searched method
        method: String,
        /// Human-readable description of the anchor
        pattern: String,
    },

    /// A patch request names a rule that is not present in the registry.
    #[error("Unknown patch rule '{rule}' requested by {member}")]
    UnknownRule {
        /// The requested rule name
        rule: String,
        /// Qualified name of the annotated member
        member: String,
    },

    /// A branch instruction references a label that is not bound to a live instruction
    /// when the method body is finalized.
    #[error("Label {label} is unbound at finalization of {method}")]
    UnboundLabelAtFinalization {
        /// Qualified name of the method
        method: String,
        /// The offending label
        label: LabelId,
    },

    /// A cursor tried to move to a label that has not been marked yet.
    #[error("Label {0} is not bound to any instruction")]
    UnboundLabel(LabelId),

    /// An instruction that anchors an exception-handler region was removed without
    /// explicitly re-anchoring the region.
    #[error("Invalid removal at index {index} in {method}: {reason}")]
    InvalidRemoval {
        /// Qualified name of the method
        method: String,
        /// Cursor index of the removal
        index: usize,
        /// Which boundary would have been lost
        reason: String,
    },

    /// Two rules requested incompatible values for the same aspect of one member.
    #[error("Conflicting {aspect} for {member}: '{existing}' vs '{requested}'")]
    DependencyConflict {
        /// Qualified name of the member
        member: String,
        /// The contested aspect (e.g. `name`, `entry_point`)
        aspect: &'static str,
        /// The value claimed first
        existing: String,
        /// The value claimed second
        requested: String,
    },

    /// The operand supplied for an instruction does not match the operand shape of its opcode.
    #[error("Invalid operand for {opcode}: expected {expected:?}, found {found}")]
    InvalidOperand {
        /// The opcode being emitted
        opcode: OpCode,
        /// The operand shape the opcode expects
        expected: OperandKind,
        /// Description of the operand that was supplied
        found: &'static str,
    },

    /// A rule was attached to a member kind it cannot operate on.
    #[error("Rule '{rule}' cannot be applied to {member}: expected a {expected}")]
    InvalidTarget {
        /// The rule name
        rule: String,
        /// Qualified name of the annotated member
        member: String,
        /// The member kind the rule expects
        expected: &'static str,
    },

    /// A patch request carries arguments the rule cannot use.
    #[error("Invalid argument for rule '{rule}': {message}")]
    InvalidArgument {
        /// The rule name
        rule: String,
        /// What was wrong
        message: String,
    },

    /// A member lookup by name or signature failed.
    #[error("Member not found - {0}")]
    MemberNotFound(String),

    /// A cursor index left the valid range `[0, len]`.
    #[error("Cursor index {index} is out of bounds (len {len})")]
    CursorOutOfBounds {
        /// The requested index
        index: usize,
        /// The length of the instruction list
        len: usize,
    },

    /// A rule failed on a specific member.
    ///
    /// The dispatcher wraps every handler error in this variant so that the reported error
    /// always names the member, the rule and the root cause.
    #[error("Rule '{rule}' failed on {member}: {source}")]
    RuleFailed {
        /// Qualified name of the annotated member
        member: String,
        /// The rule name
        rule: String,
        /// The root cause
        source: Box<Error>,
    },

    /// The module graph is internally inconsistent.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },
}

/// Flat classification of [`Error`] variants.
///
/// [`Error::kind`] looks through [`Error::RuleFailed`] wrappers, so callers can branch on the
/// root cause without unpacking the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
pub enum ErrorKind {
    /// See [`Error::PatternNotFound`]
    PatternNotFound,
    /// See [`Error::UnknownRule`]
    UnknownRule,
    /// See [`Error::UnboundLabelAtFinalization`]
    UnboundLabelAtFinalization,
    /// See [`Error::UnboundLabel`]
    UnboundLabel,
    /// See [`Error::InvalidRemoval`]
    InvalidRemoval,
    /// See [`Error::DependencyConflict`]
    DependencyConflict,
    /// See [`Error::InvalidOperand`]
    InvalidOperand,
    /// See [`Error::InvalidTarget`]
    InvalidTarget,
    /// See [`Error::InvalidArgument`]
    InvalidArgument,
    /// See [`Error::MemberNotFound`]
    MemberNotFound,
    /// See [`Error::CursorOutOfBounds`]
    CursorOutOfBounds,
    /// See [`Error::Malformed`]
    Malformed,
}

impl Error {
    /// Returns the kind of the innermost error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PatternNotFound { .. } => ErrorKind::PatternNotFound,
            Error::UnknownRule { .. } => ErrorKind::UnknownRule,
            Error::UnboundLabelAtFinalization { .. } => ErrorKind::UnboundLabelAtFinalization,
            Error::UnboundLabel(_) => ErrorKind::UnboundLabel,
            Error::InvalidRemoval { .. } => ErrorKind::InvalidRemoval,
            Error::DependencyConflict { .. } => ErrorKind::DependencyConflict,
            Error::InvalidOperand { .. } => ErrorKind::InvalidOperand,
            Error::InvalidTarget { .. } => ErrorKind::InvalidTarget,
            Error::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Error::MemberNotFound(_) => ErrorKind::MemberNotFound,
            Error::CursorOutOfBounds { .. } => ErrorKind::CursorOutOfBounds,
            Error::RuleFailed { source, .. } => source.kind(),
            Error::Malformed { .. } => ErrorKind::Malformed,
        }
    }

    /// Returns the innermost error, looking through [`Error::RuleFailed`] wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::RuleFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
