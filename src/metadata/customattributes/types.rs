//! Custom attribute and patch request data.
//!
//! Patch requests are the declarative half of the patching model: a member carries a list of
//! `(rule name, literal arguments)` pairs, and the dispatcher routes each pair to the rule
//! registered under that name. Arbitrary custom attributes are kept alongside, since some
//! rules and the dispatcher's state-machine resolution need to look at them.

use std::fmt;

use crate::{Error, Result};

/// Full name of the attribute the C# compiler puts on synthesized types and members.
pub const COMPILER_GENERATED_ATTRIBUTE: &str =
    "System.Runtime.CompilerServices.CompilerGeneratedAttribute";
/// Attribute linking an iterator method to its state machine type.
pub const ITERATOR_STATE_MACHINE_ATTRIBUTE: &str =
    "System.Runtime.CompilerServices.IteratorStateMachineAttribute";
/// Attribute linking an async method to its state machine type.
pub const ASYNC_STATE_MACHINE_ATTRIBUTE: &str =
    "System.Runtime.CompilerServices.AsyncStateMachineAttribute";

/// Assembly attribute controlling JIT optimization and debugger support.
pub const DEBUGGABLE_ATTRIBUTE: &str = "System.Diagnostics.DebuggableAttribute";
/// Enum type of the `DebuggableAttribute` constructor argument.
pub const DEBUGGING_MODES: &str = "System.Diagnostics.DebuggableAttribute/DebuggingModes";

/// Represents a single custom attribute argument value
#[derive(Debug, Clone, PartialEq)]
pub enum CustomAttributeArgument {
    /// Boolean value
    Bool(bool),
    /// Signed 32-bit integer
    I4(i32),
    /// Signed 64-bit integer
    I8(i64),
    /// 32-bit floating point
    R4(f32),
    /// 64-bit floating point
    R8(f64),
    /// UTF-8 string
    String(String),
    /// Type reference (as string)
    Type(String),
    /// Array of arguments
    Array(Vec<CustomAttributeArgument>),
    /// Enum value (base type + value)
    Enum(String, Box<CustomAttributeArgument>),
}

impl CustomAttributeArgument {
    /// Short description used in error messages.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            CustomAttributeArgument::Bool(_) => "bool",
            CustomAttributeArgument::I4(_) => "int32",
            CustomAttributeArgument::I8(_) => "int64",
            CustomAttributeArgument::R4(_) => "float32",
            CustomAttributeArgument::R8(_) => "float64",
            CustomAttributeArgument::String(_) => "string",
            CustomAttributeArgument::Type(_) => "type",
            CustomAttributeArgument::Array(_) => "array",
            CustomAttributeArgument::Enum(..) => "enum",
        }
    }
}

impl fmt::Display for CustomAttributeArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomAttributeArgument::Bool(v) => write!(f, "{v}"),
            CustomAttributeArgument::I4(v) => write!(f, "{v}"),
            CustomAttributeArgument::I8(v) => write!(f, "{v}"),
            CustomAttributeArgument::R4(v) => write!(f, "{v}"),
            CustomAttributeArgument::R8(v) => write!(f, "{v}"),
            CustomAttributeArgument::String(v) => write!(f, "{v:?}"),
            CustomAttributeArgument::Type(v) => write!(f, "typeof({v})"),
            CustomAttributeArgument::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            CustomAttributeArgument::Enum(ty, value) => write!(f, "({ty}){value}"),
        }
    }
}

/// A custom attribute attached to a type, method or field.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttribute {
    /// Full name of the attribute type
    pub type_name: String,
    /// Fixed arguments from the constructor signature
    pub fixed_args: Vec<CustomAttributeArgument>,
}

impl CustomAttribute {
    /// Creates an attribute without arguments.
    #[must_use]
    pub fn new(type_name: &str) -> Self {
        CustomAttribute {
            type_name: type_name.to_string(),
            fixed_args: Vec::new(),
        }
    }

    /// Creates an attribute with constructor arguments.
    #[must_use]
    pub fn with_args(type_name: &str, fixed_args: Vec<CustomAttributeArgument>) -> Self {
        CustomAttribute {
            type_name: type_name.to_string(),
            fixed_args,
        }
    }
}

/// A request to run one patch rule against the member it is attached to.
///
/// Requests are consumed once their rule succeeds, so running the dispatcher over an already
/// patched module does not apply per-member rules a second time.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRequest {
    /// Name under which the rule is registered
    pub rule: String,
    /// Literal arguments, in declaration order
    pub args: Vec<CustomAttributeArgument>,
}

impl PatchRequest {
    /// Creates a request without arguments.
    #[must_use]
    pub fn new(rule: &str) -> Self {
        PatchRequest {
            rule: rule.to_string(),
            args: Vec::new(),
        }
    }

    /// Creates a request with arguments.
    #[must_use]
    pub fn with_args(rule: &str, args: Vec<CustomAttributeArgument>) -> Self {
        PatchRequest {
            rule: rule.to_string(),
            args,
        }
    }

    /// Creates a request whose arguments are all strings.
    #[must_use]
    pub fn with_strings(rule: &str, args: &[&str]) -> Self {
        PatchRequest {
            rule: rule.to_string(),
            args: args
                .iter()
                .map(|arg| CustomAttributeArgument::String((*arg).to_string()))
                .collect(),
        }
    }

    /// Returns argument `index` as a string. Type arguments are accepted as their full name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the argument is missing or not a string.
    pub fn string_arg(&self, index: usize) -> Result<&str> {
        match self.args.get(index) {
            Some(CustomAttributeArgument::String(s) | CustomAttributeArgument::Type(s)) => Ok(s),
            Some(other) => Err(Error::InvalidArgument {
                rule: self.rule.clone(),
                message: format!("argument {index} must be a string, found {}", other.describe()),
            }),
            None => Err(Error::InvalidArgument {
                rule: self.rule.clone(),
                message: format!("missing argument {index}"),
            }),
        }
    }
}

impl fmt::Display for PatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}(", self.rule)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")]")
    }
}
