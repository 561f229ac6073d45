//! Custom attributes and patch requests attached to module members.
//!
//! The host's annotation layer decides where requests come from; this crate only needs the
//! resulting `(rule name, arguments)` pairs per member. [`PatchRequest`] is that pair, and
//! [`CustomAttribute`] carries everything else the host wants to expose (most notably the
//! compiler-generated and state-machine markers).
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::metadata::customattributes::{CustomAttributeArgument, PatchRequest};
//!
//! let request = PatchRequest::with_strings("ForceName", &["Update"]);
//! assert_eq!(request.string_arg(0)?, "Update");
//! assert!(request.string_arg(1).is_err());
//!
//! let typed = PatchRequest::with_args("ForceName", vec![CustomAttributeArgument::I4(3)]);
//! assert!(typed.string_arg(0).is_err());
//! # Ok::<(), cilpatch::Error>(())
//! ```

mod types;

pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_request_display() {
        let request = PatchRequest::with_args(
            "PatchTypeCheck",
            vec![
                CustomAttributeArgument::Type("Game.AssistMode".to_string()),
                CustomAttributeArgument::String("Game.Slot/ISubmenu".to_string()),
            ],
        );
        assert_eq!(
            request.to_string(),
            "[PatchTypeCheck(typeof(Game.AssistMode), \"Game.Slot/ISubmenu\")]"
        );
    }

    #[test]
    fn test_string_arg_accepts_types() {
        let request = PatchRequest::with_args(
            "PatchTypeCheck",
            vec![CustomAttributeArgument::Type("Game.AssistMode".to_string())],
        );
        assert_eq!(request.string_arg(0).unwrap(), "Game.AssistMode");
    }

    #[test]
    fn test_string_arg_errors_name_rule() {
        let request = PatchRequest::with_args("ForceName", vec![CustomAttributeArgument::Bool(true)]);
        let err = request.string_arg(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("ForceName"));
        assert!(err.to_string().contains("bool"));
    }
}
