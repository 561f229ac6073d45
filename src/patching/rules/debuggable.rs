use bitflags::bitflags;

use crate::{
    metadata::{
        customattributes::{CustomAttributeArgument, DEBUGGABLE_ATTRIBUTE, DEBUGGING_MODES},
        module::CilModule,
    },
    patching::{config::PatchConfig, rule::ModulePass},
    Result,
};

bitflags! {
    /// `System.Diagnostics.DebuggableAttribute.DebuggingModes`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DebuggingModes: i32 {
        /// Default JIT tracking.
        const DEFAULT = 0x0001;
        /// Ignore sequence points from the symbol store.
        const IGNORE_SYMBOL_STORE_SEQUENCE_POINTS = 0x0002;
        /// Allow edit and continue.
        const ENABLE_EDIT_AND_CONTINUE = 0x0004;
        /// Disable JIT optimizations.
        const DISABLE_OPTIMIZATIONS = 0x0100;
    }
}

/// Rewrites the module's `DebuggableAttribute` to carry a fixed set of debugging modes.
///
/// Modules without the attribute are left alone. Both constructor shapes are replaced by the
/// `DebuggableAttribute(DebuggingModes)` form.
#[derive(Debug, Clone, Copy)]
pub struct SetDebuggableModes {
    modes: DebuggingModes,
}

impl SetDebuggableModes {
    /// Sets `modes` on the attribute.
    #[must_use]
    pub fn new(modes: DebuggingModes) -> Self {
        SetDebuggableModes { modes }
    }

    fn argument(&self) -> CustomAttributeArgument {
        CustomAttributeArgument::Enum(
            DEBUGGING_MODES.to_string(),
            Box::new(CustomAttributeArgument::I4(self.modes.bits())),
        )
    }
}

impl ModulePass for SetDebuggableModes {
    fn name(&self) -> &'static str {
        "SetDebuggableModes"
    }

    fn run(&self, module: &mut CilModule, _config: &PatchConfig) -> Result<bool> {
        let Some(attribute) = module
            .custom_attributes
            .iter_mut()
            .find(|attr| attr.type_name == DEBUGGABLE_ATTRIBUTE)
        else {
            return Ok(false);
        };

        let wanted = vec![self.argument()];
        if attribute.fixed_args == wanted {
            return Ok(false);
        }

        log::debug!("{}: debugging modes {:?}", module.name, self.modes);
        attribute.fixed_args = wanted;
        Ok(true)
    }

    fn description(&self) -> &'static str {
        "Sets the debugging modes of the module's DebuggableAttribute"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::customattributes::CustomAttribute;

    fn debug_modes() -> SetDebuggableModes {
        SetDebuggableModes::new(
            DebuggingModes::DEFAULT
                | DebuggingModes::DISABLE_OPTIMIZATIONS
                | DebuggingModes::IGNORE_SYMBOL_STORE_SEQUENCE_POINTS,
        )
    }

    #[test]
    fn test_rewrites_legacy_constructor() {
        let mut module = CilModule::new("Game");
        module.custom_attributes.push(CustomAttribute::with_args(
            DEBUGGABLE_ATTRIBUTE,
            vec![
                CustomAttributeArgument::Bool(false),
                CustomAttributeArgument::Bool(false),
            ],
        ));

        let pass = debug_modes();
        assert!(pass.run(&mut module, &PatchConfig::new()).unwrap());
        assert_eq!(
            module.custom_attributes[0].fixed_args,
            vec![CustomAttributeArgument::Enum(
                DEBUGGING_MODES.to_string(),
                Box::new(CustomAttributeArgument::I4(0x0103)),
            )]
        );

        let snapshot = module.clone();
        assert!(!pass.run(&mut module, &PatchConfig::new()).unwrap());
        assert_eq!(module, snapshot);
    }

    #[test]
    fn test_missing_attribute_is_untouched() {
        let mut module = CilModule::new("Game");
        module
            .custom_attributes
            .push(CustomAttribute::new("System.Runtime.Versioning.TargetFrameworkAttribute"));

        let snapshot = module.clone();
        assert!(!debug_modes().run(&mut module, &PatchConfig::new()).unwrap());
        assert_eq!(module, snapshot);
    }
}
