//! Assembly reference rewriting.
//!
//! [`ReplaceAssemblyRefs`] swaps a family of references (e.g. every `Microsoft.Xna.Framework*`
//! assembly) for a single replacement, keeping the module's dependency list in step.
//! [`SyncReferenceVersions`] then makes every reference carry the version of the dependency
//! it resolves to.

use std::{fmt, sync::Arc};

use crate::{
    metadata::{
        identity::{AssemblyRef, HashAlgorithm},
        module::CilModule,
    },
    patching::{config::PatchConfig, rule::ModulePass},
    Result,
};

/// Selects the references [`ReplaceAssemblyRefs`] removes.
#[derive(Clone)]
pub enum ReferenceFilter {
    /// Exact assembly name
    Name(String),
    /// Assembly name prefix
    NamePrefix(String),
    /// Strong-named with this public key token, e.g. every assembly signed with one vendor key
    PublicKeyToken(u64),
    /// Arbitrary predicate
    Custom(Arc<dyn Fn(&AssemblyRef) -> bool + Send + Sync>),
}

impl ReferenceFilter {
    /// Returns `true` if `reference` is selected. Tokens are derived with `algo`.
    ///
    /// # Errors
    ///
    /// See [`crate::metadata::identity::Identity::to_token`].
    pub fn matches(&self, reference: &AssemblyRef, algo: HashAlgorithm) -> Result<bool> {
        Ok(match self {
            ReferenceFilter::Name(name) => reference.name == *name,
            ReferenceFilter::NamePrefix(prefix) => reference.name.starts_with(prefix.as_str()),
            ReferenceFilter::PublicKeyToken(token) => {
                reference.public_key_token(algo)? == Some(*token)
            }
            ReferenceFilter::Custom(predicate) => predicate(reference),
        })
    }
}

impl fmt::Debug for ReferenceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceFilter::Name(name) => f.debug_tuple("Name").field(name).finish(),
            ReferenceFilter::NamePrefix(prefix) => {
                f.debug_tuple("NamePrefix").field(prefix).finish()
            }
            ReferenceFilter::PublicKeyToken(token) => {
                write!(f, "PublicKeyToken({token:016x})")
            }
            ReferenceFilter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Replaces every reference selected by a filter with one replacement reference.
///
/// References are scanned in order. A reference to the replacement's assembly (same name and,
/// when both are strong named, same public key token) marks it as present and is never
/// removed; any other selected reference is removed along with the dependencies it resolved
/// to. A missing replacement is appended to both the reference and the dependency list.
/// Tokens are derived with the module's [`CilModule::hash_algorithm`].
#[derive(Debug, Clone)]
pub struct ReplaceAssemblyRefs {
    filter: ReferenceFilter,
    replacement: AssemblyRef,
}

impl ReplaceAssemblyRefs {
    /// Creates the rewriter.
    #[must_use]
    pub fn new(filter: ReferenceFilter, replacement: AssemblyRef) -> Self {
        ReplaceAssemblyRefs {
            filter,
            replacement,
        }
    }

    /// Rewrites the references of `module`. Returns `true` if anything changed.
    ///
    /// # Errors
    ///
    /// See [`crate::metadata::identity::Identity::to_token`].
    pub fn apply(&self, module: &mut CilModule) -> Result<bool> {
        let algo = module.hash_algorithm;
        let mut present = false;
        let mut kept = Vec::with_capacity(module.assembly_refs.len());
        let mut removed = Vec::new();
        for reference in module.assembly_refs.drain(..) {
            if reference.same_assembly(&self.replacement, algo)? {
                present = true;
                kept.push(reference);
            } else if self.filter.matches(&reference, algo)? {
                log::debug!("Removed reference {} from {}", reference.name, module.name);
                removed.push(reference);
            } else {
                kept.push(reference);
            }
        }
        module.assembly_refs = kept;

        let mut dependencies = Vec::with_capacity(module.dependencies.len());
        for dependency in module.dependencies.drain(..) {
            let mut resolved_removed = false;
            for reference in &removed {
                resolved_removed |= dependency.same_assembly(reference, algo)?;
            }
            if !resolved_removed {
                dependencies.push(dependency);
            }
        }
        module.dependencies = dependencies;

        if !present {
            log::debug!(
                "Added reference {} to {}",
                self.replacement.display_name(),
                module.name
            );
            module.assembly_refs.push(self.replacement.clone());
            let mut resolved = false;
            for dependency in &module.dependencies {
                resolved |= dependency.same_assembly(&self.replacement, algo)?;
            }
            if !resolved {
                module.dependencies.push(self.replacement.clone());
            }
        }

        Ok(!removed.is_empty() || !present)
    }
}

impl ModulePass for ReplaceAssemblyRefs {
    fn name(&self) -> &'static str {
        "ReplaceAssemblyRefs"
    }

    fn run(&self, module: &mut CilModule, _config: &PatchConfig) -> Result<bool> {
        self.apply(module)
    }

    fn description(&self) -> &'static str {
        "Replaces a family of assembly references with a single reference"
    }
}

/// Sets each reference's version to that of the dependency it resolves to.
pub struct SyncReferenceVersions;

impl ModulePass for SyncReferenceVersions {
    fn name(&self) -> &'static str {
        "SyncReferenceVersions"
    }

    fn run(&self, module: &mut CilModule, _config: &PatchConfig) -> Result<bool> {
        let algo = module.hash_algorithm;
        let mut changed = false;
        for reference in &mut module.assembly_refs {
            let mut resolved = None;
            for dependency in &module.dependencies {
                if dependency.same_assembly(reference, algo)? {
                    resolved = Some(dependency.version);
                    break;
                }
            }
            let Some(version) = resolved else {
                continue;
            };
            if reference.version != version {
                log::debug!("{}: {} -> {}", reference.name, reference.version, version);
                reference.version = version;
                changed = true;
            }
        }
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Aligns reference versions with the resolved dependencies"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::identity::{AssemblyVersion, Identity};

    const XNA_TOKEN: u64 = 0x5305_e51d_bef8_2c84;

    fn xna_module() -> CilModule {
        let mut module = CilModule::new("Game");
        for name in [
            "mscorlib",
            "Microsoft.Xna.Framework",
            "Microsoft.Xna.Framework.Game",
        ] {
            let reference = AssemblyRef::new(name, AssemblyVersion::new(4, 0, 0, 0));
            module.assembly_refs.push(reference.clone());
            module.dependencies.push(reference);
        }
        module
    }

    fn fna() -> ReplaceAssemblyRefs {
        ReplaceAssemblyRefs::new(
            ReferenceFilter::NamePrefix("Microsoft.Xna.Framework".to_string()),
            AssemblyRef::new("FNA", AssemblyVersion::new(24, 1, 0, 0)),
        )
    }

    fn names(refs: &[AssemblyRef]) -> Vec<&str> {
        refs.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_replace_family() {
        let mut module = xna_module();
        assert!(fna().apply(&mut module).unwrap());
        assert_eq!(names(&module.assembly_refs), vec!["mscorlib", "FNA"]);
        assert_eq!(names(&module.dependencies), vec!["mscorlib", "FNA"]);

        let snapshot = module.clone();
        assert!(!fna().apply(&mut module).unwrap());
        assert_eq!(module, snapshot);
    }

    #[test]
    fn test_present_replacement_is_kept() {
        let mut module = xna_module();
        module
            .assembly_refs
            .insert(0, AssemblyRef::new("FNA", AssemblyVersion::new(23, 0, 0, 0)));
        assert!(fna().apply(&mut module).unwrap());
        assert_eq!(names(&module.assembly_refs), vec!["FNA", "mscorlib"]);
        assert_eq!(module.assembly_refs[0].version, AssemblyVersion::new(23, 0, 0, 0));
        assert_eq!(names(&module.dependencies), vec!["mscorlib"]);
    }

    #[test]
    fn test_custom_filter() {
        let mut module = xna_module();
        let pass = ReplaceAssemblyRefs::new(
            ReferenceFilter::Custom(Arc::new(|r: &AssemblyRef| r.name.ends_with(".Game"))),
            AssemblyRef::new("Game.Shim", AssemblyVersion::new(1, 0, 0, 0)),
        );
        assert!(pass.run(&mut module, &PatchConfig::new()).unwrap());
        assert_eq!(
            names(&module.assembly_refs),
            vec!["mscorlib", "Microsoft.Xna.Framework", "Game.Shim"]
        );
        assert_eq!(format!("{:?}", pass.filter), "Custom(..)");
    }

    #[test]
    fn test_token_filter() {
        let mut module = xna_module();
        module.assembly_refs[2].identity = Some(Identity::Token(XNA_TOKEN));
        module.dependencies[2].identity = Some(Identity::Token(XNA_TOKEN));
        let pass = ReplaceAssemblyRefs::new(
            ReferenceFilter::PublicKeyToken(XNA_TOKEN),
            AssemblyRef::new("FNA", AssemblyVersion::new(24, 1, 0, 0)),
        );

        assert!(pass.apply(&mut module).unwrap());
        assert_eq!(
            names(&module.assembly_refs),
            vec!["mscorlib", "Microsoft.Xna.Framework", "FNA"]
        );
        assert_eq!(
            names(&module.dependencies),
            vec!["mscorlib", "Microsoft.Xna.Framework", "FNA"]
        );
        assert_eq!(
            format!("{:?}", pass.filter),
            "PublicKeyToken(5305e51dbef82c84)"
        );
    }

    #[test]
    fn test_replacement_identity_uses_module_hash() {
        let key = Identity::PubKey(vec![7; 160]);
        let mut module = xna_module();
        module.hash_algorithm = HashAlgorithm::Md5;
        // same name, signed with a key whose MD5 token is recorded
        module.assembly_refs.push(
            AssemblyRef::new("FNA", AssemblyVersion::new(24, 1, 0, 0))
                .with_identity(Identity::Token(key.to_token(HashAlgorithm::Md5).unwrap())),
        );
        let pass = ReplaceAssemblyRefs::new(
            ReferenceFilter::NamePrefix("Microsoft.Xna.Framework".to_string()),
            AssemblyRef::new("FNA", AssemblyVersion::new(24, 1, 0, 0)).with_identity(key.clone()),
        );
        assert!(pass.apply(&mut module).unwrap());
        assert_eq!(names(&module.assembly_refs), vec!["mscorlib", "FNA"]);

        // under SHA1 the recorded token no longer matches, so the replacement is added
        let mut module = xna_module();
        module.assembly_refs.push(
            AssemblyRef::new("FNA", AssemblyVersion::new(24, 1, 0, 0))
                .with_identity(Identity::Token(key.to_token(HashAlgorithm::Md5).unwrap())),
        );
        assert!(pass.apply(&mut module).unwrap());
        assert_eq!(names(&module.assembly_refs), vec!["mscorlib", "FNA", "FNA"]);
    }

    #[test]
    fn test_sync_versions() {
        let mut module = xna_module();
        module.dependencies[0].version = AssemblyVersion::new(4, 0, 30319, 0);
        assert!(SyncReferenceVersions
            .run(&mut module, &PatchConfig::new())
            .unwrap());
        assert_eq!(
            module.assembly_refs[0].version,
            AssemblyVersion::new(4, 0, 30319, 0)
        );
        assert!(!SyncReferenceVersions
            .run(&mut module, &PatchConfig::new())
            .unwrap());
    }
}
