//! Assembly identity for external references.
//!
//! This module provides [`AssemblyRef`], the entries of a module's external reference table,
//! together with the pieces of identity they carry: a four-part [`AssemblyVersion`] and an
//! optional strong-name [`Identity`]. Public key tokens are computed with MD5 or SHA1 as
//! specified by ECMA-335.
//!
//! # Key Types
//! - [`Identity`] - Represents either a full public key or a token (hash) identity
//! - [`HashAlgorithm`] - Hash used to derive a token from a public key
//! - [`AssemblyVersion`] - `major.minor.build.revision`
//! - [`AssemblyRef`] - One external reference
//!
//! # Example
//! ```rust
//! use cilpatch::metadata::identity::{AssemblyRef, AssemblyVersion, HashAlgorithm, Identity};
//!
//! let fna = AssemblyRef::new("FNA", AssemblyVersion::new(24, 1, 0, 0))
//!     .with_identity(Identity::Token(0x0123_4567_89ab_cdef));
//! assert_eq!(fna.public_key_token(HashAlgorithm::Sha1)?, Some(0x0123_4567_89ab_cdef));
//! assert!(fna.display_name().starts_with("FNA, Version=24.1.0.0"));
//! # Ok::<(), cilpatch::Error>(())
//! ```

use std::fmt;

use md5::{Digest, Md5};
use sha1::Sha1;

use crate::Result;

/// Hash algorithm used to derive a public key token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// MD5 (`CALG_MD5`, 0x8003)
    Md5,
    /// SHA1 (`CALG_SHA1`, 0x8004)
    Sha1,
}

impl HashAlgorithm {
    /// Maps an `AssemblyHashAlgorithm` id to the algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for unsupported ids.
    pub fn from_id(id: u32) -> Result<Self> {
        match id {
            0x8003 => Ok(HashAlgorithm::Md5),
            0x8004 => Ok(HashAlgorithm::Sha1),
            _ => Err(malformed_error!("Unsupported hash algorithm: 0x{:08X}", id)),
        }
    }

    /// The `AssemblyHashAlgorithm` id of the algorithm.
    #[must_use]
    pub fn id(self) -> u32 {
        match self {
            HashAlgorithm::Md5 => 0x8003,
            HashAlgorithm::Sha1 => 0x8004,
        }
    }
}

/// An identifier for `Assembly` in .NET CIL.
/// Can be either a public-key or a hashed Token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// The full RSA public-key
    PubKey(Vec<u8>),
    /// 8-byte end of the hash of the public-key
    Token(u64),
    /// ECMA standard 16-byte key for framework assemblies
    EcmaKey(Vec<u8>),
}

impl Identity {
    /// Create an `Identity` from a provided byte slice, and marker if it's a public key or
    /// token.
    ///
    /// # Arguments
    /// * 'data'    - The data to create the identity from
    /// * '`is_pub`'  - Indicator if the data is a public key or a token
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a token is shorter than 8 bytes.
    pub fn from(data: &[u8], is_pub: bool) -> Result<Self> {
        if is_pub {
            return Ok(match data.len() {
                16 => Identity::EcmaKey(data.to_vec()),
                _ => Identity::PubKey(data.to_vec()),
            });
        }

        let Some(bytes) = data.get(..8) else {
            return Err(malformed_error!(
                "Public key token needs 8 bytes, got {}",
                data.len()
            ));
        };
        let mut token = [0u8; 8];
        token.copy_from_slice(bytes);
        Ok(Identity::Token(u64::from_le_bytes(token)))
    }

    /// Create a token from this identity.
    ///
    /// The token is the last 8 bytes of the hash of the key, read as a little-endian `u64`.
    /// A [`Identity::Token`] is returned as is.
    ///
    /// # Arguments
    /// * 'algo' - The algorithm to use to hash the key
    ///
    /// # Errors
    /// Never fails for the supported algorithms; the `Result` keeps the signature stable for
    /// callers that map raw algorithm ids first.
    pub fn to_token(&self, algo: HashAlgorithm) -> Result<u64> {
        match self {
            Identity::PubKey(data) | Identity::EcmaKey(data) => {
                let hash = match algo {
                    HashAlgorithm::Md5 => {
                        let mut hasher = Md5::new();
                        hasher.update(data);
                        hasher.finalize().to_vec()
                    }
                    HashAlgorithm::Sha1 => {
                        let mut hasher = Sha1::new();
                        hasher.update(data);
                        hasher.finalize().to_vec()
                    }
                };

                let mut token = [0u8; 8];
                token.copy_from_slice(&hash[hash.len() - 8..]);
                Ok(u64::from_le_bytes(token))
            }
            Identity::Token(token) => Ok(*token),
        }
    }
}

/// Four-part version numbering for .NET assemblies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssemblyVersion {
    /// Major version component.
    pub major: u16,
    /// Minor version component.
    pub minor: u16,
    /// Build version component.
    pub build: u16,
    /// Revision version component.
    pub revision: u16,
}

impl AssemblyVersion {
    /// Create a new version from its components.
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse a dotted version string; missing components are zero.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for more than four components or a component
    /// that is not a `u16`.
    pub fn parse(version_str: &str) -> Result<Self> {
        let parts: Vec<&str> = version_str.split('.').collect();

        if parts.is_empty() || parts.len() > 4 {
            return Err(malformed_error!("Invalid version format: {}", version_str));
        }

        let mut components = [0u16; 4];

        for (i, part) in parts.iter().enumerate() {
            components[i] = part
                .parse::<u16>()
                .map_err(|_| malformed_error!("Invalid version component: {}", part))?;
        }

        Ok(Self::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// A reference to an external assembly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssemblyRef {
    /// The name of the Assembly
    pub name: String,
    /// Four-part version
    pub version: AssemblyVersion,
    /// Culture string, `None` for neutral
    pub culture: Option<String>,
    /// The identifier of the referenced assembly, either a pub-key or token
    pub identity: Option<Identity>,
}

impl AssemblyRef {
    /// Creates a culture-neutral reference without strong name.
    #[must_use]
    pub fn new(name: &str, version: AssemblyVersion) -> Self {
        AssemblyRef {
            name: name.to_string(),
            version,
            culture: None,
            identity: None,
        }
    }

    /// Attaches a strong-name identity.
    #[must_use]
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Public key token of the reference, if it is strong named.
    ///
    /// # Errors
    /// See [`Identity::to_token`].
    pub fn public_key_token(&self, algo: HashAlgorithm) -> Result<Option<u64>> {
        self.identity
            .as_ref()
            .map(|identity| identity.to_token(algo))
            .transpose()
    }

    /// Returns `true` if both references name the same assembly. When both are strong named,
    /// their public key tokens under `algo` must agree as well; versions are not compared.
    ///
    /// # Errors
    /// See [`Identity::to_token`].
    pub fn same_assembly(&self, other: &AssemblyRef, algo: HashAlgorithm) -> Result<bool> {
        if self.name != other.name {
            return Ok(false);
        }
        match (self.public_key_token(algo)?, other.public_key_token(algo)?) {
            (Some(ours), Some(theirs)) => Ok(ours == theirs),
            _ => Ok(true),
        }
    }

    /// `Name, Version=a.b.c.d, Culture=neutral, PublicKeyToken=...` (SHA1 tokens).
    #[must_use]
    pub fn display_name(&self) -> String {
        let culture = self.culture.as_deref().unwrap_or("neutral");
        let token = match self.public_key_token(HashAlgorithm::Sha1) {
            Ok(Some(token)) => token
                .to_le_bytes()
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<String>(),
            _ => "null".to_string(),
        };
        format!(
            "{}, Version={}, Culture={}, PublicKeyToken={}",
            self.name, self.version, culture, token
        )
    }
}

impl fmt::Display for AssemblyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_token() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0];
        let identity = Identity::from(&data, false).unwrap();
        assert_eq!(identity, Identity::Token(0xF0DE_BC9A_7856_3412));
        assert!(Identity::from(&data[..4], false).is_err());
    }

    #[test]
    fn test_identity_from_ecma_key() {
        let identity = Identity::from(&[0u8; 16], true).unwrap();
        assert!(matches!(identity, Identity::EcmaKey(_)));
        let identity = Identity::from(&[0u8; 20], true).unwrap();
        assert!(matches!(identity, Identity::PubKey(_)));
    }

    #[test]
    fn test_to_token_sha1() {
        // SHA1("abc") = a9993e364706816aba3e25717850c26c9cd0d89d
        let identity = Identity::PubKey(b"abc".to_vec());
        let token = identity.to_token(HashAlgorithm::Sha1).unwrap();
        assert_eq!(
            token,
            u64::from_le_bytes([0x78, 0x50, 0xc2, 0x6c, 0x9c, 0xd0, 0xd8, 0x9d])
        );
    }

    #[test]
    fn test_to_token_md5() {
        // MD5("abc") = 900150983cd24fb0d6963f7d28e17f72
        let identity = Identity::PubKey(b"abc".to_vec());
        let token = identity.to_token(HashAlgorithm::Md5).unwrap();
        assert_eq!(
            token,
            u64::from_le_bytes([0xd6, 0x96, 0x3f, 0x7d, 0x28, 0xe1, 0x7f, 0x72])
        );
        assert_ne!(token, identity.to_token(HashAlgorithm::Sha1).unwrap());
    }

    #[test]
    fn test_token_identity_ignores_algorithm() {
        let identity = Identity::Token(42);
        assert_eq!(identity.to_token(HashAlgorithm::Md5).unwrap(), 42);
        assert_eq!(identity.to_token(HashAlgorithm::Sha1).unwrap(), 42);
    }

    #[test]
    fn test_hash_algorithm_ids() {
        assert_eq!(HashAlgorithm::from_id(0x8004).unwrap(), HashAlgorithm::Sha1);
        assert_eq!(HashAlgorithm::Md5.id(), 0x8003);
        assert!(HashAlgorithm::from_id(0x800C).is_err());
    }

    #[test]
    fn test_version_parse() {
        assert_eq!(
            AssemblyVersion::parse("4.0.1").unwrap(),
            AssemblyVersion::new(4, 0, 1, 0)
        );
        assert!(AssemblyVersion::parse("1.2.3.4.5").is_err());
        assert!(AssemblyVersion::parse("1.x").is_err());
        assert!(AssemblyVersion::new(2, 0, 0, 0) > AssemblyVersion::new(1, 9, 9, 9));
    }

    #[test]
    fn test_same_assembly_compares_tokens() {
        let key = Identity::PubKey(b"abc".to_vec());
        let token = key.to_token(HashAlgorithm::Sha1).unwrap();
        let by_key = AssemblyRef::new("FNA", AssemblyVersion::new(24, 1, 0, 0)).with_identity(key);
        let by_token = AssemblyRef::new("FNA", AssemblyVersion::new(23, 0, 0, 0))
            .with_identity(Identity::Token(token));
        let unsigned = AssemblyRef::new("FNA", AssemblyVersion::new(1, 0, 0, 0));
        let other_key = AssemblyRef::new("FNA", AssemblyVersion::new(24, 1, 0, 0))
            .with_identity(Identity::Token(token ^ 1));

        assert!(by_key.same_assembly(&by_token, HashAlgorithm::Sha1).unwrap());
        assert!(!by_key.same_assembly(&by_token, HashAlgorithm::Md5).unwrap());
        assert!(by_key.same_assembly(&unsigned, HashAlgorithm::Sha1).unwrap());
        assert!(!by_key.same_assembly(&other_key, HashAlgorithm::Sha1).unwrap());
        assert!(!unsigned
            .same_assembly(&AssemblyRef::new("FNA.Core", unsigned.version), HashAlgorithm::Sha1)
            .unwrap());
    }

    #[test]
    fn test_display_name() {
        let plain = AssemblyRef::new("Steamworks", AssemblyVersion::new(1, 0, 0, 0));
        assert_eq!(
            plain.to_string(),
            "Steamworks, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"
        );

        let signed = plain.with_identity(Identity::Token(0x0807_0605_0403_0201));
        assert!(signed.to_string().ends_with("PublicKeyToken=0102030405060708"));
    }
}
