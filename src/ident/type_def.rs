//! Type identifiers.
//!
//! - `TypeDefName`: `"Module.Type"` — names a type without pinning a version.
//! - `TypeDefId`: a name plus an optional version selector (`<major>`,
//!   `<major>.<minor>`, or an MD5 digest), written `"Module.Type-<ver>"`.
//! - `AbsoluteTypeDefId`: a fully pinned `"Module.Type-<major>.<minor>"`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::IdentError;
use super::md5::Md5Hash;
use super::semver::SemanticVersion;

/// A `Module.Type` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeDefName {
    pub module: String,
    pub name: String,
}

impl TypeDefName {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TypeDefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

impl FromStr for TypeDefName {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, name) = s
            .split_once('.')
            .ok_or_else(|| IdentError::InvalidTypeName(s.to_string()))?;
        if module.is_empty() || name.is_empty() || name.contains('.') {
            return Err(IdentError::InvalidTypeName(s.to_string()));
        }
        Ok(Self::new(module, name))
    }
}

/// A type reference that may pin a version by major, major.minor, or MD5.
///
/// With no selector set the id resolves to the latest supported version in
/// the latest released module version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDefId {
    pub name: TypeDefName,
    pub major: Option<u32>,
    pub minor: Option<u32>,
    pub md5: Option<Md5Hash>,
}

impl TypeDefId {
    /// Id resolving to the latest version of the named type.
    pub fn latest(name: TypeDefName) -> Self {
        Self {
            name,
            major: None,
            minor: None,
            md5: None,
        }
    }

    /// Id pinned to the newest released version within one major line.
    pub fn with_major(name: TypeDefName, major: u32) -> Self {
        Self {
            name,
            major: Some(major),
            minor: None,
            md5: None,
        }
    }

    /// Id pinned to an exact `<major>.<minor>` version.
    pub fn with_version(name: TypeDefName, version: SemanticVersion) -> Self {
        Self {
            name,
            major: Some(version.major),
            minor: Some(version.minor),
            md5: None,
        }
    }

    /// Id pinned by schema-document digest.
    pub fn with_md5(name: TypeDefName, md5: Md5Hash) -> Self {
        Self {
            name,
            major: None,
            minor: None,
            md5: Some(md5),
        }
    }

    /// An id is absolute when it pins exactly one stored version.
    pub fn is_absolute(&self) -> bool {
        self.md5.is_some() || (self.major.is_some() && self.minor.is_some())
    }

    /// The pinned `<major>.<minor>` pair, when both parts are present.
    pub fn version(&self) -> Option<SemanticVersion> {
        match (self.major, self.minor) {
            (Some(major), Some(minor)) => Some(SemanticVersion::new(major, minor)),
            _ => None,
        }
    }
}

impl From<TypeDefName> for TypeDefId {
    fn from(name: TypeDefName) -> Self {
        Self::latest(name)
    }
}

impl fmt::Display for TypeDefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(md5) = &self.md5 {
            write!(f, "-{md5}")
        } else {
            match (self.major, self.minor) {
                (Some(major), Some(minor)) => write!(f, "-{major}.{minor}"),
                (Some(major), None) => write!(f, "-{major}"),
                _ => Ok(()),
            }
        }
    }
}

impl FromStr for TypeDefId {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name_part, ver_part) = match s.split_once('-') {
            Some((name, ver)) => (name, Some(ver)),
            None => (s, None),
        };
        let name: TypeDefName = name_part.parse()?;
        let ver = match ver_part {
            None => return Ok(Self::latest(name)),
            Some(v) => v,
        };
        if Md5Hash::looks_like_md5(ver) {
            return Ok(Self::with_md5(name, ver.parse()?));
        }
        if let Ok(version) = ver.parse::<SemanticVersion>() {
            return Ok(Self::with_version(name, version));
        }
        if !ver.is_empty() && ver.bytes().all(|b| b.is_ascii_digit()) {
            let major = ver
                .parse()
                .map_err(|_| IdentError::InvalidTypeId(s.to_string()))?;
            return Ok(Self::with_major(name, major));
        }
        Err(IdentError::InvalidTypeId(s.to_string()))
    }
}

/// A fully pinned type version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbsoluteTypeDefId {
    pub name: TypeDefName,
    pub version: SemanticVersion,
}

impl AbsoluteTypeDefId {
    pub fn new(name: TypeDefName, version: SemanticVersion) -> Self {
        Self { name, version }
    }
}

impl fmt::Display for AbsoluteTypeDefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

impl From<AbsoluteTypeDefId> for TypeDefId {
    fn from(abs: AbsoluteTypeDefId) -> Self {
        TypeDefId::with_version(abs.name, abs.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_parse() {
        let n: TypeDefName = "KB.Genome".parse().unwrap();
        assert_eq!(n.module, "KB");
        assert_eq!(n.name, "Genome");
        assert!("Genome".parse::<TypeDefName>().is_err());
        assert!("A.B.C".parse::<TypeDefName>().is_err());
    }

    #[test]
    fn test_id_selectors() {
        let latest: TypeDefId = "KB.Genome".parse().unwrap();
        assert!(!latest.is_absolute());
        assert_eq!(latest.to_string(), "KB.Genome");

        let major: TypeDefId = "KB.Genome-2".parse().unwrap();
        assert_eq!(major.major, Some(2));
        assert!(!major.is_absolute());

        let exact: TypeDefId = "KB.Genome-2.1".parse().unwrap();
        assert!(exact.is_absolute());
        assert_eq!(exact.version(), Some(SemanticVersion::new(2, 1)));
        assert_eq!(exact.to_string(), "KB.Genome-2.1");

        let by_md5: TypeDefId = "KB.Genome-900150983cd24fb0d6963f7d28e17f72"
            .parse()
            .unwrap();
        assert!(by_md5.is_absolute());
        assert!(by_md5.md5.is_some());
    }

    #[test]
    fn test_id_rejects_garbage_version() {
        assert!("KB.Genome-banana".parse::<TypeDefId>().is_err());
    }

    #[test]
    fn test_absolute_display() {
        let abs = AbsoluteTypeDefId::new(TypeDefName::new("KB", "Genome"), SemanticVersion::new(1, 0));
        assert_eq!(abs.to_string(), "KB.Genome-1.0");
    }
}
