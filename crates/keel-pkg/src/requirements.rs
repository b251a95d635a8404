//! Dependency declarations.

use crate::manifest::{validate_name, Manifest, ManifestError};
use std::fmt;
use std::str::FromStr;

/// A pinned dependency reference, written `name/version`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageReference {
    pub name: String,
    pub version: semver::Version,
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

impl FromStr for PackageReference {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = s.split_once('/').ok_or_else(|| {
            ManifestError::InvalidRequirement(s.to_string(), "expected name/version".into())
        })?;
        validate_name(name)?;
        let version = semver::Version::parse(version)
            .map_err(|e| ManifestError::InvalidRequirement(s.to_string(), e.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            version,
        })
    }
}

/// A declared dependency with its propagation flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub reference: PackageReference,
    /// Headers are visible to consumers of this package.
    pub transitive_headers: bool,
    /// Link libraries are visible to consumers of this package.
    pub transitive_libs: bool,
}

impl Requirement {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.reference.name
    }
}

/// The fixed dependency set of a package, ordered by name.
///
/// There is no way to add, remove or change an entry once the set exists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequirementSet {
    requirements: Vec<Requirement>,
}

impl RequirementSet {
    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.requirements.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Look up a requirement by dependency name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.name() == name)
    }
}

impl<'a> IntoIterator for &'a RequirementSet {
    type Item = &'a Requirement;
    type IntoIter = std::slice::Iter<'a, Requirement>;

    fn into_iter(self) -> Self::IntoIter {
        self.requirements.iter()
    }
}

/// Declare the manifest's dependency set with propagation flags attached.
///
/// Performs no I/O. Only a manifest that bypassed validation can fail here.
pub fn declare_requirements(manifest: &Manifest) -> Result<RequirementSet, ManifestError> {
    let requirements = manifest
        .requires
        .iter()
        .map(|(name, spec)| {
            let reference: PackageReference = format!("{name}/{}", spec.version()).parse()?;
            Ok::<_, ManifestError>(Requirement {
                reference,
                transitive_headers: spec.transitive_headers(),
                transitive_libs: spec.transitive_libs(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RequirementSet { requirements })
}
