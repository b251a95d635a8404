//! Keel package manifest (`keel.toml`) parsing and validation.

use crate::settings::SettingKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur when working with manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid package name '{0}': {1}")]
    InvalidName(String, &'static str),

    #[error("invalid version '{0}': {1}")]
    InvalidVersion(String, String),

    #[error("invalid requirement '{0}': {1}")]
    InvalidRequirement(String, String),

    #[error("invalid option pattern '{0}': {1}")]
    InvalidOptionPattern(String, String),
}

/// The complete keel.toml manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Package metadata (required).
    pub package: Package,

    /// Dependencies, keyed by name.
    #[serde(default)]
    pub requires: BTreeMap<String, RequirementSpec>,

    /// Per-dependency option overrides, keyed by reference pattern.
    #[serde(default)]
    pub options: BTreeMap<String, BTreeMap<String, OptionValue>>,
}

/// Package metadata section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Package {
    /// Package name (required).
    pub name: String,

    /// Package version (required, semver).
    pub version: String,

    /// Whether the package produces an application or a library.
    #[serde(default, rename = "type")]
    pub package_type: PackageType,

    /// Settings the package build depends on.
    #[serde(default = "default_settings")]
    pub settings: Vec<SettingKey>,

    /// Source files that belong to the package, as glob patterns.
    #[serde(default, rename = "exports-sources")]
    pub exports_sources: Vec<String>,

    /// Short description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// SPDX license identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

fn default_settings() -> Vec<SettingKey> {
    SettingKey::ALL.to_vec()
}

/// Kind of artifact the package produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    /// An executable.
    #[default]
    Application,
    /// A linkable library.
    Library,
}

impl PackageType {
    /// Returns the package type as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Library => "library",
        }
    }
}

impl std::fmt::Display for PackageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requirement specification.
///
/// Can be either a bare version string or a detailed specification
/// carrying propagation flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequirementSpec {
    /// Exact version string: `"10.0.0"`.
    Simple(String),

    /// Detailed requirement specification.
    Detailed(RequirementDetail),
}

impl RequirementSpec {
    /// Returns the pinned version string.
    #[must_use]
    pub fn version(&self) -> &str {
        match self {
            Self::Simple(v) => v,
            Self::Detailed(d) => &d.version,
        }
    }

    /// Whether headers must be visible to consumers of this package.
    #[must_use]
    pub fn transitive_headers(&self) -> bool {
        matches!(self, Self::Detailed(d) if d.transitive_headers)
    }

    /// Whether linkable artifacts must be visible to consumers of this package.
    #[must_use]
    pub fn transitive_libs(&self) -> bool {
        matches!(self, Self::Detailed(d) if d.transitive_libs)
    }
}

/// Detailed requirement specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequirementDetail {
    /// Exact version.
    pub version: String,

    /// Propagate include directories to consumers.
    #[serde(default, rename = "transitive-headers")]
    pub transitive_headers: bool,

    /// Propagate link libraries to consumers.
    #[serde(default, rename = "transitive-libs")]
    pub transitive_libs: bool,
}

/// Value of a dependency option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    String(String),
}

impl OptionValue {
    /// Returns true when the value is the boolean `true`.
    #[must_use]
    pub fn is_true(&self) -> bool {
        matches!(self, Self::Bool(true))
    }
}

impl std::fmt::Display for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl Manifest {
    /// Load a manifest from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a manifest from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest.
    pub fn validate(&self) -> Result<(), ManifestError> {
        validate_name(&self.package.name)?;
        self.validate_version()?;
        self.validate_requirements()?;
        self.validate_option_patterns()?;
        Ok(())
    }

    /// Validate the version string.
    fn validate_version(&self) -> Result<(), ManifestError> {
        let version = &self.package.version;

        semver::Version::parse(version)
            .map_err(|e| ManifestError::InvalidVersion(version.clone(), e.to_string()))?;

        Ok(())
    }

    /// Requirements must be named like packages and pinned to an exact version.
    fn validate_requirements(&self) -> Result<(), ManifestError> {
        for (name, spec) in &self.requires {
            validate_name(name)
                .map_err(|_| ManifestError::InvalidRequirement(name.clone(), "bad name".into()))?;

            semver::Version::parse(spec.version()).map_err(|e| {
                ManifestError::InvalidRequirement(
                    name.clone(),
                    format!("version '{}' is not exact: {e}", spec.version()),
                )
            })?;
        }
        Ok(())
    }

    fn validate_option_patterns(&self) -> Result<(), ManifestError> {
        for pattern in self.options.keys() {
            glob::Pattern::new(pattern)
                .map_err(|e| ManifestError::InvalidOptionPattern(pattern.clone(), e.to_string()))?;
        }
        Ok(())
    }

    /// Serialize the manifest to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Whether the package build consumes the given setting.
    #[must_use]
    pub fn consumes(&self, key: SettingKey) -> bool {
        self.package.settings.contains(&key)
    }
}

/// Validate a package or dependency name.
pub(crate) fn validate_name(name: &str) -> Result<(), ManifestError> {
    if name.is_empty() {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name cannot be empty",
        ));
    }

    if name.len() > 64 {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name cannot exceed 64 characters",
        ));
    }

    // Must start with a letter
    if !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name must start with a letter",
        ));
    }

    // Only alphanumeric, hyphens, and underscores
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "name can only contain letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(())
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            package: Package {
                name: String::from("my-package"),
                version: String::from("0.1.0"),
                package_type: PackageType::default(),
                settings: default_settings(),
                exports_sources: Vec::new(),
                description: None,
                license: None,
            },
            requires: BTreeMap::new(),
            options: BTreeMap::new(),
        }
    }
}
