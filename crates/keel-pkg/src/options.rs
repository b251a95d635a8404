//! Per-dependency option overrides.
//!
//! Overrides are keyed by a glob pattern matched against either the bare
//! dependency name or its `name/version` reference:
//!
//! ```toml
//! [options."fmt/*"]
//! header_only = true
//! ```

use crate::manifest::{Manifest, OptionValue};
use crate::requirements::{Requirement, RequirementSet};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur when applying option overrides.
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("invalid option pattern '{0}': {1}")]
    Pattern(String, #[source] glob::PatternError),
}

/// A single option assignment for every dependency matching `pattern`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionOverride {
    pub pattern: String,
    pub option: String,
    pub value: OptionValue,
}

impl OptionOverride {
    pub fn new(pattern: impl Into<String>, option: impl Into<String>, value: OptionValue) -> Self {
        Self {
            pattern: pattern.into(),
            option: option.into(),
            value,
        }
    }
}

/// Collect the manifest's `[options]` tables, in pattern order.
#[must_use]
pub fn overrides_from_manifest(manifest: &Manifest) -> Vec<OptionOverride> {
    manifest
        .options
        .iter()
        .flat_map(|(pattern, values)| {
            values
                .iter()
                .map(move |(option, value)| OptionOverride::new(pattern, option, value.clone()))
        })
        .collect()
}

/// A requirement together with the options that apply to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredRequirement {
    pub requirement: Requirement,
    pub options: BTreeMap<String, OptionValue>,
}

impl ConfiguredRequirement {
    #[must_use]
    pub fn name(&self) -> &str {
        self.requirement.name()
    }

    /// Whether the dependency is consumed as headers only.
    #[must_use]
    pub fn header_only(&self) -> bool {
        self.options.get("header_only").is_some_and(OptionValue::is_true)
    }
}

/// The dependency set after option overrides were applied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfiguredRequirements {
    entries: Vec<ConfiguredRequirement>,
}

impl ConfiguredRequirements {
    pub fn iter(&self) -> impl Iterator<Item = &ConfiguredRequirement> {
        self.entries.iter()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ConfiguredRequirement> {
        self.entries.iter().find(|e| e.name() == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Apply option overrides to a dependency set.
///
/// The input set is left untouched; only dependencies matched by an
/// override gain options. Later overrides of the same option win.
pub fn configure_options(
    requirements: &RequirementSet,
    overrides: &[OptionOverride],
) -> Result<ConfiguredRequirements, OptionsError> {
    let mut entries: Vec<ConfiguredRequirement> = requirements
        .iter()
        .map(|requirement| ConfiguredRequirement {
            requirement: requirement.clone(),
            options: BTreeMap::new(),
        })
        .collect();

    for ov in overrides {
        let pattern = glob::Pattern::new(&ov.pattern)
            .map_err(|e| OptionsError::Pattern(ov.pattern.clone(), e))?;

        let mut matched = false;
        for entry in &mut entries {
            let reference = entry.requirement.reference.to_string();
            if pattern.matches(entry.name()) || pattern.matches(&reference) {
                debug!(dependency = %reference, option = %ov.option, value = %ov.value, "applying option");
                entry.options.insert(ov.option.clone(), ov.value.clone());
                matched = true;
            }
        }

        if !matched {
            warn!(pattern = %ov.pattern, option = %ov.option, "option pattern matches no dependency");
        }
    }

    Ok(ConfiguredRequirements { entries })
}
