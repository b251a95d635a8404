//! Build settings: the `os`, `compiler`, `build_type` and `arch` tuple that
//! parameterizes generation.
//!
//! Settings are resolved once per invocation, lowest precedence first:
//! host detection, then an optional profile file, then `key=value`
//! overrides from the command line.
//!
//! ```toml
//! # profile
//! [settings]
//! os = "Linux"
//! compiler = "gcc"
//! "compiler.version" = "13"
//! build_type = "Debug"
//! arch = "x86_64"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while resolving settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read profile: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse profile: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown setting '{0}', expected one of: os, compiler, compiler.version, build_type, arch")]
    UnknownKey(String),

    #[error("invalid setting override '{0}', expected key=value")]
    InvalidOverride(String),

    #[error("setting '{0}' cannot be empty")]
    EmptyValue(String),
}

/// A setting a package can declare it consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    Os,
    Compiler,
    BuildType,
    Arch,
}

impl SettingKey {
    /// Every setting, in descriptor order.
    pub const ALL: [SettingKey; 4] = [Self::Os, Self::Compiler, Self::BuildType, Self::Arch];

    /// Returns the key as written in manifests and profiles.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Os => "os",
            Self::Compiler => "compiler",
            Self::BuildType => "build_type",
            Self::Arch => "arch",
        }
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved settings tuple. Values are opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub os: String,
    pub compiler: String,
    pub compiler_version: Option<String>,
    pub build_type: String,
    pub arch: String,
}

/// A profile file holding setting defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl Profile {
    /// Load a profile from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl Settings {
    /// Detect settings for the host running keel.
    #[must_use]
    pub fn detect() -> Self {
        let os = match std::env::consts::OS {
            "linux" => "Linux",
            "macos" => "Macos",
            "windows" => "Windows",
            "freebsd" => "FreeBSD",
            other => other,
        };

        let arch = match std::env::consts::ARCH {
            "aarch64" => "armv8",
            "arm" => "armv7",
            other => other,
        };

        let compiler = match std::env::consts::OS {
            "linux" => "gcc",
            "macos" => "apple-clang",
            "windows" => "msvc",
            _ => "clang",
        };

        Self {
            os: os.to_string(),
            compiler: compiler.to_string(),
            compiler_version: None,
            build_type: String::from("Release"),
            arch: arch.to_string(),
        }
    }

    /// Resolve settings from host detection, an optional profile and
    /// `key=value` overrides, in that order of precedence.
    pub fn resolve(profile: Option<&Path>, overrides: &[String]) -> Result<Self, SettingsError> {
        let mut settings = Self::detect();

        if let Some(path) = profile {
            let profile = Profile::from_path(path)?;
            for (key, value) in &profile.settings {
                settings.set(key, value)?;
            }
        }

        for entry in overrides {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| SettingsError::InvalidOverride(entry.clone()))?;
            settings.set(key.trim(), value.trim())?;
        }

        Ok(settings)
    }

    /// Set a single setting by its key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        if value.is_empty() {
            return Err(SettingsError::EmptyValue(key.to_string()));
        }

        let slot = match key {
            "os" => &mut self.os,
            "compiler" => &mut self.compiler,
            "build_type" => &mut self.build_type,
            "arch" => &mut self.arch,
            "compiler.version" => {
                self.compiler_version = Some(value.to_string());
                return Ok(());
            }
            other => return Err(SettingsError::UnknownKey(other.to_string())),
        };
        *slot = value.to_string();
        Ok(())
    }

    /// Get the value of a setting.
    #[must_use]
    pub fn get(&self, key: SettingKey) -> &str {
        match key {
            SettingKey::Os => &self.os,
            SettingKey::Compiler => &self.compiler,
            SettingKey::BuildType => &self.build_type,
            SettingKey::Arch => &self.arch,
        }
    }

    /// The `key=value` lines for the given keys, in descriptor order.
    ///
    /// `compiler.version` follows `compiler` when both are present.
    #[must_use]
    pub fn pairs(&self, keys: &[SettingKey]) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for key in SettingKey::ALL {
            if !keys.contains(&key) {
                continue;
            }
            pairs.push((key.as_str().to_string(), self.get(key).to_string()));
            if key == SettingKey::Compiler {
                if let Some(version) = &self.compiler_version {
                    pairs.push((String::from("compiler.version"), version.clone()));
                }
            }
        }
        pairs
    }
}

impl std::fmt::Display for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pairs = self.pairs(&SettingKey::ALL);
        let joined: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        f.write_str(&joined.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn detect_defaults_to_release() {
        let settings = Settings::detect();
        assert_eq!(settings.build_type, "Release");
        assert!(!settings.os.is_empty());
        assert!(!settings.arch.is_empty());
    }

    #[test]
    fn overrides_win_over_profile() {
        let tmp = TempDir::new().unwrap();
        let profile = tmp.path().join("debug.toml");
        fs::write(
            &profile,
            "[settings]\nos = \"Linux\"\nbuild_type = \"Debug\"\n\"compiler.version\" = \"13\"\n",
        )
        .unwrap();

        let settings =
            Settings::resolve(Some(&profile), &["build_type=RelWithDebInfo".into()]).unwrap();
        assert_eq!(settings.os, "Linux");
        assert_eq!(settings.build_type, "RelWithDebInfo");
        assert_eq!(settings.compiler_version.as_deref(), Some("13"));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = Settings::resolve(None, &["libc=musl".into()]).unwrap_err();
        assert!(matches!(err, SettingsError::UnknownKey(ref k) if k == "libc"));
    }

    #[test]
    fn override_without_equals_is_rejected() {
        let err = Settings::resolve(None, &["Release".into()]).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidOverride(..)));
    }

    #[test]
    fn empty_value_is_rejected() {
        let err = Settings::resolve(None, &["arch=".into()]).unwrap_err();
        assert!(matches!(err, SettingsError::EmptyValue(..)));
    }

    #[test]
    fn pairs_only_cover_requested_keys() {
        let mut settings = Settings::detect();
        settings.set("compiler", "clang").unwrap();
        settings.set("compiler.version", "17").unwrap();

        let pairs = settings.pairs(&[SettingKey::Compiler, SettingKey::Arch]);
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["compiler", "compiler.version", "arch"]);
    }
}
