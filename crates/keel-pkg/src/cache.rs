//! Location of installed dependency packages.

use crate::requirements::PackageReference;
use std::path::{Path, PathBuf};

/// Environment variable overriding the keel home directory.
pub const KEEL_HOME_ENV: &str = "KEEL_HOME";

/// The local dependency cache: `<home>/p/<name>/<version>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCache {
    root: PathBuf,
}

impl DependencyCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `$KEEL_HOME`, falling back to `~/.keel`.
    #[must_use]
    pub fn from_env() -> Self {
        let root = std::env::var_os(KEEL_HOME_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".keel")))
            .unwrap_or_else(|| PathBuf::from(".keel"));
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding the installed files of a dependency.
    #[must_use]
    pub fn package_folder(&self, reference: &PackageReference) -> PathBuf {
        self.root
            .join("p")
            .join(&reference.name)
            .join(reference.version.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_folder_is_name_then_version() {
        let cache = DependencyCache::new("/opt/keel");
        let reference: PackageReference = "fmt/10.0.0".parse().unwrap();
        assert_eq!(
            cache.package_folder(&reference),
            PathBuf::from("/opt/keel/p/fmt/10.0.0")
        );
    }
}
