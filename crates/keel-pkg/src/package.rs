//! Package folder layout.
//!
//! keel uses a single-configuration CMake layout:
//! ```text
//! my-package/
//! ├── keel.toml                 # Package manifest
//! ├── CMakeLists.txt
//! ├── src/
//! ├── build/
//! │   └── Release/              # Build folder, one per build type
//! │       ├── keel-stages.json  # Completed lifecycle stages
//! │       └── generators/       # Dependency and toolchain descriptors
//! └── package/                  # Install prefix of the package stage
//! ```

use std::path::{Path, PathBuf};
use thiserror::Error;

/// The manifest filename.
pub const MANIFEST_FILE: &str = "keel.toml";

/// Root of all build folders.
pub const BUILD_DIR: &str = "build";

/// Generators folder inside a build folder.
pub const GENERATORS_DIR: &str = "generators";

/// Default install prefix.
pub const PACKAGE_DIR: &str = "package";

/// Errors that can occur when locating a package.
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("package directory not found: {0}")]
    NotFound(PathBuf),

    #[error("manifest not found at: {0}")]
    ManifestNotFound(PathBuf),
}

/// Folders used by the lifecycle stages of one package and build type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    /// Root directory of the package, which is also the source folder.
    pub root: PathBuf,

    /// Path to the manifest file.
    pub manifest_path: PathBuf,

    /// Where the build driver configures and builds.
    pub build_folder: PathBuf,

    /// Where generated descriptors are written.
    pub generators_folder: PathBuf,

    /// Install prefix used by the package stage.
    pub package_folder: PathBuf,
}

impl PackageLayout {
    /// Compute the layout of the package rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory doesn't exist or doesn't contain a manifest.
    pub fn discover(root: impl AsRef<Path>, build_type: &str) -> Result<Self, PackageError> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(PackageError::NotFound(root));
        }

        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(PackageError::ManifestNotFound(manifest_path));
        }

        Ok(Self::new(root, build_type))
    }

    /// Compute the layout without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>, build_type: &str) -> Self {
        let root = root.into();
        let build_folder = root.join(BUILD_DIR).join(build_type);
        Self {
            manifest_path: root.join(MANIFEST_FILE),
            generators_folder: build_folder.join(GENERATORS_DIR),
            package_folder: root.join(PACKAGE_DIR),
            build_folder,
            root,
        }
    }

    /// Find a package by searching upward from a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no manifest is found in the directory tree.
    pub fn find_root(start: impl AsRef<Path>, build_type: &str) -> Result<Self, PackageError> {
        let mut current = start.as_ref().to_path_buf();

        loop {
            if current.join(MANIFEST_FILE).exists() {
                return Self::discover(&current, build_type);
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Err(PackageError::ManifestNotFound(start.as_ref().to_path_buf())),
            }
        }
    }

    /// Install into `folder` instead of `<root>/package`.
    #[must_use]
    pub fn with_package_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.package_folder = folder.into();
        self
    }
}
