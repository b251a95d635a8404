//! Manifest processing and build lifecycle for keel packages.
//!
//! This crate provides:
//! - Parsing and validation of `keel.toml` manifests
//! - Settings resolution from the host, profiles and overrides
//! - Dependency declaration and per-dependency option overrides
//! - Generation of CMake dependency and toolchain descriptors
//! - The `requirements → generate → build → package` lifecycle, driving an
//!   external build tool
//! - Source export

mod cache;
mod driver;
mod export;
mod generate;
mod lifecycle;
mod manifest;
mod options;
mod package;
mod record;
mod requirements;
mod settings;

pub use cache::{DependencyCache, KEEL_HOME_ENV};
pub use driver::{BuildDriver, BuildError, BuildRequest, CMakeDriver, ToolOutput};
pub use export::{collect_exports, export_sources, ExportError};
pub use generate::{
    generate, render_dependency_config, render_dependency_version, render_presets,
    render_toolchain, GenerateError, GeneratedFiles, PRESETS_FILE, TOOLCHAIN_FILE,
};
pub use lifecycle::{Lifecycle, LifecycleError, PackagingError, Stage, StageError};
pub use manifest::{
    Manifest, ManifestError, OptionValue, Package, PackageType, RequirementDetail,
    RequirementSpec,
};
pub use options::{
    configure_options, overrides_from_manifest, ConfiguredRequirement, ConfiguredRequirements,
    OptionOverride, OptionsError,
};
pub use package::{
    PackageError, PackageLayout, BUILD_DIR, GENERATORS_DIR, MANIFEST_FILE, PACKAGE_DIR,
};
pub use record::{fingerprint, StageRecord, StageRecordError, STAGE_RECORD_FILE};
pub use requirements::{declare_requirements, PackageReference, Requirement, RequirementSet};
pub use settings::{Profile, SettingKey, Settings, SettingsError};
