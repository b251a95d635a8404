//! The four-stage package lifecycle.
//!
//! `Requirements → Generate → Build → Package`, run strictly in order.
//! Each stage is attempted once; the first failure stops the run and is
//! reported together with the stage it happened in.

use crate::cache::DependencyCache;
use crate::driver::{BuildDriver, BuildError, BuildRequest, ToolOutput};
use crate::generate::{self, GenerateError, GeneratedFiles, TOOLCHAIN_FILE};
use crate::manifest::{Manifest, ManifestError};
use crate::options::{self, ConfiguredRequirements, OptionsError};
use crate::package::PackageLayout;
use crate::record::{self, StageRecord, StageRecordError};
use crate::requirements::{self, RequirementSet};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// A lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Requirements,
    Generate,
    Build,
    Package,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; 4] = [
        Self::Requirements,
        Self::Generate,
        Self::Build,
        Self::Package,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requirements => "requirements",
            Self::Generate => "generate",
            Self::Build => "build",
            Self::Package => "package",
        }
    }

    /// The stage that runs after this one.
    #[must_use]
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Requirements => Some(Self::Generate),
            Self::Generate => Some(Self::Build),
            Self::Build => Some(Self::Package),
            Self::Package => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the package stage.
#[derive(Error, Debug)]
pub enum PackagingError {
    #[error("nothing to package: the build stage has not completed")]
    NotBuilt,

    #[error("build folder not found: {}", .0.display())]
    BuildFolderMissing(PathBuf),

    #[error("install step failed")]
    Install(#[source] BuildError),

    #[error("install produced no files in {}", .0.display())]
    EmptyPackage(PathBuf),
}

/// Why a single stage failed.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Packaging(#[from] PackagingError),

    #[error(transparent)]
    Record(#[from] StageRecordError),

    #[error("the {stage} stage needs a completed {missing} stage; run `keel {missing}` first")]
    OutOfOrder { stage: Stage, missing: Stage },
}

impl StageError {
    /// The failing external tool invocation, if the stage got that far.
    #[must_use]
    pub fn tool_error(&self) -> Option<&BuildError> {
        match self {
            Self::Build(err) | Self::Packaging(PackagingError::Install(err)) => Some(err),
            _ => None,
        }
    }
}

/// A failed lifecycle run.
#[derive(Error, Debug)]
#[error("{stage} stage failed")]
pub struct LifecycleError {
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

/// Runs the lifecycle of one package for one settings tuple.
///
/// The manifest and settings are fixed for the lifetime of the value.
#[derive(Debug)]
pub struct Lifecycle<D> {
    manifest: Manifest,
    settings: Settings,
    layout: PackageLayout,
    cache: DependencyCache,
    driver: D,
}

impl<D: BuildDriver> Lifecycle<D> {
    pub fn new(manifest: Manifest, settings: Settings, layout: PackageLayout, driver: D) -> Self {
        Self {
            manifest,
            settings,
            layout,
            cache: DependencyCache::from_env(),
            driver,
        }
    }

    /// Resolve dependency folders against `cache` instead of `$KEEL_HOME`.
    #[must_use]
    pub fn with_cache(mut self, cache: DependencyCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn layout(&self) -> &PackageLayout {
        &self.layout
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The fixed dependency set with propagation flags.
    pub fn declare_requirements(&self) -> Result<RequirementSet, StageError> {
        Ok(requirements::declare_requirements(&self.manifest)?)
    }

    /// Apply the manifest's option overrides to `requirements`.
    pub fn configure_options(
        &self,
        requirements: &RequirementSet,
    ) -> Result<ConfiguredRequirements, StageError> {
        let overrides = options::overrides_from_manifest(&self.manifest);
        Ok(options::configure_options(requirements, &overrides)?)
    }

    /// Write dependency and toolchain descriptors, then start a fresh
    /// stage record.
    ///
    /// Any earlier record is dropped first, so a failed regenerate leaves
    /// nothing for `build` or `package` to rely on.
    pub fn generate(&self) -> Result<GeneratedFiles, StageError> {
        let requirements = self.declare_requirements()?;
        let configured = self.configure_options(&requirements)?;
        StageRecord::discard(&self.layout.build_folder)?;

        let files = generate::generate(
            &configured,
            &self.settings,
            &self.manifest.package.settings,
            &self.layout,
            &self.cache,
        )?;

        let mut record = StageRecord::new(self.fingerprint()?);
        record.mark(Stage::Requirements);
        record.mark(Stage::Generate);
        record.save(&self.layout.build_folder)?;

        Ok(files)
    }

    /// Configure and build with the external driver.
    pub fn build(&mut self) -> Result<(), StageError> {
        let mut record = self
            .current_record()?
            .filter(|r| r.has(Stage::Generate))
            .ok_or(StageError::OutOfOrder {
                stage: Stage::Build,
                missing: Stage::Generate,
            })?;

        // Until both steps succeed the build counts as not done.
        record.mark(Stage::Generate);
        record.save(&self.layout.build_folder)?;

        let request = self.request();
        log_output("configure", &self.driver.configure(&request)?);
        log_output("build", &self.driver.build(&request)?);

        record.mark(Stage::Build);
        record.save(&self.layout.build_folder)?;
        Ok(())
    }

    /// Install build outputs into the package folder.
    pub fn package(&mut self) -> Result<PathBuf, StageError> {
        let build_folder = &self.layout.build_folder;
        if !build_folder.is_dir() {
            return Err(PackagingError::BuildFolderMissing(build_folder.clone()).into());
        }

        let record = match self.current_record() {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "unreadable stage record, treating the build as not done");
                None
            }
        };
        let mut record = record
            .filter(|r| r.has(Stage::Build))
            .ok_or(PackagingError::NotBuilt)?;
        record.mark(Stage::Build);
        record.save(&self.layout.build_folder)?;

        let request = self.request();
        let output = self
            .driver
            .install(&request)
            .map_err(PackagingError::Install)?;
        log_output("install", &output);

        let package_folder = self.layout.package_folder.clone();
        if is_empty_dir(&package_folder) {
            return Err(PackagingError::EmptyPackage(package_folder).into());
        }

        record.mark(Stage::Package);
        record.save(&self.layout.build_folder)?;
        Ok(package_folder)
    }

    /// Run one stage, tagging any failure with the stage.
    pub fn run_stage(&mut self, stage: Stage) -> Result<(), LifecycleError> {
        info!(%stage, package = %self.manifest.package.name, "starting stage");

        let result = match stage {
            Stage::Requirements => self.declare_requirements().map(drop),
            Stage::Generate => self.generate().map(drop),
            Stage::Build => self.build(),
            Stage::Package => self.package().map(drop),
        };
        result.map_err(|source| LifecycleError { stage, source })?;

        info!(%stage, "stage finished");
        Ok(())
    }

    /// Run every stage once, in order, stopping at the first failure.
    pub fn run(&mut self) -> Result<(), LifecycleError> {
        for stage in Stage::ALL {
            self.run_stage(stage)?;
        }
        Ok(())
    }

    fn fingerprint(&self) -> Result<String, StageRecordError> {
        record::fingerprint(&self.manifest, &self.settings)
    }

    fn current_record(&self) -> Result<Option<StageRecord>, StageRecordError> {
        StageRecord::load_current(&self.layout.build_folder, &self.fingerprint()?)
    }

    fn request(&self) -> BuildRequest {
        BuildRequest {
            source_folder: self.layout.root.clone(),
            build_folder: self.layout.build_folder.clone(),
            toolchain_file: self.layout.generators_folder.join(TOOLCHAIN_FILE),
            build_type: self.settings.build_type.clone(),
            package_folder: self.layout.package_folder.clone(),
        }
    }
}

fn log_output(step: &str, output: &ToolOutput) {
    for line in output.stdout.lines().chain(output.stderr.lines()) {
        debug!(step, "{line}");
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).map_or(true, |mut entries| entries.next().is_none())
}
