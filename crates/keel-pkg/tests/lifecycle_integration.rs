//! Integration tests for the package lifecycle, driven by a recording driver

use std::fs;
use std::path::Path;

use keel_pkg::{
    BuildDriver, BuildError, BuildRequest, DependencyCache, Lifecycle, Manifest, PackageLayout,
    PackagingError, Settings, Stage, StageError, StageRecord, ToolOutput, TOOLCHAIN_FILE,
};
use tempfile::TempDir;

const COURSE: &str = r#"
[package]
name = "asio_course"
version = "1.0.0"
type = "application"
settings = ["os", "compiler", "build_type", "arch"]
exports-sources = ["CMakeLists.txt", "src/*"]

[requires]
asio = { version = "1.28.0", transitive-headers = true, transitive-libs = true }
fmt = { version = "10.0.0", transitive-headers = true, transitive-libs = true }
nlohmann_json = { version = "3.11.2", transitive-headers = true, transitive-libs = true }

[options."fmt/*"]
header_only = true
"#;

/// Records every call and optionally fails one step.
#[derive(Debug, Default)]
struct RecordingDriver {
    calls: Vec<&'static str>,
    fail_on: Option<&'static str>,
}

impl RecordingDriver {
    fn failing_on(step: &'static str) -> Self {
        Self {
            calls: Vec::new(),
            fail_on: Some(step),
        }
    }

    fn step(&mut self, step: &'static str) -> Result<ToolOutput, BuildError> {
        self.calls.push(step);
        if self.fail_on == Some(step) {
            return Err(BuildError::Failed {
                command: format!("cmake {step}"),
                code: Some(2),
                stdout: String::from("-- partial output\n"),
                stderr: String::from("CMake Error at CMakeLists.txt:3\n"),
            });
        }
        Ok(ToolOutput::default())
    }
}

impl BuildDriver for RecordingDriver {
    fn configure(&mut self, _request: &BuildRequest) -> Result<ToolOutput, BuildError> {
        self.step("configure")
    }

    fn build(&mut self, _request: &BuildRequest) -> Result<ToolOutput, BuildError> {
        self.step("build")
    }

    fn install(&mut self, request: &BuildRequest) -> Result<ToolOutput, BuildError> {
        let output = self.step("install")?;
        let bin = request.package_folder.join("bin");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("asio_course"), "").unwrap();
        Ok(output)
    }
}

fn settings() -> Settings {
    Settings {
        os: String::from("Linux"),
        compiler: String::from("gcc"),
        compiler_version: Some(String::from("13")),
        build_type: String::from("Release"),
        arch: String::from("x86_64"),
    }
}

fn lifecycle(root: &Path, driver: RecordingDriver) -> Lifecycle<RecordingDriver> {
    lifecycle_with(root, COURSE, driver)
}

fn lifecycle_with(
    root: &Path,
    manifest: &str,
    driver: RecordingDriver,
) -> Lifecycle<RecordingDriver> {
    fs::write(root.join("keel.toml"), manifest).unwrap();
    let manifest = Manifest::from_path(root.join("keel.toml")).unwrap();
    let layout = PackageLayout::discover(root, "Release").unwrap();
    Lifecycle::new(manifest, settings(), layout, driver)
        .with_cache(DependencyCache::new(root.join("keel-home")))
}

#[test]
fn test_full_run_executes_each_stage_once_in_order() {
    let tmp = TempDir::new().unwrap();
    let mut lifecycle = lifecycle(tmp.path(), RecordingDriver::default());

    lifecycle.run().unwrap();

    assert_eq!(lifecycle.driver().calls, ["configure", "build", "install"]);

    let record = StageRecord::load(&lifecycle.layout().build_folder)
        .unwrap()
        .unwrap();
    assert_eq!(record.completed, Stage::ALL);
    assert!(tmp.path().join("package/bin/asio_course").exists());
}

#[test]
fn test_generate_writes_descriptors_for_every_dependency() {
    let tmp = TempDir::new().unwrap();
    let lifecycle = lifecycle(tmp.path(), RecordingDriver::default());

    let files = lifecycle.generate().unwrap();
    assert_eq!(files.dependency_files.len(), 6);

    let generators = &lifecycle.layout().generators_folder;
    for name in ["asio", "fmt", "nlohmann_json"] {
        assert!(generators.join(format!("{name}-config.cmake")).exists());
        assert!(generators.join(format!("{name}-config-version.cmake")).exists());
    }

    let fmt = fs::read_to_string(generators.join("fmt-config.cmake")).unwrap();
    assert!(fmt.contains("fmt_OPTION_header_only"));
    let asio = fs::read_to_string(generators.join("asio-config.cmake")).unwrap();
    assert!(!asio.contains("_OPTION_"));
}

#[test]
fn test_toolchain_is_identical_across_runs() {
    let tmp = TempDir::new().unwrap();
    let lifecycle = lifecycle(tmp.path(), RecordingDriver::default());

    let toolchain = lifecycle.layout().generators_folder.join(TOOLCHAIN_FILE);
    lifecycle.generate().unwrap();
    let first = fs::read(&toolchain).unwrap();
    lifecycle.generate().unwrap();
    let second = fs::read(&toolchain).unwrap();

    assert_eq!(first, second);
    let text = String::from_utf8(first).unwrap();
    assert!(text.contains("set(KEEL_SETTINGS_OS \"Linux\")"));
    assert!(text.contains("set(KEEL_SETTINGS_COMPILER \"gcc\")"));
    assert!(text.contains("set(KEEL_SETTINGS_COMPILER_VERSION \"13\")"));
    assert!(text.contains("set(KEEL_SETTINGS_BUILD_TYPE \"Release\")"));
    assert!(text.contains("set(KEEL_SETTINGS_ARCH \"x86_64\")"));
}

#[test]
fn test_generate_failure_stops_before_build() {
    let tmp = TempDir::new().unwrap();
    // A regular file where the build folder should go makes output unwritable.
    fs::write(tmp.path().join("build"), "").unwrap();
    let mut lifecycle = lifecycle(tmp.path(), RecordingDriver::default());

    let err = lifecycle.run().unwrap_err();

    assert_eq!(err.stage, Stage::Generate);
    assert!(matches!(err.source, StageError::Generate(..)));
    assert!(lifecycle.driver().calls.is_empty());
}

#[test]
fn test_build_failure_surfaces_tool_output_and_skips_package() {
    let tmp = TempDir::new().unwrap();
    let mut lifecycle = lifecycle(tmp.path(), RecordingDriver::failing_on("build"));

    let err = lifecycle.run().unwrap_err();

    assert_eq!(err.stage, Stage::Build);
    let tool = err.source.tool_error().unwrap();
    assert_eq!(
        tool.diagnostics(),
        Some(("-- partial output\n", "CMake Error at CMakeLists.txt:3\n"))
    );
    assert_eq!(lifecycle.driver().calls, ["configure", "build"]);
    assert!(!tmp.path().join("package").exists());
}

#[test]
fn test_package_before_build_is_a_packaging_error() {
    let tmp = TempDir::new().unwrap();
    let mut lifecycle = lifecycle(tmp.path(), RecordingDriver::default());

    let err = lifecycle.run_stage(Stage::Package).unwrap_err();
    assert!(matches!(err.source, StageError::Packaging(..)));

    lifecycle.run_stage(Stage::Generate).unwrap();
    let err = lifecycle.run_stage(Stage::Package).unwrap_err();
    assert!(matches!(
        err.source,
        StageError::Packaging(PackagingError::NotBuilt)
    ));
    assert!(lifecycle.driver().calls.is_empty());
}

#[test]
fn test_build_requires_generate() {
    let tmp = TempDir::new().unwrap();
    let mut lifecycle = lifecycle(tmp.path(), RecordingDriver::default());

    let err = lifecycle.run_stage(Stage::Build).unwrap_err();
    assert!(matches!(
        err.source,
        StageError::OutOfOrder {
            stage: Stage::Build,
            missing: Stage::Generate
        }
    ));
}

#[test]
fn test_stages_can_run_as_separate_invocations() {
    let tmp = TempDir::new().unwrap();

    for stage in Stage::ALL {
        let mut lifecycle = lifecycle(tmp.path(), RecordingDriver::default());
        lifecycle.run_stage(stage).unwrap();
    }

    let record = StageRecord::load(&tmp.path().join("build/Release"))
        .unwrap()
        .unwrap();
    assert_eq!(record.completed, Stage::ALL);
}

#[test]
fn test_failed_install_is_a_packaging_error() {
    let tmp = TempDir::new().unwrap();
    let mut lifecycle = lifecycle(tmp.path(), RecordingDriver::failing_on("install"));

    let err = lifecycle.run().unwrap_err();
    assert_eq!(err.stage, Stage::Package);
    assert!(matches!(
        err.source,
        StageError::Packaging(PackagingError::Install(..))
    ));
}

#[test]
fn test_failed_rebuild_blocks_package() {
    let tmp = TempDir::new().unwrap();
    lifecycle(tmp.path(), RecordingDriver::default()).run().unwrap();

    let mut rebuild = lifecycle(tmp.path(), RecordingDriver::failing_on("build"));
    let err = rebuild.run_stage(Stage::Build).unwrap_err();
    assert_eq!(err.stage, Stage::Build);

    let mut package = lifecycle(tmp.path(), RecordingDriver::default());
    let err = package.run_stage(Stage::Package).unwrap_err();
    assert!(matches!(
        err.source,
        StageError::Packaging(PackagingError::NotBuilt)
    ));
    assert!(package.driver().calls.is_empty());

    let record = StageRecord::load(&tmp.path().join("build/Release"))
        .unwrap()
        .unwrap();
    assert_eq!(record.completed, [Stage::Requirements, Stage::Generate]);
}

#[test]
fn test_failed_install_forgets_earlier_package() {
    let tmp = TempDir::new().unwrap();
    lifecycle(tmp.path(), RecordingDriver::default()).run().unwrap();

    let mut repackage = lifecycle(tmp.path(), RecordingDriver::failing_on("install"));
    repackage.run_stage(Stage::Package).unwrap_err();

    let record = StageRecord::load(&tmp.path().join("build/Release"))
        .unwrap()
        .unwrap();
    assert!(record.has(Stage::Build));
    assert!(!record.has(Stage::Package));
}

#[test]
fn test_failed_regenerate_blocks_build_and_package() {
    let tmp = TempDir::new().unwrap();
    lifecycle(tmp.path(), RecordingDriver::default()).run().unwrap();

    // A regular file where the generators folder should go.
    let generators = tmp.path().join("build/Release/generators");
    fs::remove_dir_all(&generators).unwrap();
    fs::write(&generators, "").unwrap();

    let mut regenerate = lifecycle(tmp.path(), RecordingDriver::default());
    let err = regenerate.run_stage(Stage::Generate).unwrap_err();
    assert!(matches!(err.source, StageError::Generate(..)));

    let mut build = lifecycle(tmp.path(), RecordingDriver::default());
    let err = build.run_stage(Stage::Build).unwrap_err();
    assert!(matches!(err.source, StageError::OutOfOrder { .. }));

    let err = build.run_stage(Stage::Package).unwrap_err();
    assert!(matches!(
        err.source,
        StageError::Packaging(PackagingError::NotBuilt)
    ));
    assert!(build.driver().calls.is_empty());
}

#[test]
fn test_rebuild_succeeds_after_a_failed_build() {
    let tmp = TempDir::new().unwrap();
    let mut first = lifecycle(tmp.path(), RecordingDriver::failing_on("configure"));
    first.run().unwrap_err();

    let mut retry = lifecycle(tmp.path(), RecordingDriver::default());
    retry.run_stage(Stage::Build).unwrap();
    retry.run_stage(Stage::Package).unwrap();
    assert_eq!(retry.driver().calls, ["configure", "build", "install"]);
}

#[test]
fn test_edited_manifest_invalidates_generate() {
    let tmp = TempDir::new().unwrap();
    lifecycle(tmp.path(), RecordingDriver::default())
        .run_stage(Stage::Generate)
        .unwrap();

    let edited = COURSE.replace("header_only = true", "header_only = false");
    let mut build = lifecycle_with(tmp.path(), &edited, RecordingDriver::default());
    let err = build.run_stage(Stage::Build).unwrap_err();
    assert!(matches!(
        err.source,
        StageError::OutOfOrder {
            stage: Stage::Build,
            missing: Stage::Generate
        }
    ));
    assert!(build.driver().calls.is_empty());
}

#[test]
fn test_corrupt_record_means_not_built() {
    let tmp = TempDir::new().unwrap();
    lifecycle(tmp.path(), RecordingDriver::default()).run().unwrap();
    fs::write(tmp.path().join("build/Release/keel-stages.json"), "{ not json").unwrap();

    let mut package = lifecycle(tmp.path(), RecordingDriver::default());
    let err = package.run_stage(Stage::Package).unwrap_err();
    assert!(matches!(
        err.source,
        StageError::Packaging(PackagingError::NotBuilt)
    ));
}
