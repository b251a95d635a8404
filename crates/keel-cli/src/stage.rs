//! Lifecycle commands: `requirements`, `generate`, `build`, `package`,
//! `create`, plus `inspect` and `export`.

use crate::StageArgs;
use anyhow::{bail, Context, Result};
use keel_pkg::{
    CMakeDriver, Lifecycle, LifecycleError, Manifest, PackageLayout, Settings, Stage,
    MANIFEST_FILE,
};
use std::path::{Path, PathBuf};
use std::{env, fs};

/// The package root and the manifest file to read.
///
/// An explicit `--manifest-path` is read as given and its directory is the
/// package root. Otherwise `keel.toml` is searched for upward from the
/// current directory.
fn locate_manifest(manifest_path: Option<&Path>) -> Result<(PathBuf, PathBuf)> {
    if let Some(path) = manifest_path {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let root = dir.map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        return Ok((root, path.to_path_buf()));
    }

    let current_dir = env::current_dir().context("Failed to get current directory")?;
    let layout = PackageLayout::find_root(&current_dir, "Release")
        .with_context(|| format!("No {} found. Run `keel init` first.", MANIFEST_FILE))?;
    Ok((layout.root, layout.manifest_path))
}

fn load_manifest(path: &Path) -> Result<Manifest> {
    Manifest::from_path(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn load_lifecycle(manifest_path: Option<&Path>, args: &StageArgs) -> Result<Lifecycle<CMakeDriver>> {
    let (root, manifest_file) = locate_manifest(manifest_path)?;
    let manifest = load_manifest(&manifest_file)?;
    let settings = Settings::resolve(args.profile.as_deref(), &args.settings)
        .context("Failed to resolve settings")?;

    let mut layout = PackageLayout::new(&root, &settings.build_type);
    layout.manifest_path = manifest_file;
    if let Some(folder) = &args.package_folder {
        layout = layout.with_package_folder(folder);
    }

    Ok(Lifecycle::new(
        manifest,
        settings,
        layout,
        CMakeDriver::new(&args.cmake),
    ))
}

/// Print the failing tool's own output unchanged.
fn report_tool_output(err: &LifecycleError) {
    if let Some((stdout, stderr)) = err.source.tool_error().and_then(|e| e.diagnostics()) {
        eprint!("{stdout}");
        eprint!("{stderr}");
    }
}

/// Run `stages` in order, stopping at the first failure.
pub fn run_stages(manifest_path: Option<&Path>, args: &StageArgs, stages: &[Stage]) -> Result<()> {
    let mut lifecycle = load_lifecycle(manifest_path, args)?;
    let name = lifecycle.manifest().package.name.clone();
    println!("{} ({})", name, lifecycle.settings());

    for &stage in stages {
        if let Err(err) = lifecycle.run_stage(stage) {
            report_tool_output(&err);
            return Err(err.into());
        }
        println!("  {:<12} ok", stage.as_str());
    }

    if stages.contains(&Stage::Generate) {
        println!(
            "Generated files in {}",
            lifecycle.layout().generators_folder.display()
        );
    }
    if stages.contains(&Stage::Package) {
        println!(
            "Packaged `{}` into {}",
            name,
            lifecycle.layout().package_folder.display()
        );
    }

    Ok(())
}

/// Print the dependency set with propagation flags and applied options.
pub fn print_requirements(manifest_path: Option<&Path>, args: &StageArgs) -> Result<()> {
    let lifecycle = load_lifecycle(manifest_path, args)?;
    let requirements = lifecycle.declare_requirements()?;
    let configured = lifecycle.configure_options(&requirements)?;

    if configured.is_empty() {
        println!("No requirements declared.");
        return Ok(());
    }

    for entry in configured.iter() {
        let requirement = &entry.requirement;
        let mut flags = Vec::new();
        if requirement.transitive_headers {
            flags.push("transitive-headers");
        }
        if requirement.transitive_libs {
            flags.push("transitive-libs");
        }

        print!("{}", requirement.reference);
        if !flags.is_empty() {
            print!(" [{}]", flags.join(", "));
        }
        println!();

        for (option, value) in &entry.options {
            println!("    {option} = {value}");
        }
    }

    Ok(())
}

/// Print a summary of the manifest.
pub fn inspect(manifest_path: Option<&Path>) -> Result<()> {
    let (_, manifest_file) = locate_manifest(manifest_path)?;
    let manifest = load_manifest(&manifest_file)?;
    let package = &manifest.package;

    println!("name:     {}", package.name);
    println!("version:  {}", package.version);
    println!("type:     {}", package.package_type);
    let settings: Vec<&str> = package.settings.iter().map(|s| s.as_str()).collect();
    println!("settings: {}", settings.join(", "));
    if !package.exports_sources.is_empty() {
        println!("exports:  {}", package.exports_sources.join(", "));
    }
    println!("requires:");
    for (name, spec) in &manifest.requires {
        println!("    {}/{}", name, spec.version());
    }

    Ok(())
}

/// Copy the manifest and exported sources into `dest`.
pub fn export(manifest_path: Option<&Path>, dest: &Path) -> Result<()> {
    let (root, manifest_file) = locate_manifest(manifest_path)?;
    if manifest_file.file_name() != Some(std::ffi::OsStr::new(MANIFEST_FILE)) {
        bail!(
            "Cannot export {}: exported packages must use {}",
            manifest_file.display(),
            MANIFEST_FILE
        );
    }
    let manifest = load_manifest(&manifest_file)?;

    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    let files = keel_pkg::export_sources(&root, &manifest.package.exports_sources, dest)?;

    println!(
        "Exported {} file(s) of `{}` to {}",
        files.len(),
        manifest.package.name,
        dest.display()
    );
    Ok(())
}
