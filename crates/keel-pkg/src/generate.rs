//! Generation of build-tool inputs.
//!
//! Two kinds of descriptors are written to the generators folder:
//! per-dependency CMake package configs (`<name>-config.cmake` and
//! `<name>-config-version.cmake`) and a toolchain file capturing the
//! settings tuple. A `CMakePresets.json` ties them to the build folder.
//!
//! Rendering is a pure function of its inputs, so regenerating with the
//! same manifest and settings yields byte-identical files.

use crate::cache::DependencyCache;
use crate::options::{ConfiguredRequirement, ConfiguredRequirements};
use crate::package::PackageLayout;
use crate::settings::{SettingKey, Settings};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Toolchain descriptor filename.
pub const TOOLCHAIN_FILE: &str = "keel_toolchain.cmake";

/// Presets filename.
pub const PRESETS_FILE: &str = "CMakePresets.json";

/// Errors that can occur while generating descriptors.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("cannot write {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render presets: {0}")]
    Presets(#[from] serde_json::Error),
}

/// Paths of everything a generate pass wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFiles {
    pub dependency_files: Vec<PathBuf>,
    pub toolchain: PathBuf,
    pub presets: PathBuf,
}

/// CMake wants forward slashes even on Windows.
fn cmake_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

/// Escape a value for use inside a quoted CMake argument.
fn cmake_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn cmake_system_name(os: &str) -> &str {
    match os {
        "Macos" => "Darwin",
        other => other,
    }
}

fn cmake_system_processor(arch: &str) -> &str {
    match arch {
        "armv8" => "aarch64",
        other => other,
    }
}

fn compilers(compiler: &str) -> Option<(&'static str, &'static str)> {
    match compiler {
        "gcc" => Some(("gcc", "g++")),
        "clang" | "apple-clang" => Some(("clang", "clang++")),
        "msvc" => Some(("cl", "cl")),
        _ => None,
    }
}

/// Render the toolchain descriptor for the consumed settings.
///
/// `CMAKE_SYSTEM_NAME` and `CMAKE_SYSTEM_PROCESSOR` are only set when the
/// target `os` or `arch` differs from `host`, since CMake treats any
/// explicit system name as a cross build.
#[must_use]
pub fn render_toolchain(
    settings: &Settings,
    host: &Settings,
    keys: &[SettingKey],
    generators: &Path,
) -> String {
    let mut out = String::new();
    out.push_str("# Generated by keel. Do not edit.\n");
    out.push_str("include_guard()\n\n");

    for (key, value) in settings.pairs(keys) {
        let var = key.replace('.', "_").to_uppercase();
        let _ = writeln!(out, "set(KEEL_SETTINGS_{var} {})", cmake_quote(&value));
    }
    out.push('\n');

    let cross = (keys.contains(&SettingKey::Os) && settings.os != host.os)
        || (keys.contains(&SettingKey::Arch) && settings.arch != host.arch);
    if cross {
        let _ = writeln!(
            out,
            "set(CMAKE_SYSTEM_NAME {})",
            cmake_quote(cmake_system_name(&settings.os))
        );
        let _ = writeln!(
            out,
            "set(CMAKE_SYSTEM_PROCESSOR {})",
            cmake_quote(cmake_system_processor(&settings.arch))
        );
    }
    if keys.contains(&SettingKey::Compiler) {
        if let Some((cc, cxx)) = compilers(&settings.compiler) {
            let _ = writeln!(out, "set(CMAKE_C_COMPILER \"{cc}\")");
            let _ = writeln!(out, "set(CMAKE_CXX_COMPILER \"{cxx}\")");
        }
    }
    if keys.contains(&SettingKey::BuildType) {
        let _ = writeln!(
            out,
            "set(CMAKE_BUILD_TYPE {} CACHE STRING \"Build type\" FORCE)",
            cmake_quote(&settings.build_type)
        );
    }

    out.push('\n');
    let _ = writeln!(
        out,
        "list(PREPEND CMAKE_PREFIX_PATH {})",
        cmake_quote(&cmake_path(generators))
    );
    let _ = writeln!(
        out,
        "list(PREPEND CMAKE_MODULE_PATH {})",
        cmake_quote(&cmake_path(generators))
    );
    out
}

/// Render `<name>-config.cmake` for one dependency.
///
/// `<name>::<name>` is what the package itself links against. The
/// propagation flags decide what `<name>::transitive` carries on to
/// consumers of the package: include directories with
/// `transitive-headers`, link directories and libraries with
/// `transitive-libs`. The matching `<name>_HEADERS_VISIBILITY` and
/// `<name>_LIBS_VISIBILITY` are `PUBLIC` or `PRIVATE` for use in
/// `target_link_libraries`.
#[must_use]
pub fn render_dependency_config(dep: &ConfiguredRequirement, cache: &DependencyCache) -> String {
    let name = dep.name();
    let reference = &dep.requirement.reference;
    let folder = cmake_path(&cache.package_folder(reference));
    let links = !dep.header_only();
    let headers_out = dep.requirement.transitive_headers;
    let libs_out = dep.requirement.transitive_libs && links;
    let visibility = |flag: bool| if flag { "PUBLIC" } else { "PRIVATE" };

    let mut out = String::new();
    let _ = writeln!(out, "# Generated by keel for {reference}. Do not edit.");
    let _ = writeln!(out, "set({name}_VERSION \"{}\")", reference.version);
    let _ = writeln!(out, "set({name}_PACKAGE_FOLDER {})", cmake_quote(&folder));
    let _ = writeln!(out, "set({name}_INCLUDE_DIRS \"${{{name}_PACKAGE_FOLDER}}/include\")");
    if links {
        let _ = writeln!(out, "set({name}_LIB_DIRS \"${{{name}_PACKAGE_FOLDER}}/lib\")");
    }
    let _ = writeln!(
        out,
        "set({name}_HEADERS_VISIBILITY {})",
        visibility(dep.requirement.transitive_headers)
    );
    let _ = writeln!(
        out,
        "set({name}_LIBS_VISIBILITY {})",
        visibility(dep.requirement.transitive_libs)
    );
    for (option, value) in &dep.options {
        let _ = writeln!(
            out,
            "set({name}_OPTION_{option} {})",
            cmake_quote(&value.to_string())
        );
    }

    out.push('\n');
    let target = format!("{name}::{name}");
    let _ = writeln!(out, "if(NOT TARGET {target})");
    let _ = writeln!(out, "    add_library({target} INTERFACE IMPORTED)");
    write_usage(&mut out, &target, name, true, links);
    let _ = writeln!(out, "endif()");

    let transitive = format!("{name}::transitive");
    let _ = writeln!(out, "if(NOT TARGET {transitive})");
    let _ = writeln!(out, "    add_library({transitive} INTERFACE IMPORTED)");
    write_usage(&mut out, &transitive, name, headers_out, libs_out);
    let _ = writeln!(out, "endif()");
    let _ = writeln!(out, "set({name}_FOUND TRUE)");
    out
}

/// Usage requirements of an imported target.
fn write_usage(out: &mut String, target: &str, name: &str, headers: bool, libs: bool) {
    if headers {
        let _ = writeln!(
            out,
            "    set_property(TARGET {target} PROPERTY INTERFACE_INCLUDE_DIRECTORIES \"${{{name}_INCLUDE_DIRS}}\")"
        );
    }
    if libs {
        let _ = writeln!(
            out,
            "    set_property(TARGET {target} PROPERTY INTERFACE_LINK_DIRECTORIES \"${{{name}_LIB_DIRS}}\")"
        );
        let _ = writeln!(
            out,
            "    set_property(TARGET {target} PROPERTY INTERFACE_LINK_LIBRARIES \"{name}\")"
        );
    }
}

/// Render `<name>-config-version.cmake` for one dependency.
///
/// Only the exact pinned version is reported as compatible.
#[must_use]
pub fn render_dependency_version(dep: &ConfiguredRequirement) -> String {
    let version = &dep.requirement.reference.version;
    format!(
        "# Generated by keel for {reference}. Do not edit.\n\
         set(PACKAGE_VERSION \"{version}\")\n\
         if(NOT PACKAGE_FIND_VERSION OR PACKAGE_FIND_VERSION VERSION_EQUAL PACKAGE_VERSION)\n\
         \x20   set(PACKAGE_VERSION_COMPATIBLE TRUE)\n\
         \x20   set(PACKAGE_VERSION_EXACT TRUE)\n\
         else()\n\
         \x20   set(PACKAGE_VERSION_UNSUITABLE TRUE)\n\
         endif()\n",
        reference = dep.requirement.reference,
    )
}

/// Render a `CMakePresets.json` pointing at the toolchain and build folder.
pub fn render_presets(settings: &Settings, layout: &PackageLayout) -> Result<String, serde_json::Error> {
    let name = format!("keel-{}", settings.build_type.to_lowercase());
    let toolchain = layout.generators_folder.join(TOOLCHAIN_FILE);
    let presets = serde_json::json!({
        "version": 3,
        "configurePresets": [{
            "name": name,
            "displayName": format!("keel {}", settings.build_type),
            "binaryDir": cmake_path(&layout.build_folder),
            "toolchainFile": cmake_path(&toolchain),
            "cacheVariables": {
                "CMAKE_BUILD_TYPE": settings.build_type,
                "CMAKE_INSTALL_PREFIX": cmake_path(&layout.package_folder),
            },
        }],
        "buildPresets": [{
            "name": name,
            "configurePreset": name,
        }],
    });
    let mut text = serde_json::to_string_pretty(&presets)?;
    text.push('\n');
    Ok(text)
}

fn write_file(path: PathBuf, content: &str) -> Result<PathBuf, GenerateError> {
    debug!(path = %path.display(), "writing");
    std::fs::write(&path, content).map_err(|source| GenerateError::FileSystem {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Write every descriptor into the layout's generators folder.
pub fn generate(
    configured: &ConfiguredRequirements,
    settings: &Settings,
    keys: &[SettingKey],
    layout: &PackageLayout,
    cache: &DependencyCache,
) -> Result<GeneratedFiles, GenerateError> {
    let generators = &layout.generators_folder;
    std::fs::create_dir_all(generators).map_err(|source| GenerateError::FileSystem {
        path: generators.clone(),
        source,
    })?;

    let mut dependency_files = Vec::with_capacity(configured.len() * 2);
    for dep in configured.iter() {
        dependency_files.push(write_file(
            generators.join(format!("{}-config.cmake", dep.name())),
            &render_dependency_config(dep, cache),
        )?);
        dependency_files.push(write_file(
            generators.join(format!("{}-config-version.cmake", dep.name())),
            &render_dependency_version(dep),
        )?);
    }

    let toolchain = write_file(
        generators.join(TOOLCHAIN_FILE),
        &render_toolchain(settings, &Settings::detect(), keys, generators),
    )?;
    let presets = write_file(
        generators.join(PRESETS_FILE),
        &render_presets(settings, layout)?,
    )?;

    Ok(GeneratedFiles {
        dependency_files,
        toolchain,
        presets,
    })
}
