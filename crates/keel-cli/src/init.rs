//! Package initialization for `keel init`.

use anyhow::{bail, Context, Result};
use keel_pkg::{Manifest, Package, PackageType, SettingKey, MANIFEST_FILE};
use std::path::Path;
use std::{env, fs};

/// Options for package initialization.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Create a library package instead of an application.
    pub lib: bool,

    /// Package name (defaults to directory name).
    pub name: Option<String>,
}

/// Initialize a new keel package in the current directory.
pub fn init_package(options: InitOptions) -> Result<()> {
    let current_dir = env::current_dir().context("Failed to get current directory")?;
    let manifest = init_in(&current_dir, options)?;

    println!(
        "Created {} `{}` package",
        manifest.package.package_type, manifest.package.name
    );
    Ok(())
}

/// Write a starter package into `root`.
fn init_in(root: &Path, options: InitOptions) -> Result<Manifest> {
    let manifest_path = root.join(MANIFEST_FILE);
    if manifest_path.exists() {
        bail!(
            "Cannot initialize: `{}` already exists in this directory",
            MANIFEST_FILE
        );
    }

    let name = match options.name {
        Some(n) => n,
        None => infer_package_name(root)?,
    };

    let manifest = create_manifest(&name, options.lib);
    manifest
        .validate()
        .with_context(|| format!("Cannot use `{name}` as a package name"))?;

    let manifest_content = manifest
        .to_toml_string()
        .context("Failed to serialize manifest")?;
    fs::write(&manifest_path, manifest_content).context("Failed to write keel.toml")?;

    write_template_sources(root, &name, options.lib)?;
    write_gitignore(root)?;

    Ok(manifest)
}

/// Infer the package name from the directory.
fn infer_package_name(dir: &Path) -> Result<String> {
    dir.file_name()
        .and_then(|n| n.to_str())
        .map(ToString::to_string)
        .context("Cannot infer package name from directory")
}

/// Create a default manifest with the given package name.
fn create_manifest(name: &str, lib: bool) -> Manifest {
    Manifest {
        package: Package {
            name: name.to_string(),
            version: String::from("0.1.0"),
            package_type: if lib {
                PackageType::Library
            } else {
                PackageType::Application
            },
            settings: SettingKey::ALL.to_vec(),
            exports_sources: vec![String::from("CMakeLists.txt"), String::from("src/*")],
            description: None,
            license: None,
        },
        ..Default::default()
    }
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Write CMakeLists.txt and a starter source file.
fn write_template_sources(root: &Path, name: &str, is_lib: bool) -> Result<()> {
    let src_dir = root.join("src");
    fs::create_dir_all(&src_dir).context("Failed to create src directory")?;

    let target = if is_lib {
        format!("add_library({name} src/{name}.cpp)\ninstall(TARGETS {name})\n")
    } else {
        format!("add_executable({name} src/main.cpp)\ninstall(TARGETS {name})\n")
    };
    let cmake = format!(
        "cmake_minimum_required(VERSION 3.15)\nproject({name} CXX)\n\n\
         set(CMAKE_CXX_STANDARD 17)\n\n{target}"
    );
    write_if_missing(&root.join("CMakeLists.txt"), &cmake)?;

    if is_lib {
        write_if_missing(
            &src_dir.join(format!("{name}.cpp")),
            "int add(int a, int b) { return a + b; }\n",
        )
    } else {
        write_if_missing(
            &src_dir.join("main.cpp"),
            "#include <cstdio>\n\nint main() {\n    std::puts(\"hello\");\n    return 0;\n}\n",
        )
    }
}

/// Write a .gitignore covering build and package folders.
fn write_gitignore(root: &Path) -> Result<()> {
    let content = "# keel build artifacts\n/build/\n/package/\n";
    write_if_missing(&root.join(".gitignore"), content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_application() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("net-course");
        fs::create_dir(&root).unwrap();

        init_in(&root, InitOptions::default()).unwrap();

        let manifest = Manifest::from_path(root.join(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest.package.name, "net-course");
        assert_eq!(manifest.package.package_type, PackageType::Application);
        assert!(root.join("src/main.cpp").exists());
        let cmake = fs::read_to_string(root.join("CMakeLists.txt")).unwrap();
        assert!(cmake.contains("add_executable(net-course src/main.cpp)"));
    }

    #[test]
    fn test_init_library_with_name() {
        let tmp = TempDir::new().unwrap();
        let options = InitOptions {
            lib: true,
            name: Some(String::from("netkit")),
        };

        let manifest = init_in(tmp.path(), options).unwrap();
        assert_eq!(manifest.package.package_type, PackageType::Library);
        assert!(tmp.path().join("src/netkit.cpp").exists());
    }

    #[test]
    fn test_init_refuses_existing_manifest() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(MANIFEST_FILE), "").unwrap();
        assert!(init_in(tmp.path(), InitOptions::default()).is_err());
    }

    #[test]
    fn test_init_rejects_invalid_name() {
        let tmp = TempDir::new().unwrap();
        let options = InitOptions {
            lib: false,
            name: Some(String::from("123app")),
        };
        assert!(init_in(tmp.path(), options).is_err());
        assert!(!tmp.path().join(MANIFEST_FILE).exists());
    }

    #[test]
    fn test_infer_package_name() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("my-project");
        fs::create_dir(&path).unwrap();

        let name = infer_package_name(&path).unwrap();
        assert_eq!(name, "my-project");
    }
}
