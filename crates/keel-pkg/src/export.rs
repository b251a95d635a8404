//! Exporting the sources that belong to a package.

use crate::package::MANIFEST_FILE;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while exporting sources.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("invalid export pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("cannot read exported path: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("cannot export {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError {
    let path = path.to_path_buf();
    move |source| ExportError::Io { path, source }
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), ExportError> {
    for entry in std::fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.is_dir() {
            walk(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// Files matched by `patterns`, relative to `root` and sorted.
///
/// A pattern matching a directory exports everything below it.
pub fn collect_exports(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, ExportError> {
    let mut exported = BTreeSet::new();

    for pattern in patterns {
        let full = root.join(pattern);
        let mut matched = false;

        for entry in glob::glob(&full.to_string_lossy())? {
            let path = entry?;
            matched = true;

            let mut files = Vec::new();
            if path.is_dir() {
                walk(&path, &mut files)?;
            } else {
                files.push(path);
            }

            for file in files {
                if let Ok(relative) = file.strip_prefix(root) {
                    exported.insert(relative.to_path_buf());
                }
            }
        }

        if !matched {
            warn!(%pattern, "export pattern matches no files");
        }
    }

    Ok(exported.into_iter().collect())
}

/// Copy the manifest and every exported file into `dest`, preserving
/// relative paths. Returns the copied paths relative to `dest`.
pub fn export_sources(
    root: &Path,
    patterns: &[String],
    dest: &Path,
) -> Result<Vec<PathBuf>, ExportError> {
    let mut files = collect_exports(root, patterns)?;
    let manifest = PathBuf::from(MANIFEST_FILE);
    if !files.contains(&manifest) {
        files.insert(0, manifest);
    }

    for relative in &files {
        let from = root.join(relative);
        let to = dest.join(relative);
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        debug!(from = %from.display(), to = %to.display(), "exporting");
        std::fs::copy(&from, &to).map_err(io_error(&from))?;
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project(root: &Path) {
        fs::create_dir_all(root.join("src/net")).unwrap();
        fs::write(root.join(MANIFEST_FILE), "[package]\n").unwrap();
        fs::write(root.join("CMakeLists.txt"), "project(app)\n").unwrap();
        fs::write(root.join("src/main.cpp"), "int main() {}\n").unwrap();
        fs::write(root.join("src/net/session.hpp"), "#pragma once\n").unwrap();
        fs::write(root.join("notes.txt"), "not exported\n").unwrap();
    }

    fn patterns() -> Vec<String> {
        vec![String::from("CMakeLists.txt"), String::from("src/*")]
    }

    #[test]
    fn collects_matching_files_recursively() {
        let tmp = TempDir::new().unwrap();
        project(tmp.path());

        let files = collect_exports(tmp.path(), &patterns()).unwrap();
        assert_eq!(
            files,
            [
                PathBuf::from("CMakeLists.txt"),
                PathBuf::from("src/main.cpp"),
                PathBuf::from("src/net/session.hpp"),
            ]
        );
    }

    #[test]
    fn export_copies_manifest_and_sources() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("app");
        let dest = tmp.path().join("out");
        project(&src);

        let copied = export_sources(&src, &patterns(), &dest).unwrap();
        assert_eq!(copied.len(), 4);
        assert!(dest.join(MANIFEST_FILE).exists());
        assert!(dest.join("src/net/session.hpp").exists());
        assert!(!dest.join("notes.txt").exists());
    }

    #[test]
    fn unmatched_pattern_exports_nothing() {
        let tmp = TempDir::new().unwrap();
        project(tmp.path());
        let files = collect_exports(tmp.path(), &[String::from("include/*")]).unwrap();
        assert!(files.is_empty());
    }
}
