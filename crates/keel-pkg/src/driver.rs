//! External build drivers.
//!
//! The lifecycle never compiles anything itself. It hands the generated
//! toolchain to a [`BuildDriver`], which runs the configure, build and
//! install steps of an external tool and reports failures verbatim.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Errors reported by a build driver.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed with {}", describe_exit(*code))]
    Failed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => String::from("no exit code (terminated by signal)"),
    }
}

impl BuildError {
    /// The tool's own output, unchanged.
    #[must_use]
    pub fn diagnostics(&self) -> Option<(&str, &str)> {
        match self {
            Self::Failed { stdout, stderr, .. } => Some((stdout.as_str(), stderr.as_str())),
            Self::Spawn { .. } => None,
        }
    }
}

/// Captured output of a successful tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Everything a driver needs to know about one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub source_folder: PathBuf,
    pub build_folder: PathBuf,
    pub toolchain_file: PathBuf,
    pub build_type: String,
    pub package_folder: PathBuf,
}

/// An external build tool.
pub trait BuildDriver {
    /// Configure the build tree from the generated toolchain.
    fn configure(&mut self, request: &BuildRequest) -> Result<ToolOutput, BuildError>;

    /// Build the configured tree.
    fn build(&mut self, request: &BuildRequest) -> Result<ToolOutput, BuildError>;

    /// Install build outputs into the package folder.
    fn install(&mut self, request: &BuildRequest) -> Result<ToolOutput, BuildError>;
}

/// Drives the `cmake` command line.
#[derive(Debug, Clone)]
pub struct CMakeDriver {
    program: PathBuf,
}

impl Default for CMakeDriver {
    fn default() -> Self {
        Self::new("cmake")
    }
}

struct CommandLine<'a> {
    program: &'a Path,
    args: &'a [String],
}

impl fmt::Display for CommandLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl CMakeDriver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[String], cwd: &Path) -> Result<ToolOutput, BuildError> {
        let command = CommandLine {
            program: &self.program,
            args,
        }
        .to_string();
        debug!(%command, cwd = %cwd.display(), "running build tool");

        let output = Command::new(&self.program)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|source| BuildError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(BuildError::Failed {
                command,
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

fn arg(path: &Path) -> String {
    path.display().to_string()
}

impl BuildDriver for CMakeDriver {
    fn configure(&mut self, request: &BuildRequest) -> Result<ToolOutput, BuildError> {
        let args = vec![
            String::from("-S"),
            arg(&request.source_folder),
            String::from("-B"),
            arg(&request.build_folder),
            format!("-DCMAKE_TOOLCHAIN_FILE={}", arg(&request.toolchain_file)),
            format!("-DCMAKE_BUILD_TYPE={}", request.build_type),
            format!("-DCMAKE_INSTALL_PREFIX={}", arg(&request.package_folder)),
        ];
        self.run(&args, &request.source_folder)
    }

    fn build(&mut self, request: &BuildRequest) -> Result<ToolOutput, BuildError> {
        let args = vec![
            String::from("--build"),
            arg(&request.build_folder),
            String::from("--config"),
            request.build_type.clone(),
        ];
        self.run(&args, &request.source_folder)
    }

    fn install(&mut self, request: &BuildRequest) -> Result<ToolOutput, BuildError> {
        let args = vec![
            String::from("--install"),
            arg(&request.build_folder),
            String::from("--config"),
            request.build_type.clone(),
            String::from("--prefix"),
            arg(&request.package_folder),
        ];
        self.run(&args, &request.source_folder)
    }
}
