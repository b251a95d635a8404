//! keel CLI - runs the build lifecycle of a keel package

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use keel_pkg::Stage;
use std::path::PathBuf;

mod init;
mod stage;

#[derive(Parser)]
#[command(name = "keel")]
#[command(version)]
#[command(about = "Manifest-driven build lifecycle for C and C++ packages", long_about = None)]
struct Cli {
    /// Show debug output, including build tool output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to keel.toml (defaults to searching upward from the current directory)
    #[arg(long, global = true)]
    manifest_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every lifecycle command.
#[derive(Args, Debug, Clone, Default)]
pub struct StageArgs {
    /// Profile file with a [settings] table
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Override a setting, e.g. `-s build_type=Debug` (repeatable)
    #[arg(short = 's', long = "settings", value_name = "KEY=VALUE")]
    pub settings: Vec<String>,

    /// Install prefix for the package stage
    #[arg(long)]
    pub package_folder: Option<PathBuf>,

    /// CMake executable used to build and install
    #[arg(long, default_value = "cmake")]
    pub cmake: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new keel package in the current directory
    Init {
        /// Create a library package instead of an application
        #[arg(long)]
        lib: bool,

        /// Set the package name (defaults to directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Show the manifest summary
    Inspect,

    /// Declare the dependency set and print it with applied options
    Requirements(StageArgs),

    /// Generate dependency and toolchain descriptors
    Generate(StageArgs),

    /// Configure and build with the generated toolchain
    Build(StageArgs),

    /// Install build outputs into the package folder
    Package(StageArgs),

    /// Run requirements, generate, build and package in order
    Create(StageArgs),

    /// Copy the manifest and exported sources into a directory
    Export {
        /// Destination directory
        dest: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let manifest_path = cli.manifest_path.as_deref();

    match cli.command {
        Commands::Init { lib, name } => {
            init::init_package(init::InitOptions { lib, name })?;
        }

        Commands::Inspect => {
            stage::inspect(manifest_path)?;
        }

        Commands::Requirements(args) => {
            stage::print_requirements(manifest_path, &args)?;
        }

        Commands::Generate(args) => {
            stage::run_stages(manifest_path, &args, &[Stage::Requirements, Stage::Generate])?;
        }

        Commands::Build(args) => {
            stage::run_stages(manifest_path, &args, &[Stage::Build])?;
        }

        Commands::Package(args) => {
            stage::run_stages(manifest_path, &args, &[Stage::Package])?;
        }

        Commands::Create(args) => {
            stage::run_stages(manifest_path, &args, &Stage::ALL)?;
        }

        Commands::Export { dest } => {
            stage::export(manifest_path, &dest)?;
        }
    }

    Ok(())
}
