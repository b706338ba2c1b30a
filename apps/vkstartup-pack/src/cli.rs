//! Command line interface of `vkstartup-pack`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vkstartup_recipe::{TargetOs, RECIPE_FILE};

/// vkstartup-pack - configure, build and package VkStartup
#[derive(Debug, Parser)]
#[command(name = "vkstartup-pack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the recipe
    #[arg(short, long, global = true, value_name = "FILE", default_value = RECIPE_FILE)]
    pub recipe: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show package metadata
    Info,

    /// Show the options configured for a platform
    Options(OsArg),

    /// List pinned dependencies
    Requires,

    /// Build the library
    Build(BuildCommand),

    /// Stage built artifacts into include/, lib/ and bin/
    Package(PackageCommand),
}

#[derive(Debug, Args)]
pub struct OsArg {
    /// Target operating system (defaults to the host)
    #[arg(long, value_name = "OS")]
    pub os: Option<TargetOs>,
}

impl OsArg {
    pub fn target(&self) -> TargetOs {
        self.os.unwrap_or_else(TargetOs::host)
    }
}

#[derive(Debug, Args)]
pub struct BuildCommand {
    #[command(flatten)]
    pub os: OsArg,

    /// Build a shared library instead of a static one
    #[arg(long)]
    pub shared: bool,

    /// Do not build position independent code
    #[arg(long)]
    pub no_fpic: bool,
}

#[derive(Debug, Args)]
pub struct PackageCommand {
    /// Directory holding the build artifacts
    #[arg(long, value_name = "DIR")]
    pub build_dir: PathBuf,

    /// Staging directory to create
    #[arg(long, value_name = "DIR")]
    pub out: PathBuf,

    /// Source tree for headers (defaults to the recipe's directory)
    #[arg(long, value_name = "DIR")]
    pub source_root: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn recipe_defaults_to_workspace_file() {
        let cli = Cli::try_parse_from(["vkstartup-pack", "info"]).unwrap();
        assert_eq!(cli.recipe, PathBuf::from(RECIPE_FILE));
        assert!(matches!(cli.command, Command::Info));
    }

    #[test]
    fn parse_options_for_windows() {
        let cli = Cli::try_parse_from(["vkstartup-pack", "options", "--os", "Windows"]).unwrap();
        let Command::Options(os) = cli.command else {
            panic!("expected options command");
        };
        assert_eq!(os.target(), TargetOs::Windows);
    }

    #[test]
    fn parse_build_flags() {
        let cli = Cli::try_parse_from([
            "vkstartup-pack",
            "--recipe",
            "other.toml",
            "build",
            "--os",
            "linux",
            "--shared",
            "--no-fpic",
        ])
        .unwrap();

        assert_eq!(cli.recipe, PathBuf::from("other.toml"));
        let Command::Build(build) = cli.command else {
            panic!("expected build command");
        };
        assert_eq!(build.os.target(), TargetOs::Linux);
        assert!(build.shared);
        assert!(build.no_fpic);
    }

    #[test]
    fn unknown_os_rejected() {
        assert!(Cli::try_parse_from(["vkstartup-pack", "options", "--os", "plan9"]).is_err());
    }

    #[test]
    fn package_requires_directories() {
        assert!(Cli::try_parse_from(["vkstartup-pack", "package", "--out", "dist"]).is_err());

        let cli = Cli::try_parse_from([
            "vkstartup-pack",
            "package",
            "--build-dir",
            "target/release",
            "--out",
            "dist",
        ])
        .unwrap();
        let Command::Package(package) = cli.command else {
            panic!("expected package command");
        };
        assert_eq!(package.build_dir, PathBuf::from("target/release"));
        assert!(package.source_root.is_none());
    }
}
