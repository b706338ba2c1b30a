//! VkStartup packaging tool
//!
//! Reads `recipe.toml` and drives the package workflow: inspect metadata and
//! options, build the library with cargo and stage its artifacts.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p vkstartup-pack -- info
//! cargo run -p vkstartup-pack -- options --os windows
//! cargo run -p vkstartup-pack -- build --shared
//! cargo run -p vkstartup-pack -- package --build-dir target/release --out dist
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod cli;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vkstartup_recipe::{OptionSet, Recipe, TargetOs, FPIC, SHARED};

use crate::cli::{BuildCommand, Cli, Command, PackageCommand};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let recipe = Recipe::load(&cli.recipe)
        .with_context(|| format!("Failed to load recipe {}", cli.recipe.display()))?;
    let workspace = recipe_dir(&cli.recipe);

    match cli.command {
        Command::Info => print_info(&recipe),
        Command::Options(os) => {
            let target = os.target();
            print_options(target, &recipe.config_options(target)?);
        }
        Command::Requires => {
            for dependency in recipe.requires() {
                println!("{dependency}");
            }
        }
        Command::Build(build) => {
            let options = build_options(&recipe, &build)?;
            let artifacts = recipe.build(&options, &workspace)?;
            println!("{}", artifacts.display());
        }
        Command::Package(package) => run_package(&recipe, &workspace, &package)?,
    }

    Ok(())
}

/// Directory containing the recipe; the workspace that gets built.
fn recipe_dir(recipe: &Path) -> PathBuf {
    match recipe.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn print_info(recipe: &Recipe) {
    println!("{}", recipe.reference());
    let fields = [
        ("description", recipe.description.as_deref()),
        ("license", recipe.license.as_deref()),
        ("author", recipe.author.as_deref()),
        ("url", recipe.url.as_deref()),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("  {label}: {value}");
        }
    }
    println!("  settings: {}", recipe.settings.join(", "));
    println!("  exports: {}", recipe.exports_sources.join(", "));
    println!("  libs: {}", recipe.package_info().libs.join(", "));
}

fn print_options(os: TargetOs, options: &OptionSet) {
    println!("options for {os}:");
    for (name, value) in options.iter() {
        println!("  {name}={value}");
    }
}

/// Options for a build: platform defaults overridden by the command flags.
fn build_options(recipe: &Recipe, build: &BuildCommand) -> anyhow::Result<OptionSet> {
    let target = build.os.target();
    let mut options = recipe.config_options(target)?;
    if build.shared {
        options.set_option(SHARED, "true")?;
    }
    if build.no_fpic {
        if options.contains(FPIC) {
            options.set_option(FPIC, "false")?;
        } else {
            tracing::warn!("{FPIC} does not apply to {target}; ignoring --no-fpic");
        }
    }
    Ok(options)
}

fn run_package(recipe: &Recipe, workspace: &Path, package: &PackageCommand) -> anyhow::Result<()> {
    let source_root = package.source_root.as_deref().unwrap_or(workspace);
    let staged = recipe
        .package(source_root, &package.build_dir, &package.out)
        .with_context(|| format!("Failed to package into {}", package.out.display()))?;

    if staged.is_empty() {
        tracing::warn!("No artifacts matched; is {} a build directory?", package.build_dir.display());
    }
    for file in &staged {
        println!("{}", file.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OsArg;

    const RECIPE: &str = r#"
name = "VkStartup"
version = "0.1"

[options]
shared = [true, false]
fPIC = [true, false]

[default_options]
shared = false
fPIC = true
"#;

    fn build_command(os: TargetOs, shared: bool, no_fpic: bool) -> BuildCommand {
        BuildCommand {
            os: OsArg { os: Some(os) },
            shared,
            no_fpic,
        }
    }

    #[test]
    fn recipe_dir_of_bare_file_is_cwd() {
        assert_eq!(recipe_dir(Path::new("recipe.toml")), PathBuf::from("."));
        assert_eq!(
            recipe_dir(Path::new("some/dir/recipe.toml")),
            PathBuf::from("some/dir")
        );
    }

    #[test]
    fn flags_override_defaults() {
        let recipe: Recipe = RECIPE.parse().unwrap();
        let options = build_options(&recipe, &build_command(TargetOs::Linux, true, true)).unwrap();
        assert_eq!(options.flag(SHARED), Some(true));
        assert_eq!(options.flag(FPIC), Some(false));
    }

    #[test]
    fn no_fpic_ignored_on_windows() {
        let recipe: Recipe = RECIPE.parse().unwrap();
        let options =
            build_options(&recipe, &build_command(TargetOs::Windows, false, true)).unwrap();
        assert!(!options.contains(FPIC));
        assert_eq!(options.flag(SHARED), Some(false));
    }
}
