//! Packaging recipe for VkStartup.
//!
//! The recipe lives in `recipe.toml` at the workspace root. It declares the
//! package metadata, build options and their defaults, pinned upstream
//! dependencies and the copy rules that stage built artifacts into an
//! `include/`, `lib/`, `bin/` layout.

pub mod build;
pub mod error;
pub mod options;
pub mod package;
pub mod recipe;

pub use build::BuildPlan;
pub use error::{RecipeError, Result};
pub use options::{OptionSet, OptionValue, TargetOs, FPIC, SHARED};
pub use package::{stage, CopyRule, Tree};
pub use recipe::{BuildConfig, Dependency, PackageInfo, Recipe, RECIPE_FILE};
