//! The recipe: package metadata, options, dependencies and copy rules.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::build::BuildPlan;
use crate::error::{RecipeError, Result};
use crate::options::{OptionSet, OptionValue, TargetOs, FPIC};
use crate::package::{stage, CopyRule};

/// Default recipe file name.
pub const RECIPE_FILE: &str = "recipe.toml";

/// A pinned upstream dependency, written `name/version`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Dependency {
    pub name: String,
    pub version: String,
}

impl FromStr for Dependency {
    type Err = RecipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((name, version))
                if !name.is_empty() && !version.is_empty() && !version.contains('/') =>
            {
                Ok(Self {
                    name: name.to_string(),
                    version: version.to_string(),
                })
            }
            _ => Err(RecipeError::InvalidMetadata(format!(
                "dependency reference '{s}' is not of the form name/version"
            ))),
        }
    }
}

impl TryFrom<String> for Dependency {
    type Error = RecipeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// What consumers link against.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct PackageInfo {
    #[serde(default)]
    pub libs: Vec<String>,
}

/// Which workspace member the build step compiles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub package: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            package: "vkstartup".to_string(),
        }
    }
}

/// A parsed and validated `recipe.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Settings the binary package varies on.
    #[serde(default)]
    pub settings: Vec<String>,
    /// Allowed values per option.
    #[serde(default)]
    pub options: BTreeMap<String, Vec<OptionValue>>,
    #[serde(default)]
    pub default_options: BTreeMap<String, OptionValue>,
    /// Source globs shipped with the recipe.
    #[serde(default)]
    pub exports_sources: Vec<String>,
    #[serde(default)]
    pub requires: Vec<Dependency>,
    #[serde(default)]
    pub build: BuildConfig,
    /// Copy rules of the package stage, applied in order.
    #[serde(default, rename = "package")]
    pub copy_rules: Vec<CopyRule>,
    #[serde(default)]
    pub package_info: PackageInfo,
}

impl Recipe {
    /// Load and validate a recipe file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| RecipeError::io(path, e))?;
        let recipe: Self = contents.parse()?;
        tracing::debug!("Loaded recipe {} {} from {}", recipe.name, recipe.version, path.display());
        Ok(recipe)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RecipeError::InvalidMetadata("name must not be empty".to_string()));
        }
        if self.version.trim().is_empty() {
            return Err(RecipeError::InvalidMetadata("version must not be empty".to_string()));
        }
        self.default_option_set().map(|_| ())
    }

    fn default_option_set(&self) -> Result<OptionSet> {
        OptionSet::new(self.options.clone(), self.default_options.clone())
    }

    /// Reference `name/version` of the package itself.
    pub fn reference(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }

    /// The default options as configured for `os`.
    ///
    /// `fPIC` does not apply on Windows and is removed there.
    pub fn config_options(&self, os: TargetOs) -> Result<OptionSet> {
        let mut options = self.default_option_set()?;
        if os.ignores_fpic() && options.remove(FPIC).is_some() {
            tracing::debug!("Removed option {FPIC} for {os}");
        }
        Ok(options)
    }

    /// Pinned upstream dependencies.
    pub fn requires(&self) -> &[Dependency] {
        &self.requires
    }

    /// Build the library in `workspace` with `options`.
    ///
    /// Returns the directory holding the artifacts.
    pub fn build(&self, options: &OptionSet, workspace: &Path) -> Result<PathBuf> {
        BuildPlan::new(&self.build.package, options).run(workspace)
    }

    /// Stage headers and binaries from `source_root` and `build_dir` into
    /// `staging` according to the copy rules.
    pub fn package(
        &self,
        source_root: &Path,
        build_dir: &Path,
        staging: &Path,
    ) -> Result<Vec<PathBuf>> {
        stage(&self.copy_rules, source_root, build_dir, staging)
    }

    pub fn package_info(&self) -> &PackageInfo {
        &self.package_info
    }
}

impl FromStr for Recipe {
    type Err = RecipeError;

    fn from_str(s: &str) -> Result<Self> {
        let recipe: Self = toml::from_str(s)?;
        recipe.validate()?;
        Ok(recipe)
    }
}
