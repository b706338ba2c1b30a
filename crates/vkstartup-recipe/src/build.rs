//! Build step: compiles the library with cargo.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{RecipeError, Result};
use crate::options::{OptionSet, FPIC, SHARED};

/// The cargo invocation for one option set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub program: String,
    pub args: Vec<String>,
}

impl BuildPlan {
    /// Plan a release build of `package`.
    ///
    /// `shared` selects a `cdylib` over a `staticlib`; `fPIC` adds the PIC
    /// relocation model. An absent `fPIC` (Windows) adds nothing.
    pub fn new(package: &str, options: &OptionSet) -> Self {
        let crate_type = if options.flag(SHARED).unwrap_or(false) {
            "cdylib"
        } else {
            "staticlib"
        };

        let mut args: Vec<String> = [
            "rustc",
            "--release",
            "-p",
            package,
            "--lib",
            "--crate-type",
            crate_type,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        if options.flag(FPIC).unwrap_or(false) {
            args.extend(["--", "-C", "relocation-model=pic"].map(String::from));
        }

        Self {
            program: std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string()),
            args,
        }
    }

    /// Directory holding the produced artifacts.
    pub fn artifact_dir(workspace: &Path) -> PathBuf {
        workspace.join("target").join("release")
    }

    /// Run the plan in `workspace` and wait for it.
    pub fn run(&self, workspace: &Path) -> Result<PathBuf> {
        tracing::info!("Running {} {}", self.program, self.args.join(" "));

        let status = Command::new(&self.program)
            .args(&self.args)
            .current_dir(workspace)
            .status()
            .map_err(|source| RecipeError::BuildSpawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            tracing::error!("Build failed: {status}");
            return Err(RecipeError::BuildFailed {
                status: status.code(),
            });
        }

        Ok(Self::artifact_dir(workspace))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::options::OptionValue;

    fn options(shared: bool, fpic: Option<bool>) -> OptionSet {
        let bools = vec![OptionValue::Bool(true), OptionValue::Bool(false)];
        let mut allowed = BTreeMap::from([(SHARED.to_string(), bools.clone())]);
        let mut defaults = BTreeMap::from([(SHARED.to_string(), OptionValue::Bool(shared))]);
        if let Some(fpic) = fpic {
            allowed.insert(FPIC.to_string(), bools);
            defaults.insert(FPIC.to_string(), OptionValue::Bool(fpic));
        }
        OptionSet::new(allowed, defaults).unwrap()
    }

    #[test]
    fn static_pic_build() {
        let plan = BuildPlan::new("vkstartup", &options(false, Some(true)));
        assert_eq!(
            plan.args,
            vec![
                "rustc",
                "--release",
                "-p",
                "vkstartup",
                "--lib",
                "--crate-type",
                "staticlib",
                "--",
                "-C",
                "relocation-model=pic"
            ]
        );
    }

    #[test]
    fn shared_without_pic() {
        let plan = BuildPlan::new("vkstartup", &options(true, Some(false)));
        assert!(plan.args.contains(&"cdylib".to_string()));
        assert!(!plan.args.iter().any(|a| a.contains("relocation-model")));
    }

    #[test]
    fn missing_fpic_adds_nothing() {
        let plan = BuildPlan::new("vkstartup", &options(false, None));
        assert!(!plan.args.contains(&"--".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_status_is_an_error() {
        let plan = BuildPlan {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "exit 3".to_string()],
        };
        let dir = tempfile::tempdir().unwrap();
        let err = plan.run(dir.path()).unwrap_err();
        assert!(matches!(err, RecipeError::BuildFailed { status: Some(3) }));
        assert_eq!(err.to_string(), "Build failed with exit status 3");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let plan = BuildPlan {
            program: "vkstartup-no-such-build-tool".to_string(),
            args: Vec::new(),
        };
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            plan.run(dir.path()),
            Err(RecipeError::BuildSpawn { .. })
        ));
    }
}
