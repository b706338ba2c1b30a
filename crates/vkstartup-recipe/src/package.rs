//! Artifact staging.
//!
//! Copy rules select files by wildcard pattern below a source directory and
//! copy them into a destination directory of the staging area, either
//! keeping their relative path or flattened.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Deserializer};
use walkdir::{DirEntry, WalkDir};

use crate::error::{RecipeError, Result};

/// `*` and `?` cross directory separators, so `*.h` matches headers at any
/// depth below a rule's `src`.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// The tree a copy rule is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tree {
    /// The source checkout. Build output below it is never searched.
    Source,
    /// A cargo profile directory such as `target/release`. Only the final
    /// artifacts are searched, not cargo's intermediate outputs.
    Build,
}

impl Tree {
    const fn skipped_dirs(self) -> &'static [&'static str] {
        match self {
            Self::Source => &["target", ".git"],
            Self::Build => &["deps", "build", ".fingerprint", "incremental", "examples"],
        }
    }

    fn skips(self, name: &OsStr) -> bool {
        self.skipped_dirs().iter().any(|dir| name == OsStr::new(dir))
    }
}

/// One `copy` step of the package stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CopyRule {
    /// Wildcard pattern matched against the path relative to `src`.
    /// `*` matches any run of characters, `?` a single character.
    #[serde(deserialize_with = "deserialize_pattern")]
    pub pattern: Pattern,
    /// Directory to search, relative to the root being packaged.
    #[serde(default)]
    pub src: String,
    /// Destination directory inside the staging area.
    pub dst: String,
    /// Keep the path relative to `src`, or copy flat into `dst`.
    #[serde(default = "keep_path_default")]
    pub keep_path: bool,
}

const fn keep_path_default() -> bool {
    true
}

fn deserialize_pattern<'de, D>(deserializer: D) -> std::result::Result<Pattern, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    Pattern::new(&text).map_err(|e| {
        serde::de::Error::custom(format!("invalid copy pattern '{text}': {e}"))
    })
}

impl CopyRule {
    pub fn new(pattern: &str, dst: impl Into<String>) -> Result<Self> {
        let pattern = Pattern::new(pattern).map_err(|source| RecipeError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            pattern,
            src: String::new(),
            dst: dst.into(),
            keep_path: true,
        })
    }

    pub fn src(mut self, src: impl Into<String>) -> Self {
        self.src = src.into();
        self
    }

    pub const fn keep_path(mut self, keep: bool) -> Self {
        self.keep_path = keep;
        self
    }

    /// Whether `relative` (a path below `src`, `/` separated) matches.
    pub fn matches(&self, relative: &str) -> bool {
        self.pattern.matches_with(relative, MATCH_OPTIONS)
    }

    /// Copy every matching file below `root/src` into `staging/dst`.
    ///
    /// A missing `root/src` directory matches nothing. The staging area is
    /// never searched, even when it lies below `root`.
    pub fn apply(&self, root: &Path, tree: Tree, staging: &Path) -> Result<Vec<PathBuf>> {
        let search_root = root.join(&self.src);
        if !search_root.is_dir() {
            tracing::debug!(
                "Skipping '{}': {} does not exist",
                self.pattern,
                search_root.display()
            );
            return Ok(Vec::new());
        }

        let staging_dir = fs::canonicalize(staging).ok();
        let destination_root = staging.join(&self.dst);
        let mut copied = Vec::new();

        let walker = WalkDir::new(&search_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_pruned(entry, tree, staging_dir.as_deref()));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&search_root) else {
                continue;
            };
            if !self.pattern.matches_path_with(relative, MATCH_OPTIONS) {
                continue;
            }

            let destination = if self.keep_path {
                destination_root.join(relative)
            } else {
                destination_root.join(entry.file_name())
            };

            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(|e| RecipeError::io(parent, e))?;
            }
            fs::copy(entry.path(), &destination).map_err(|e| RecipeError::io(entry.path(), e))?;

            tracing::debug!("{} -> {}", entry.path().display(), destination.display());
            copied.push(destination);
        }

        Ok(copied)
    }
}

fn is_pruned(entry: &DirEntry, tree: Tree, staging_dir: Option<&Path>) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    if tree.skips(entry.file_name()) {
        tracing::trace!("Not searching {}", entry.path().display());
        return true;
    }
    staging_dir.is_some_and(|staging| {
        fs::canonicalize(entry.path()).is_ok_and(|path| path == staging)
    })
}

/// Apply `rules` to the source tree and then the build tree.
///
/// Returns the staged files, sorted and without duplicates. A file staged
/// from the build tree overwrites one with the same destination from the
/// source tree.
pub fn stage(
    rules: &[CopyRule],
    source_root: &Path,
    build_dir: &Path,
    staging: &Path,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(staging).map_err(|e| RecipeError::io(staging, e))?;

    let mut staged = BTreeSet::new();
    for (root, tree) in [(source_root, Tree::Source), (build_dir, Tree::Build)] {
        for rule in rules {
            staged.extend(rule.apply(root, tree, staging)?);
        }
    }

    tracing::info!("Staged {} files into {}", staged.len(), staging.display());
    Ok(staged.into_iter().collect())
}
