//! Recipe error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, configuring, building or packaging.
#[derive(Error, Debug)]
pub enum RecipeError {
    /// Reading or writing a file failed.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The recipe is not valid TOML or does not match the schema.
    #[error("Failed to parse recipe: {0}")]
    Parse(#[from] toml::de::Error),

    /// The recipe parsed but its contents are inconsistent.
    #[error("Invalid recipe: {0}")]
    InvalidMetadata(String),

    /// The option is not declared by the recipe.
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    /// The value is not among the option's allowed values.
    #[error("Invalid value '{value}' for option '{name}'")]
    InvalidOptionValue { name: String, value: String },

    /// The build tool could not be started.
    #[error("Failed to run build tool '{program}': {source}")]
    BuildSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The build tool exited unsuccessfully.
    #[error("Build failed with exit status {}", describe_status(.status))]
    BuildFailed { status: Option<i32> },

    /// A copy rule pattern is not a valid wildcard pattern.
    #[error("Invalid copy pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// Walking a directory tree failed.
    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

impl RecipeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn describe_status(status: &Option<i32>) -> String {
    status.map_or_else(|| "unknown (terminated by signal)".to_string(), |code| code.to_string())
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RecipeError>;
