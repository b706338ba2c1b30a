//! Build options and their configuration per target platform.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{RecipeError, Result};

/// Name of the position independent code option.
pub const FPIC: &str = "fPIC";
/// Name of the shared/static library option.
pub const SHARED: &str = "shared";

/// Operating system the package is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetOs {
    Windows,
    Linux,
    Macos,
    Android,
    FreeBsd,
}

impl TargetOs {
    /// The OS this binary was compiled for.
    pub const fn host() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Macos
        } else if cfg!(target_os = "android") {
            Self::Android
        } else if cfg!(target_os = "freebsd") {
            Self::FreeBsd
        } else {
            Self::Linux
        }
    }

    /// Whether position independent code is meaningless on this OS.
    pub const fn ignores_fpic(self) -> bool {
        matches!(self, Self::Windows)
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Windows => "Windows",
            Self::Linux => "Linux",
            Self::Macos => "Macos",
            Self::Android => "Android",
            Self::FreeBsd => "FreeBSD",
        };
        f.write_str(name)
    }
}

impl FromStr for TargetOs {
    type Err = RecipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "windows" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "macos" | "darwin" => Ok(Self::Macos),
            "android" => Ok(Self::Android),
            "freebsd" => Ok(Self::FreeBsd),
            other => Err(RecipeError::InvalidMetadata(format!(
                "unknown operating system '{other}'"
            ))),
        }
    }
}

/// Value of a build option.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Text(String),
}

impl OptionValue {
    /// Parse a command line value. `true`/`false` become booleans.
    pub fn parse(value: &str) -> Self {
        match value {
            "true" | "True" => Self::Bool(true),
            "false" | "False" => Self::Bool(false),
            other => Self::Text(other.to_string()),
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Configured option values together with the values each option allows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionSet {
    values: BTreeMap<String, OptionValue>,
    allowed: BTreeMap<String, Vec<OptionValue>>,
}

impl OptionSet {
    /// Create a set from allowed values and defaults.
    ///
    /// Every option needs a default, and every default must be allowed.
    pub fn new(
        allowed: BTreeMap<String, Vec<OptionValue>>,
        defaults: BTreeMap<String, OptionValue>,
    ) -> Result<Self> {
        for name in defaults.keys() {
            if !allowed.contains_key(name) {
                return Err(RecipeError::InvalidMetadata(format!(
                    "default given for undeclared option '{name}'"
                )));
            }
        }

        let mut set = Self {
            values: BTreeMap::new(),
            allowed,
        };
        for name in set.allowed.keys() {
            if !defaults.contains_key(name) {
                return Err(RecipeError::InvalidMetadata(format!(
                    "option '{name}' has no default value"
                )));
            }
        }
        for (name, value) in defaults {
            set.set(&name, value)?;
        }
        Ok(set)
    }

    /// Set `name` from a command line string.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        self.set(name, OptionValue::parse(value))
    }

    /// Set `name` to `value`. The option must exist and allow the value.
    pub fn set(&mut self, name: &str, value: OptionValue) -> Result<()> {
        let allowed = self
            .allowed
            .get(name)
            .ok_or_else(|| RecipeError::UnknownOption(name.to_string()))?;
        if !allowed.contains(&value) {
            return Err(RecipeError::InvalidOptionValue {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Drop an option entirely, e.g. one that does not apply to the target.
    pub fn remove(&mut self, name: &str) -> Option<OptionValue> {
        self.allowed.remove(name);
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    /// Boolean value of `name`, `None` if absent or not a boolean.
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(OptionValue::as_bool)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn allowed_values(&self, name: &str) -> Option<&[OptionValue]> {
        self.allowed.get(name).map(Vec::as_slice)
    }

    /// Options in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bools() -> Vec<OptionValue> {
        vec![OptionValue::Bool(true), OptionValue::Bool(false)]
    }

    fn standard() -> OptionSet {
        let allowed = BTreeMap::from([(SHARED.to_string(), bools()), (FPIC.to_string(), bools())]);
        let defaults = BTreeMap::from([
            (SHARED.to_string(), OptionValue::Bool(false)),
            (FPIC.to_string(), OptionValue::Bool(true)),
        ]);
        OptionSet::new(allowed, defaults).unwrap()
    }

    #[test]
    fn defaults_are_applied() {
        let options = standard();
        assert_eq!(options.flag(SHARED), Some(false));
        assert_eq!(options.flag(FPIC), Some(true));
        assert_eq!(options.len(), 2);
    }

    #[test]
    fn set_option_parses_booleans() {
        let mut options = standard();
        options.set_option(SHARED, "true").unwrap();
        assert_eq!(options.flag(SHARED), Some(true));
        options.set_option(SHARED, "False").unwrap();
        assert_eq!(options.flag(SHARED), Some(false));
    }

    #[test]
    fn unknown_option_rejected() {
        let mut options = standard();
        let err = options.set_option("lto", "true").unwrap_err();
        assert!(matches!(err, RecipeError::UnknownOption(name) if name == "lto"));
    }

    #[test]
    fn disallowed_value_rejected() {
        let mut options = standard();
        let err = options.set_option(FPIC, "maybe").unwrap_err();
        assert!(matches!(
            err,
            RecipeError::InvalidOptionValue { name, value } if name == FPIC && value == "maybe"
        ));
        assert_eq!(options.flag(FPIC), Some(true));
    }

    #[test]
    fn removed_option_cannot_be_set() {
        let mut options = standard();
        assert_eq!(options.remove(FPIC), Some(OptionValue::Bool(true)));
        assert!(!options.contains(FPIC));
        assert!(options.set_option(FPIC, "true").is_err());
    }

    #[test]
    fn defaults_must_be_allowed_and_complete() {
        let allowed = BTreeMap::from([(SHARED.to_string(), bools())]);

        let bad_value = BTreeMap::from([(SHARED.to_string(), OptionValue::parse("static"))]);
        assert!(OptionSet::new(allowed.clone(), bad_value).is_err());

        let missing = BTreeMap::new();
        assert!(matches!(
            OptionSet::new(allowed.clone(), missing),
            Err(RecipeError::InvalidMetadata(_))
        ));

        let undeclared = BTreeMap::from([
            (SHARED.to_string(), OptionValue::Bool(true)),
            (FPIC.to_string(), OptionValue::Bool(true)),
        ]);
        assert!(OptionSet::new(allowed, undeclared).is_err());
    }

    #[test]
    fn target_os_parsing() {
        assert_eq!("Windows".parse::<TargetOs>().unwrap(), TargetOs::Windows);
        assert_eq!("darwin".parse::<TargetOs>().unwrap(), TargetOs::Macos);
        assert!("plan9".parse::<TargetOs>().is_err());
        assert!(TargetOs::Windows.ignores_fpic());
        assert!(!TargetOs::Linux.ignores_fpic());
    }
}
