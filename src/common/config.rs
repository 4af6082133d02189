//! Generator configuration

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Lowest class file version the generator can target: `ldc` of class
/// constants needs 49.
pub const MIN_CLASS_VERSION: u16 = 49;
/// Highest class file version the generator can target. 50 and above expect
/// StackMapTable frames, which are not produced.
pub const MAX_CLASS_VERSION: u16 = 49;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generate guarded primitive fast paths and direct calls
    pub optimize_primitives: bool,
    /// Emit LineNumberTable attributes
    pub debug: bool,
    /// Major class file version
    pub class_version: u16,
    /// Names per `$createCallSiteArray_N` helper method
    pub max_call_sites_per_method: usize,
    /// User-facing errors collected before giving up
    pub max_errors: usize,
    /// Value of the SourceFile attribute
    pub source_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            optimize_primitives: true,
            debug: true,
            class_version: MIN_CLASS_VERSION,
            max_call_sites_per_method: 5000,
            max_errors: 100,
            source_file: None,
        }
    }
}

impl Config {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_CLASS_VERSION..=MAX_CLASS_VERSION).contains(&self.class_version) {
            return Err(Error::config(format!(
                "class_version {} is not supported (expected {})",
                self.class_version, MIN_CLASS_VERSION
            )));
        }
        if self.max_call_sites_per_method == 0 {
            return Err(Error::config("max_call_sites_per_method must be positive"));
        }
        if self.max_errors == 0 {
            return Err(Error::config("max_errors must be positive"));
        }
        Ok(())
    }

    /// Configuration with the primitive optimizations switched off
    pub fn unoptimized() -> Self {
        Self { optimize_primitives: false, ..Self::default() }
    }
}
