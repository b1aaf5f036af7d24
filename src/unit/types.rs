//! Shared types for evaluated build units.
//!
//! This module defines the core data structures used to represent
//! an evaluated build unit and its configuration identity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Global configuration properties of a build unit.
///
/// Stored as an ordered map so that two units evaluated with the same
/// properties compare equal regardless of insertion order, and so the
/// projection into a [`ConfigurationKey`] can be hashed.
pub type GlobalProperties = BTreeMap<String, String>;

/// Represents a single evaluated build unit.
///
/// A build unit is one project/module participating in the dependency
/// graph. Its identity is the combination of full path, tools version,
/// and global configuration properties; the graph creates exactly one
/// node per distinct combination.
///
/// # Example
///
/// ```rust
/// use buildscope::unit::BuildUnit;
///
/// let unit = BuildUnit::new("apps/web/web.proj", "17.0");
/// assert_eq!(unit.tools_version, "17.0");
/// assert!(unit.global_properties.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildUnit {
    /// Full path to the unit's project file.
    pub full_path: PathBuf,

    /// Tools version the unit was evaluated with (e.g., "17.0").
    pub tools_version: String,

    /// Global configuration properties (e.g., target platform).
    pub global_properties: GlobalProperties,
}

impl BuildUnit {
    /// Creates a new build unit with no global properties.
    pub fn new(full_path: impl Into<PathBuf>, tools_version: impl Into<String>) -> Self {
        Self {
            full_path: full_path.into(),
            tools_version: tools_version.into(),
            global_properties: GlobalProperties::new(),
        }
    }

    /// Creates a new build unit with the given global properties.
    pub fn with_properties(
        full_path: impl Into<PathBuf>,
        tools_version: impl Into<String>,
        global_properties: GlobalProperties,
    ) -> Self {
        Self {
            full_path: full_path.into(),
            tools_version: tools_version.into(),
            global_properties,
        }
    }

    /// Sets a single global property, replacing any previous value.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.global_properties.insert(key.into(), value.into());
    }

    /// Looks up a global property by key.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.global_properties.get(key).map(String::as_str)
    }

    /// Returns the path to the unit's project file.
    pub fn path(&self) -> &Path {
        &self.full_path
    }

    /// Projects this unit's identity into a [`ConfigurationKey`].
    ///
    /// The key is derived on demand and never stored; it is what the
    /// graph uses to look up or deduplicate nodes.
    ///
    /// # Example
    ///
    /// ```rust
    /// use buildscope::unit::BuildUnit;
    ///
    /// let mut debug = BuildUnit::new("lib/core.proj", "17.0");
    /// debug.set_property("Configuration", "Debug");
    ///
    /// let mut release = BuildUnit::new("lib/core.proj", "17.0");
    /// release.set_property("Configuration", "Release");
    ///
    /// assert_ne!(debug.configuration_key(), release.configuration_key());
    /// ```
    pub fn configuration_key(&self) -> ConfigurationKey {
        ConfigurationKey {
            full_path: self.full_path.clone(),
            global_properties: self.global_properties.clone(),
        }
    }
}

impl fmt::Display for BuildUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_path.display())?;
        if !self.global_properties.is_empty() {
            write!(f, " ({})", format_properties(&self.global_properties))?;
        }
        Ok(())
    }
}

/// The configuration identity of a build unit.
///
/// A projection of `(full path, global properties)` used to look up or
/// deduplicate nodes. Two units with the same path but different global
/// properties (e.g., Debug vs Release) produce distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigurationKey {
    /// Full path to the unit's project file.
    pub full_path: PathBuf,

    /// Global configuration properties.
    pub global_properties: GlobalProperties,
}

impl ConfigurationKey {
    /// Creates a configuration key directly from its parts.
    pub fn new(full_path: impl Into<PathBuf>, global_properties: GlobalProperties) -> Self {
        Self {
            full_path: full_path.into(),
            global_properties,
        }
    }
}

impl fmt::Display for ConfigurationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_path.display())?;
        if !self.global_properties.is_empty() {
            write!(f, " ({})", format_properties(&self.global_properties))?;
        }
        Ok(())
    }
}

/// Formats a property map as `key=value, key=value`.
pub(crate) fn format_properties(properties: &GlobalProperties) -> String {
    properties
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(", ")
}
