//! Cache descriptor construction and validation.
//!
//! A descriptor is the immutable configuration value handed to the
//! plugin host: which plugin to use (loaded by path or already
//! instantiated), which entry points the cache should anchor to
//! (explicit list or derived from a built graph), and free-form
//! settings. All invariants are enforced at construction; a descriptor
//! that exists is valid.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use super::plugin::CachePlugin;
use crate::graph::BuildGraph;
use crate::unit::{format_properties, GlobalProperties};

/// Errors rejected at descriptor construction time.
///
/// These are configuration errors reported synchronously to the caller,
/// with a message identifying which of the mutually exclusive inputs
/// was mis-supplied.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    /// Both explicit entry points and a graph were supplied.
    #[error(
        "cache descriptor was given both explicit entry points and a build graph; \
         supply exactly one of the two"
    )]
    AmbiguousScope,

    /// Neither explicit entry points nor a graph was supplied.
    #[error(
        "cache descriptor needs either explicit entry points or a build graph; \
         neither was supplied (an empty entry-point list counts as absent)"
    )]
    MissingScope,
}

/// A build unit designated as a root for cache lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Path to the entry project file.
    pub path: PathBuf,

    /// Global configuration properties the entry is built with.
    pub global_properties: GlobalProperties,
}

impl EntryPoint {
    /// Creates an entry point with no global properties.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            global_properties: GlobalProperties::new(),
        }
    }

    /// Creates an entry point with the given global properties.
    pub fn with_properties(path: impl Into<PathBuf>, global_properties: GlobalProperties) -> Self {
        Self {
            path: path.into(),
            global_properties,
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        if !self.global_properties.is_empty() {
            write!(f, " ({})", format_properties(&self.global_properties))?;
        }
        Ok(())
    }
}

/// Where the plugin comes from.
#[derive(Clone)]
pub enum PluginSource {
    /// A plugin assembly to be loaded from disk by the host.
    Path(PathBuf),

    /// An already-instantiated plugin; the load step is bypassed.
    Instance(Arc<dyn CachePlugin>),
}

impl PluginSource {
    /// True when the plugin is loaded from a path rather than supplied
    /// as an instance.
    pub fn is_path_loaded(&self) -> bool {
        matches!(self, PluginSource::Path(_))
    }
}

impl fmt::Debug for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            PluginSource::Instance(plugin) => {
                f.debug_tuple("Instance").field(&plugin.name()).finish()
            }
        }
    }
}

/// What the cache anchors to: exactly one of the two.
///
/// Modeled as a tagged variant rather than two optional fields so the
/// exclusivity invariant is structural; an invalid combination cannot
/// be represented once construction succeeds.
#[derive(Debug, Clone)]
pub enum CacheScope {
    /// Explicit entry projects, in caller-supplied order.
    EntryPoints(Vec<EntryPoint>),

    /// A fully constructed build graph; entry points are its roots.
    Graph(Arc<BuildGraph>),
}

/// Validated configuration for initializing a result-cache plugin.
///
/// Immutable once constructed: construct, hand to the plugin host,
/// discard.
///
/// # Example
///
/// ```rust
/// use buildscope::cache::{CacheDescriptor, EntryPoint};
///
/// let descriptor = CacheDescriptor::from_plugin_path(
///     "plugins/cache.dll",
///     Some(vec![EntryPoint::new("app.proj")]),
///     None,
///     None,
/// )
/// .unwrap();
///
/// assert!(descriptor.is_path_loaded());
/// assert_eq!(descriptor.entry_points().len(), 1);
/// assert!(descriptor.settings().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct CacheDescriptor {
    source: PluginSource,
    scope: CacheScope,
    settings: HashMap<String, String>,
}

impl CacheDescriptor {
    /// Creates a descriptor for a plugin loaded from an assembly path.
    ///
    /// # Errors
    ///
    /// Returns a [`DescriptorError`] when both or neither of
    /// `entry_points` and `graph` are supplied; an empty entry-point
    /// list counts as absent.
    pub fn from_plugin_path(
        plugin_path: impl Into<PathBuf>,
        entry_points: Option<Vec<EntryPoint>>,
        graph: Option<Arc<BuildGraph>>,
        settings: Option<HashMap<String, String>>,
    ) -> Result<Self, DescriptorError> {
        Ok(Self {
            source: PluginSource::Path(plugin_path.into()),
            scope: resolve_scope(entry_points, graph)?,
            settings: settings.unwrap_or_default(),
        })
    }

    /// Creates a descriptor around an already-instantiated plugin,
    /// bypassing the load step.
    ///
    /// # Errors
    ///
    /// Same exclusivity rule as [`from_plugin_path`](Self::from_plugin_path).
    pub fn from_instance(
        plugin: Arc<dyn CachePlugin>,
        entry_points: Option<Vec<EntryPoint>>,
        graph: Option<Arc<BuildGraph>>,
        settings: Option<HashMap<String, String>>,
    ) -> Result<Self, DescriptorError> {
        Ok(Self {
            source: PluginSource::Instance(plugin),
            scope: resolve_scope(entry_points, graph)?,
            settings: settings.unwrap_or_default(),
        })
    }

    /// Where the plugin comes from.
    pub fn source(&self) -> &PluginSource {
        &self.source
    }

    /// What the cache anchors to.
    pub fn scope(&self) -> &CacheScope {
        &self.scope
    }

    /// Free-form plugin settings; empty when none were supplied, never
    /// absent.
    pub fn settings(&self) -> &HashMap<String, String> {
        &self.settings
    }

    /// True when the plugin is loaded from a path.
    pub fn is_path_loaded(&self) -> bool {
        self.source.is_path_loaded()
    }

    /// The concrete entry projects the cache anchors to.
    ///
    /// Explicit entry points are returned as supplied; a graph scope is
    /// projected through its root nodes (units nothing references),
    /// each becoming a `(path, properties)` pair.
    pub fn entry_points(&self) -> Vec<EntryPoint> {
        match &self.scope {
            CacheScope::EntryPoints(entries) => entries.clone(),
            CacheScope::Graph(graph) => graph
                .roots()
                .into_iter()
                .map(|id| {
                    let unit = graph.unit(id);
                    EntryPoint::with_properties(
                        unit.full_path.clone(),
                        unit.global_properties.clone(),
                    )
                })
                .collect(),
        }
    }
}

impl fmt::Display for CacheDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            PluginSource::Path(path) => {
                writeln!(f, "result cache plugin: loaded from {}", path.display())?
            }
            PluginSource::Instance(plugin) => {
                writeln!(f, "result cache plugin: instance '{}'", plugin.name())?
            }
        }

        match &self.scope {
            CacheScope::EntryPoints(_) => writeln!(f, "entry points (explicit):")?,
            CacheScope::Graph(_) => writeln!(f, "entry points (graph roots):")?,
        }
        for entry in self.entry_points() {
            writeln!(f, "  - {}", entry)?;
        }

        write!(f, "settings: {} entries", self.settings.len())
    }
}

/// The shared validator both constructors funnel through.
///
/// Exactly one of the two anchors must be supplied; an empty
/// entry-point list is normalized to absent before the check.
fn resolve_scope(
    entry_points: Option<Vec<EntryPoint>>,
    graph: Option<Arc<BuildGraph>>,
) -> Result<CacheScope, DescriptorError> {
    let entry_points = entry_points.filter(|entries| !entries.is_empty());
    match (entry_points, graph) {
        (Some(_), Some(_)) => Err(DescriptorError::AmbiguousScope),
        (Some(entries), None) => Ok(CacheScope::EntryPoints(entries)),
        (None, Some(graph)) => Ok(CacheScope::Graph(graph)),
        (None, None) => Err(DescriptorError::MissingScope),
    }
}
