//! Result-cache plugin configuration.
//!
//! An external cache plugin can short-circuit parts of a build. This
//! module models the configuration contract for that integration: the
//! [`CacheDescriptor`] names the plugin (loaded by path or supplied as
//! an instance), anchors it to entry points or a built graph (never
//! both), and carries free-form settings. The descriptor is validated
//! at construction and immutable afterwards; loading and invoking the
//! plugin's code happens in the host, not here.

mod descriptor;
mod plugin;

pub use descriptor::{CacheDescriptor, CacheScope, DescriptorError, EntryPoint, PluginSource};
pub use plugin::CachePlugin;
