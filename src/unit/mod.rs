//! Build unit types for buildscope.
//!
//! This module defines the representation of one evaluated build unit
//! (project path, tools version, global configuration properties) and
//! the [`ConfigurationKey`] projection that identifies a unit's
//! configuration inside the graph.
//!
//! Evaluation itself (parsing build definitions, computing properties)
//! happens upstream; buildscope consumes already-evaluated units.

mod types;

pub use types::{BuildUnit, ConfigurationKey, GlobalProperties};

pub(crate) use types::format_properties;
