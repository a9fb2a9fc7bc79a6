//! Registry API wire types.
//!
//! A registry serves one JSON index document per chart family, mapping
//! version strings to entries that carry the archive URL and the declared
//! dependencies.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Index document for one chart family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyDocument {
    /// Chart name
    pub name: String,
    /// version string -> entry
    pub versions: HashMap<String, ChartEntry>,
}

/// One published chart version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartEntry {
    /// Version string
    pub version: String,
    /// Archive download URL
    pub archive: String,
    /// Payload digest, if the registry publishes one
    pub digest: Option<String>,
    /// Default install namespace declared by the chart
    pub namespace: Option<String>,
    /// Declared dependencies
    #[serde(default)]
    pub dependencies: Vec<DependencyEntry>,
}

/// A dependency declaration as published in the index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEntry {
    pub name: String,
    /// Semver range expression
    pub range: String,
    #[serde(default)]
    pub optional: bool,
    /// Target namespace override
    pub namespace: Option<String>,
}
