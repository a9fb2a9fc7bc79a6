//! The package descriptor and its tristate install states.
//!
//! A `Pkg` is the minimum unit the solver reasons about: one chart, one
//! version, one target namespace. Packages are unique per identity — the same
//! chart at two versions is two packages (prometheus-1.2.0 and
//! prometheus-1.3.0 are different packages).

use std::sync::Arc;

use semver::Version;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SolverResult;
use crate::types::chart::{Chart, ChartHasher};
use crate::types::relation::PkgRel;

/// Tristate install state of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PkgState {
    Unknown,
    Present,
    Absent,
}

impl PkgState {
    /// Wire code of this state (0/1/2)
    pub fn code(self) -> u8 {
        match self {
            PkgState::Unknown => 0,
            PkgState::Present => 1,
            PkgState::Absent => 2,
        }
    }

    /// Decode a wire code back into a state
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PkgState::Unknown),
            1 => Some(PkgState::Present),
            2 => Some(PkgState::Absent),
            _ => None,
        }
    }

    pub fn is_present(self) -> bool {
        self == PkgState::Present
    }
}

// The wire format pins states to integer codes, not variant names.
impl Serialize for PkgState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for PkgState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        PkgState::from_code(code)
            .ok_or_else(|| D::Error::custom(format!("invalid package state code {code}")))
    }
}

/// One concrete, versioned, deployable package.
///
/// Identity fields (`name`, `version`, `chart_hash`, `namespace`) are
/// write-once: set at construction, readable through accessors, and the sole
/// input to the fingerprint derivations. States are mutated by the state
/// resolver only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Pkg {
    /// Release name, or the chart's default release name
    name: String,
    /// Exact semantic version (never a range)
    version: Version,
    /// 64-bit content hash of the chart payload
    chart_hash: u64,
    /// Target install namespace
    namespace: String,
    /// Mandatory dependency relations
    pub depends_rel: Vec<PkgRel>,
    /// Optional dependency relations
    pub depends_optional_rel: Vec<PkgRel>,
    /// State the package is currently in
    pub current_state: PkgState,
    /// State the resolution decided the package should end in
    pub desired_state: PkgState,
    /// Opaque payload handle; owned here, inspected only for hashing
    #[serde(skip)]
    chart: Option<Arc<Chart>>,
}

/// Base fingerprint of a package family: identity minus version
pub fn base_fingerprint_of(name: &str, namespace: &str) -> String {
    format!("{name}-{namespace}")
}

/// Fingerprint a mock package would get (chart hash is always 0 for mocks)
pub fn mock_fingerprint(name: &str, version: &str, namespace: &str) -> String {
    format!("{name}-{version}-0-{namespace}")
}

impl Pkg {
    /// Create a new package, hashing the chart payload through `hasher`.
    ///
    /// A chartless package hashes to 0.
    pub fn new(
        name: impl Into<String>,
        version: Version,
        namespace: impl Into<String>,
        current_state: PkgState,
        desired_state: PkgState,
        chart: Option<Arc<Chart>>,
        hasher: &dyn ChartHasher,
    ) -> Self {
        let chart_hash = chart.as_deref().map(|c| hasher.hash(c)).unwrap_or(0);
        Self {
            name: name.into(),
            version,
            chart_hash,
            namespace: namespace.into(),
            depends_rel: Vec::new(),
            depends_optional_rel: Vec::new(),
            current_state,
            desired_state,
            chart,
        }
    }

    /// Create a chartless package with explicit relations and hash 0.
    /// Useful for testing.
    pub fn mock(
        name: impl Into<String>,
        version: Version,
        namespace: impl Into<String>,
        depends_rel: Vec<PkgRel>,
        depends_optional_rel: Vec<PkgRel>,
        current_state: PkgState,
        desired_state: PkgState,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            chart_hash: 0,
            namespace: namespace.into(),
            depends_rel,
            depends_optional_rel,
            current_state,
            desired_state,
            chart: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn chart_hash(&self) -> u64 {
        self.chart_hash
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn chart(&self) -> Option<&Arc<Chart>> {
        self.chart.as_ref()
    }

    /// Attach a payload to a descriptor that was created without one.
    /// The identity (including the already-computed hash) is unchanged.
    pub(crate) fn set_chart(&mut self, chart: Arc<Chart>) {
        self.chart = Some(chart);
    }

    /// Unique id of the package. Derived only from identity fields, so it is
    /// stable across process restarts.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.name, self.version, self.chart_hash, self.namespace
        )
    }

    /// Unique id of the package minus its version
    pub fn base_fingerprint(&self) -> String {
        base_fingerprint_of(&self.name, &self.namespace)
    }

    /// Whether this package has any built relations
    pub fn has_relations(&self) -> bool {
        !self.depends_rel.is_empty() || !self.depends_optional_rel.is_empty()
    }

    /// Serialize the package to its JSON wire form.
    ///
    /// String content round-trips verbatim: serde_json never HTML-escapes.
    pub fn to_json(&self) -> SolverResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a package from its JSON wire form (payload is not carried)
    pub fn from_json(encoded: &str) -> SolverResult<Pkg> {
        Ok(serde_json::from_str(encoded)?)
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Fingerprint determinism: stable across calls, sensitive to every
        // identity field
        #[test]
        fn fingerprint_determinism(
            name in "[a-z][a-z0-9-]{0,12}",
            ns in "[a-z][a-z0-9]{0,8}",
            major in 0u64..20,
            minor in 0u64..20,
            patch in 0u64..20,
        ) {
            let pkg = Pkg::mock(
                name.as_str(),
                Version::new(major, minor, patch),
                ns.as_str(),
                Vec::new(),
                Vec::new(),
                PkgState::Unknown,
                PkgState::Unknown,
            );

            prop_assert_eq!(pkg.fingerprint(), pkg.fingerprint());
            prop_assert_eq!(
                pkg.fingerprint(),
                format!("{}-{}.{}.{}-0-{}", name, major, minor, patch, ns)
            );

            let bumped = Pkg::mock(
                name.as_str(),
                Version::new(major, minor, patch + 1),
                ns.as_str(),
                Vec::new(),
                Vec::new(),
                PkgState::Unknown,
                PkgState::Unknown,
            );
            prop_assert_ne!(pkg.fingerprint(), bumped.fingerprint());
            prop_assert_eq!(pkg.base_fingerprint(), bumped.base_fingerprint());
        }
    }

    proptest! {
        // Encode/decode preserves identity for arbitrary names, including
        // characters JSON encoders like to escape
        #[test]
        fn json_round_trip_identity(name in "[a-z<>&'\" ]{1,16}") {
            let pkg = Pkg::mock(
                name.as_str(),
                Version::new(1, 0, 0),
                "ns",
                Vec::new(),
                Vec::new(),
                PkgState::Present,
                PkgState::Absent,
            );

            let decoded = Pkg::from_json(&pkg.to_json().unwrap()).unwrap();
            prop_assert_eq!(decoded.fingerprint(), pkg.fingerprint());
            prop_assert_eq!(decoded.current_state, PkgState::Present);
            prop_assert_eq!(decoded.desired_state, PkgState::Absent);
        }
    }
}
