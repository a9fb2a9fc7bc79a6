//! Weak dependency relations.
//!
//! A `PkgRel` points at a package *family* (base fingerprint), not at a
//! concrete descriptor: the concrete version is resolved lazily through the
//! fingerprint index, which can still grow while relations are being built.
//! This keeps the ownership graph acyclic by construction.

use semver::VersionReq;
use serde::{Deserialize, Serialize};

/// Directed, non-owning reference from a package to a dependency family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PkgRel {
    /// Base fingerprint (`name-namespace`) of the depended-upon family
    pub base_fingerprint: String,
    /// Range the resolved dependency's version must satisfy
    pub semver_range: VersionReq,
}

impl PkgRel {
    pub fn new(base_fingerprint: impl Into<String>, semver_range: VersionReq) -> Self {
        Self {
            base_fingerprint: base_fingerprint.into(),
            semver_range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let rel = PkgRel::new("db-ns", VersionReq::parse(">=2.0.0, <3.0.0").unwrap());
        let value = serde_json::to_value(&rel).unwrap();

        assert_eq!(value["BaseFingerprint"], "db-ns");
        assert_eq!(value["SemverRange"], ">=2.0.0, <3.0.0");
    }

    #[test]
    fn test_round_trip() {
        let rel = PkgRel::new("cache-prod", VersionReq::parse("^1.2").unwrap());
        let encoded = serde_json::to_string(&rel).unwrap();
        let decoded: PkgRel = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, rel);
    }
}
