//! Core data types for the Stevedore resolver.

pub mod chart;
pub mod package;
pub mod relation;

pub use chart::{Blake3Hasher, Chart, ChartHasher, ChartManifest, DependencyDecl};
pub use package::{base_fingerprint_of, mock_fingerprint, Pkg, PkgState};
pub use relation::PkgRel;
