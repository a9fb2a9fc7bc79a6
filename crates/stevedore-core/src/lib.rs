//! # stevedore-core
//!
//! Core data model shared across all Stevedore crates.
//!
//! This crate provides:
//! - The `Pkg` package descriptor with its tristate install states
//! - `PkgRel` weak dependency relations keyed by base fingerprint
//! - The `PkgIndex` fingerprint index owning one resolution universe
//! - Chart payload handling and content hashing
//! - The unified `SolverError` type
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: core data types (`Pkg`, `PkgRel`, `Chart`, ...)
//! - `index`: the fingerprint index and version-range resolution
//! - `error`: error types and result aliases

pub mod error;
pub mod index;
pub mod types;

// Re-export commonly used types
pub use error::{SolverError, SolverResult};
pub use index::{PkgIndex, VersionPolicy};
pub use types::{
    base_fingerprint_of, Blake3Hasher, Chart, ChartHasher, ChartManifest, DependencyDecl, Pkg,
    PkgRel, PkgState,
};
