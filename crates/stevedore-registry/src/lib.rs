//! Chart repository client for the Stevedore resolver.
//!
//! This crate defines the `ChartRepository` collaborator contract the
//! relation builder pulls missing dependencies through, plus two
//! implementations: an HTTP registry client with retry and caching, and an
//! in-memory repository for tests and offline use.

pub mod api;
pub mod client;
pub mod repository;

// Re-export main types
pub use api::{ChartEntry, DependencyEntry, FamilyDocument};
pub use client::{HttpRepository, RetryConfig};
pub use repository::{ArchiveRef, ChartRepository, MemoryRepository};
