//! Dependency resolution engine for Stevedore.
//!
//! Turns root install/uninstall requests over a universe of chart packages
//! into a consistent assignment of final states and an ordered transaction
//! plan, or an exact account of why none exists.

pub mod builder;
pub mod graph;
pub mod plan;
pub mod solver;
pub mod state;

// Re-export main types
pub use builder::{BuildOptions, RelationBuilder};
pub use graph::DependencyGraph;
pub use plan::{Applier, TransactionPlan, TransactionPlanner};
pub use solver::{ResolutionOutcome, Solver, SolverOptions};
pub use state::{Resolution, StateResolver};
