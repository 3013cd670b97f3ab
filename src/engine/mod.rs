//! Execution engine for gitops-stack
//!
//! The engine orchestrates:
//! 1. Diffing - Compare recorded state with the declaration graph
//! 2. Executing - Apply level by level with parallelism
//! 3. Recording - Persist outputs and exports to the state file

pub mod differ;
pub mod executor;
pub mod local;
pub mod state;

pub use executor::{ApplyOptions, apply};
pub use local::LocalEngine;
