//! # Declarative
//!
//! Declaration graphs for infrastructure provisioning.
//!
//! A program builds a [`DeclarationGraph`] by declaring resources in
//! program order. Inputs may be literal or [`Deferred`], meaning they are
//! only known once another declaration has been provisioned; every such
//! read becomes a dependency edge. An [`Engine`] then converges the graph
//! level by level.
//!
//! ## Core Concepts
//!
//! - **Declaration**: A named, typed request for one resource
//! - **Deferred**: A value produced by provisioning, combined with `apply`/`zip`
//! - **DeclarationGraph**: Declarations plus data, explicit and provider edges
//! - **ExecutionPlan**: Declarations grouped into concurrently applicable levels
//! - **Executor**: Applies levels in order, stopping at the first failure
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Declaration, DeclarationGraph, Deferred, ResourceKind};
//!
//! let mut graph = DeclarationGraph::new();
//! let cluster = graph.declare(
//!     Declaration::new("gitops", ResourceKind::Cluster).with("location", "us-east1"),
//! )?;
//! graph.declare(
//!     Declaration::new("pool", ResourceKind::NodePool)
//!         .with("cluster", Deferred::<String>::output(&cluster, "name"))
//!         .depends_on(&cluster),
//! )?;
//!
//! let execution = execute_simple(&graph, &engine, &ExecuteOptions::default())?;
//! ```
//!
//! ## Traits
//!
//! - [`Engine`]: Observes and provisions resolved declarations
//! - [`Transformation`]: Rewrites rendered objects before submission
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This keeps the crate free of any cloud SDK or UI framework.

pub mod context;
pub mod deferred;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use context::{
    AutoConfirm, AutoDecline, ConfirmCallback, Engine, NoProgress, Observed, ProgressCallback,
};
pub use deferred::{Deferred, Outputs, ResolvedOutputs};
pub use diff::{DiffSummary, ResourceDiff, compute_diffs, group_by_type};
pub use error::{Error, ErrorCategory, ResolveError, Result, TransformError};
pub use executor::{Execution, execute, execute_simple};
pub use graph::{DeclarationGraph, Edge, EdgeKind};
pub use planner::ExecutionPlan;
pub use resource::{Declaration, DeclarationId, Input, ResourceRequest, Transformation};
pub use types::{
    ApplyResult, Applied, ExecuteOptions, ExecuteSummary, ResourceKind, ResourceState,
};
