//! Engine and callback traits
//!
//! These traits let the declarative crate drive provisioning without
//! depending on a specific cloud SDK, state store or UI.

use anyhow::Result;

use crate::deferred::Outputs;
use crate::resource::{DeclarationId, ResourceRequest};
use crate::types::{ApplyResult, Applied, ResourceKind, ResourceState};

/// What an engine currently knows about one declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Observed {
    /// `Present { details }` carries the stored config fingerprint
    pub state: ResourceState,
    /// Outputs recorded by the last successful apply
    pub outputs: Option<Outputs>,
}

impl Observed {
    pub fn absent() -> Self {
        Self {
            state: ResourceState::Absent,
            outputs: None,
        }
    }

    pub fn present(fingerprint: impl Into<String>, outputs: Outputs) -> Self {
        Self {
            state: ResourceState::Present {
                details: Some(fingerprint.into()),
            },
            outputs: Some(outputs),
        }
    }
}

/// Execution engine that turns resolved declarations into real resources
///
/// The engine owns convergence: applying a request whose desired state
/// already matches what exists must report [`ApplyResult::NoChange`] and
/// return the existing outputs. Failures are returned as-is; the
/// executor never retries.
pub trait Engine: Send + Sync {
    /// Observe a declaration by identity, without changing anything
    fn current_state(&self, kind: ResourceKind, id: &DeclarationId) -> Result<Observed>;

    /// Create or update the resource so it matches `request`
    fn apply(&self, request: &ResourceRequest) -> Result<Applied>;
}

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called when starting to apply one level of the graph
    fn on_level_start(&mut self, level: usize, count: usize);

    /// Called when starting to apply a single declaration
    fn on_resource_start(&mut self, id: &str, description: &str);

    /// Called when a declaration completes
    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult);

    /// Called when a level completes
    fn on_level_complete(&mut self, level: usize);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_level_start(&mut self, _level: usize, _count: usize) {}
    fn on_resource_start(&mut self, _id: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &str, _result: &ApplyResult) {}
    fn on_level_complete(&mut self, _level: usize) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
