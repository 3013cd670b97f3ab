//! Service identity attached to cluster nodes

use declarative::{Declaration, DeclarationGraph, DeclarationId, Deferred, Error, ResourceKind};

use super::naming;

/// A declared service account
#[derive(Debug, Clone)]
pub struct IdentityHandle {
    pub id: DeclarationId,
    /// Known once the account has been created
    pub email: Deferred<String>,
}

/// Declare a service account.
///
/// `name` is the logical name in the graph; `account_id` must be unique
/// within the project.
pub fn create_service_identity(
    graph: &mut DeclarationGraph,
    name: &str,
    account_id: &str,
    display_name: &str,
) -> declarative::Result<IdentityHandle> {
    let id = DeclarationId::new(name);
    naming::check_account_id(account_id)
        .map_err(|message| Error::invalid(&id, ResourceKind::Identity, message))?;

    let id = graph.declare(
        Declaration::new(id, ResourceKind::Identity)
            .describe(format!("Service account {account_id}"))
            .with("accountId", account_id)
            .with("displayName", display_name),
    )?;

    Ok(IdentityHandle {
        email: Deferred::output(&id, "email"),
        id,
    })
}
