//! Naming rules enforced by GCP and Kubernetes
//!
//! Checked at declaration time so a bad name fails before anything is
//! provisioned.

use regex::Regex;
use std::sync::LazyLock;

static SERVICE_ACCOUNT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])$").expect("valid regex"));

static GKE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"));

static DNS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"));

static LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+-[a-z]+[0-9]+(-[a-z])?$").expect("valid regex"));

/// Service account ids: 6-30 characters, lowercase letter first
pub fn check_account_id(id: &str) -> Result<(), String> {
    if !(6..=30).contains(&id.len()) {
        return Err(format!(
            "account id `{id}` must be 6 to 30 characters, got {}",
            id.len()
        ));
    }
    if !SERVICE_ACCOUNT_ID.is_match(id) {
        return Err(format!(
            "account id `{id}` must start with a lowercase letter and contain only lowercase letters, digits and hyphens"
        ));
    }
    Ok(())
}

/// Cluster and node pool names: at most 40 characters
pub fn check_gke_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 40 {
        return Err(format!("name `{name}` must be 1 to 40 characters"));
    }
    if !GKE_NAME.is_match(name) {
        return Err(format!(
            "name `{name}` must start with a lowercase letter and contain only lowercase letters, digits and hyphens"
        ));
    }
    Ok(())
}

/// Kubernetes object names that must be RFC 1123 labels (namespaces, releases)
pub fn check_dns_label(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 63 {
        return Err(format!("name `{name}` must be 1 to 63 characters"));
    }
    if !DNS_LABEL.is_match(name) {
        return Err(format!("name `{name}` is not a valid RFC 1123 label"));
    }
    Ok(())
}

/// Region (`us-east1`) or zone (`us-east1-b`)
pub fn check_location(location: &str) -> Result<(), String> {
    if LOCATION.is_match(location) {
        Ok(())
    } else {
        Err(format!("`{location}` is not a GCP region or zone"))
    }
}
