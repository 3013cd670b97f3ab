//! Diff display

use colored::Colorize;
use declarative::{DiffSummary, ResourceDiff, ResourceKind, ResourceState, group_by_type};

/// Display a list of diffs, grouped by kind in provisioning order
pub fn display_diff(diffs: &[ResourceDiff]) {
    if diffs.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    let by_type = group_by_type(diffs);

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Stack Diff".bold()
    );
    println!("│");

    for kind in ResourceKind::ALL {
        let Some(type_diffs) = by_type.get(kind.as_str()) else {
            continue;
        };
        println!("│ {}", type_heading(kind).bold());

        for diff in type_diffs {
            println!(
                "│   {} {:<30} {}",
                symbol(diff),
                diff.resource_id,
                state_desc(diff).dimmed()
            );
            if diff.is_pending() {
                println!(
                    "│       {} {}",
                    diff.unknown_inputs.join(", ").dimmed(),
                    "(known after apply)".dimmed().italic()
                );
            }
        }
        println!("│");
    }

    let summary = DiffSummary::from_diffs(diffs);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} to create, {} to update, {} pending inputs)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.pending.to_string().cyan()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn type_heading(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Identity => "Service accounts",
        ResourceKind::Cluster => "Clusters",
        ResourceKind::NodePool => "Node pools",
        ResourceKind::Provider => "Providers",
        ResourceKind::Namespace => "Namespaces",
        ResourceKind::Chart => "Charts",
    }
}

fn symbol(diff: &ResourceDiff) -> colored::ColoredString {
    if diff.is_addition() {
        "+".green()
    } else if diff.is_modification() {
        "~".yellow()
    } else {
        "?".dimmed()
    }
}

fn state_desc(diff: &ResourceDiff) -> String {
    match (&diff.current, &diff.desired) {
        (ResourceState::Absent, _) => diff.description.clone(),
        (ResourceState::Present { details: from }, ResourceState::Present { details: to }) => {
            format!(
                "{} → {}",
                short(from.as_deref()).unwrap_or("current"),
                short(to.as_deref()).unwrap_or("(known after apply)")
            )
        }
        _ => String::new(),
    }
}

/// First 12 characters of a fingerprint
fn short(fingerprint: Option<&str>) -> Option<&str> {
    fingerprint.map(|fp| fp.get(..12).unwrap_or(fp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(current: ResourceState, desired: ResourceState) -> ResourceDiff {
        ResourceDiff {
            resource_id: "gitops".into(),
            resource_type: "cluster".into(),
            description: "GKE cluster gitops in us-east1".into(),
            current,
            desired,
            unknown_inputs: Vec::new(),
        }
    }

    #[test]
    fn test_addition_shows_description() {
        let d = diff(
            ResourceState::Absent,
            ResourceState::Present { details: None },
        );
        assert_eq!(state_desc(&d), "GKE cluster gitops in us-east1");
    }

    #[test]
    fn test_modification_shows_short_fingerprints() {
        let d = diff(
            ResourceState::Present {
                details: Some("0123456789abcdef".into()),
            },
            ResourceState::Present { details: None },
        );
        assert_eq!(state_desc(&d), "0123456789ab → (known after apply)");
    }
}
