//! `kubeconfig` - print or write the kubeconfig of the last apply

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use std::fs;
use std::path::Path;

use crate::Context;
use crate::stack::kubeconfig::{KUBECONFIG_EXPORT, Kubeconfig};
use crate::ui;

pub fn run(ctx: &Context, write: Option<&Path>) -> Result<()> {
    let config = super::load_config(ctx)?;
    let engine = super::open_engine(ctx, &config)?;
    let state = engine.snapshot();
    let Some(document) = state.exports.get(KUBECONFIG_EXPORT) else {
        bail!(
            "No kubeconfig recorded in {}; run `gitops-stack apply` first",
            super::state_path(ctx)?.display()
        );
    };

    let context = Kubeconfig::parse(document)?.validate()?.to_string();
    log::debug!("Recorded kubeconfig has context {context}");

    match write {
        None => {
            println!("{document}");
            Ok(())
        }
        Some(target) => {
            if write_kubeconfig(target, document)? {
                ui::success(&format!("Wrote {} (context {})", target.display(), context));
            } else {
                ui::info(&format!("{} is up to date", target.display()));
            }
            Ok(())
        }
    }
}

/// Write `document` to `target`, printing a line diff against what is there.
///
/// Returns `false` when the file already holds the same document.
fn write_kubeconfig(target: &Path, document: &str) -> Result<bool> {
    let current = match fs::read_to_string(target) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", target.display()));
        }
    };

    if let Some(current) = &current {
        if current == document {
            return Ok(false);
        }
        show_text_diff(current, document);
    }

    if let Some(dir) = target.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    fs::write(target, document)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    Ok(true)
}

/// Show a line diff using the `similar` crate
fn show_text_diff(old: &str, new: &str) {
    let diff = similar::TextDiff::from_lines(old, new);
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => {
                print!("    {}", format!("- {change}").red());
            }
            similar::ChangeTag::Insert => {
                print!("    {}", format!("+ {change}").green());
            }
            similar::ChangeTag::Equal => {}
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::kubeconfig::render_kubeconfig;

    #[test]
    fn test_write_creates_then_skips_identical() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("kube").join("config");
        let document = render_kubeconfig("34.1.2.3", "gitops", "Q0EK").unwrap();

        assert!(write_kubeconfig(&target, &document).unwrap());
        assert_eq!(fs::read_to_string(&target).unwrap(), document);
        assert!(!write_kubeconfig(&target, &document).unwrap());
    }

    #[test]
    fn test_write_replaces_changed_document() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("config");
        let old = render_kubeconfig("34.1.2.3", "gitops", "Q0EK").unwrap();
        let new = render_kubeconfig("34.9.9.9", "gitops", "Q0EK").unwrap();

        write_kubeconfig(&target, &old).unwrap();
        assert!(write_kubeconfig(&target, &new).unwrap());
        assert_eq!(fs::read_to_string(&target).unwrap(), new);
    }
}
