//! Apply with terminal UI integration

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ConfirmCallback, DeclarationGraph, ExecuteOptions, ExecuteSummary, Execution, ExecutionPlan,
    compute_diffs,
};

use super::differ::display_diff;
use super::local::LocalEngine;
use crate::progress::ApplyProgress;
use crate::ui;

/// Options for an apply run (includes `yes` for confirmation skip)
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Show what would change without applying
    pub dry_run: bool,
    /// Number of parallel jobs within a level
    pub jobs: usize,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Verbose output
    pub verbose: bool,
    /// Hide the progress bar
    pub quiet: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            yes: false,
            verbose: false,
            quiet: false,
        }
    }
}

impl From<&ApplyOptions> for ExecuteOptions {
    fn from(opts: &ApplyOptions) -> Self {
        Self {
            dry_run: opts.dry_run,
            jobs: opts.jobs,
        }
    }
}

/// Confirmation through an interactive prompt
pub struct DialoguerConfirm {
    pub assume_yes: bool,
}

impl ConfirmCallback for DialoguerConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;
        Ok(confirmed)
    }
}

/// Show the diff, confirm, apply and persist.
///
/// State is saved even when the run fails, so resources applied before
/// the failure are not created again on the next run.
pub fn apply(
    graph: &DeclarationGraph,
    plan: &ExecutionPlan,
    engine: &LocalEngine,
    opts: &ApplyOptions,
) -> Result<Execution> {
    let diffs = compute_diffs(graph, plan, engine)?;
    display_diff(&diffs);

    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(Execution::default());
    }

    println!();
    println!(
        "  {} Applying {} resources in {} levels...",
        "→".cyan(),
        plan.total_resources(),
        plan.levels().len()
    );

    let mut progress = if opts.quiet {
        ApplyProgress::hidden()
    } else {
        ApplyProgress::new(plan.total_resources(), opts.verbose)
    };
    let mut confirm = DialoguerConfirm {
        assume_yes: opts.yes,
    };
    let result = declarative::execute(
        graph,
        plan,
        engine,
        &ExecuteOptions::from(opts),
        &mut progress,
        &mut confirm,
    );
    progress.finish();

    match result {
        Ok(execution) => {
            engine.record_exports(&execution.exports);
            engine.save()?;
            print_summary(&execution.summary);
            Ok(execution)
        }
        Err(e) => {
            engine.save()?;
            let category = e.category();
            eprintln!();
            ui::error(&format!("{}: {}", category.description().bold(), e));
            eprintln!("  {} {}", "→".cyan(), category.advice().dimmed());
            Err(e.into())
        }
    }
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.skipped > 0 && summary.total_changes() == 0 {
        println!("  {} Aborted", "✗".red());
    } else if summary.is_success() {
        println!("  {} Stack applied successfully!", "✓".green().bold());
    } else {
        println!("  {} Stack applied with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.no_change > 0 {
        println!("    • {} resources unchanged", summary.no_change);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
