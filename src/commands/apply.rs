//! `apply` - make the provisioned stack match the config

use anyhow::Result;
use declarative::ExecutionPlan;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::{ApplyOptions, apply};
use crate::stack::declare_gitops_stack;
use crate::stack::kubeconfig::KUBECONFIG_EXPORT;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let config = super::load_config(ctx)?;
    let graph = declare_gitops_stack(&config)?;
    let plan = ExecutionPlan::for_target(&graph, args.target.as_deref())?;
    let engine = super::open_engine(ctx, &config)?;

    if !ctx.quiet {
        ui::header(&format!("Applying {}", config.project));
        if let Some(path) = engine.path() {
            ui::kv("State", &path.display().to_string());
        }
    }

    let opts = ApplyOptions {
        dry_run: args.dry_run,
        jobs: args.jobs.max(1) as usize,
        yes: args.yes,
        verbose: ctx.verbose > 0,
        quiet: ctx.quiet,
    };
    let execution = apply(&graph, &plan, &engine, &opts)?;

    if !ctx.quiet && execution.exports.contains_key(KUBECONFIG_EXPORT) {
        println!();
        ui::info("Kubeconfig exported; run `gitops-stack kubeconfig` to print it");
    }
    Ok(())
}
