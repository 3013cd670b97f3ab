//! `plan` - preview what apply would change

use anyhow::Result;
use declarative::{ExecutionPlan, compute_diffs};

use crate::Context;
use crate::engine::differ::display_diff;
use crate::stack::declare_gitops_stack;
use crate::ui;

pub fn run(ctx: &Context, target: Option<&str>) -> Result<()> {
    let config = super::load_config(ctx)?;
    let graph = declare_gitops_stack(&config)?;
    let plan = ExecutionPlan::for_target(&graph, target)?;
    let engine = super::open_engine(ctx, &config)?;

    if !ctx.quiet {
        ui::header(&format!("Plan for {}", config.project));
        ui::kv("Region", &config.region);
        ui::kv(
            "Resources",
            &format!(
                "{} in {} levels",
                plan.total_resources(),
                plan.levels().len()
            ),
        );
        if let Some(target) = target {
            ui::kv("Target", target);
        }
    }

    let diffs = compute_diffs(&graph, &plan, &engine)?;
    display_diff(&diffs);
    Ok(())
}
