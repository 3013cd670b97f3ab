//! `graph` - show the declaration graph

use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::stack::declare_gitops_stack;
use crate::ui;

pub fn run(ctx: &Context, dot: bool) -> Result<()> {
    let config = super::load_config(ctx)?;
    let graph = declare_gitops_stack(&config)?;
    graph.validate()?;

    if dot {
        print!("{}", graph.to_dot());
        return Ok(());
    }

    ui::header("Declaration Graph");
    for (level, ids) in graph.levels()?.iter().enumerate() {
        ui::section(&format!("Level {level}"));
        for id in ids {
            let Some(decl) = graph.get(id) else {
                continue;
            };
            println!(
                "  {} {:<28} {}",
                "•".cyan(),
                id.as_str(),
                decl.kind.to_string().dimmed()
            );
            for (dependency, edge) in graph.dependencies_of(id) {
                println!("      {} {} ({})", "←".dimmed(), dependency, edge);
            }
        }
    }

    if !graph.exports().is_empty() {
        ui::section("Exports");
        for key in graph.exports().keys() {
            println!("  {} {}", "•".cyan(), key);
        }
    }
    Ok(())
}
