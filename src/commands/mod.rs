pub mod apply;
pub mod config;
pub mod graph;
pub mod kubeconfig;
pub mod plan;

use anyhow::{Context as AnyhowContext, Result};
use std::path::PathBuf;

use crate::Context;
use crate::config::StackConfig;
use crate::engine::LocalEngine;
use crate::engine::state::StackState;

/// Load the stack config named on the command line, or the default one
fn load_config(ctx: &Context) -> Result<StackConfig> {
    let (config, path) = StackConfig::load(ctx.config_path.as_deref())?;
    match path {
        Some(path) => log::info!("Using config {}", path.display()),
        None => log::info!("Using built-in stack defaults"),
    }
    Ok(config)
}

fn state_path(ctx: &Context) -> Result<PathBuf> {
    match &ctx.state_path {
        Some(path) => Ok(path.clone()),
        None => StackState::default_path(),
    }
}

/// Open the local engine over the state file
fn open_engine(ctx: &Context, config: &StackConfig) -> Result<LocalEngine> {
    let path = state_path(ctx)?;
    LocalEngine::open(&config.project, &path)
        .with_context(|| format!("Failed to open state {}", path.display()))
}
