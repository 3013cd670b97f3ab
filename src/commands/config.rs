//! `config` - print the effective stack config

use anyhow::Result;

use crate::Context;
use crate::config::StackConfig;

pub fn run(ctx: &Context) -> Result<()> {
    let (config, path) = StackConfig::load(ctx.config_path.as_deref())?;
    if !ctx.quiet {
        match path {
            Some(path) => println!("# Loaded from {}", path.display()),
            None => println!(
                "# Built-in defaults (no file at {})",
                StackConfig::default_path()?.display()
            ),
        }
    }
    print!("{}", config.to_toml()?);
    Ok(())
}
