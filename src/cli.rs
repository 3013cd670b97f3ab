use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gitops-stack")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Provision a GKE cluster and its GitOps workloads", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Stack config file (default: ~/.config/gitops-stack/stack.toml)
    #[arg(short, long, global = true, env = "GITOPS_STACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// State file (default: ~/.local/state/gitops-stack/state.json)
    #[arg(long, global = true, env = "GITOPS_STACK_STATE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Preview what apply would change
    Plan(PlanArgs),

    /// Make the provisioned stack match the config
    Apply(ApplyArgs),

    /// Show the declaration graph
    Graph(GraphArgs),

    /// Print the kubeconfig of the last apply
    Kubeconfig(KubeconfigArgs),

    /// Print the effective config as TOML
    Config,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Only plan a target and what it depends on (e.g. "cluster", "chart.argo-cd", "workloads")
    #[arg(short, long)]
    pub target: Option<String>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Only apply a target and what it depends on
    #[arg(short, long)]
    pub target: Option<String>,

    /// Show what would change without applying
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Parallel jobs within a level
    #[arg(short, long, default_value = "4")]
    pub jobs: u32,
}

#[derive(Parser)]
pub struct GraphArgs {
    /// Emit Graphviz DOT instead of levels
    #[arg(long)]
    pub dot: bool,
}

#[derive(Parser)]
pub struct KubeconfigArgs {
    /// Write to this file, showing a diff against its current content
    #[arg(short, long)]
    pub write: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::parse_from([
            "gitops-stack",
            "-vv",
            "apply",
            "--target",
            "charts",
            "--yes",
            "-j",
            "2",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.target.as_deref(), Some("charts"));
        assert!(args.yes);
        assert!(!args.dry_run);
        assert_eq!(args.jobs, 2);
    }
}
