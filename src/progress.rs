//! Progress indicators for apply runs

use colored::Colorize;
use declarative::{ApplyResult, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// Progress bar with the standard style
pub fn bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template(TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    pb.set_style(style);
    pb
}

/// Symbol shown next to a finished declaration
pub fn result_symbol(result: &ApplyResult) -> &'static str {
    match result {
        ApplyResult::NoChange => "○",
        ApplyResult::Created | ApplyResult::Modified => "✓",
        ApplyResult::Failed { .. } => "✗",
        ApplyResult::Skipped { .. } => "⊘",
    }
}

/// Reports apply progress on a single bar spanning every level
pub struct ApplyProgress {
    pb: ProgressBar,
    verbose: bool,
}

impl ApplyProgress {
    pub fn new(total: usize, verbose: bool) -> Self {
        Self {
            pb: bar(total as u64),
            verbose,
        }
    }

    /// Hidden bar, for non-interactive output
    pub fn hidden() -> Self {
        Self {
            pb: ProgressBar::hidden(),
            verbose: false,
        }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl ProgressCallback for ApplyProgress {
    fn on_level_start(&mut self, level: usize, count: usize) {
        if self.verbose {
            self.pb.suspend(|| {
                println!(
                    "  {} Level {} ({} resources)",
                    "→".cyan(),
                    level,
                    count
                );
            });
        }
    }

    fn on_resource_start(&mut self, id: &str, description: &str) {
        self.pb.set_message(format!("{description} {id}"));
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        self.pb
            .set_message(format!("{} {}", result_symbol(result), id));
        if let ApplyResult::Failed { error } = result {
            self.pb.suspend(|| {
                println!("    {} {} ({})", "✗".red(), id, error);
            });
        } else if self.verbose {
            self.pb.suspend(|| {
                println!("    {} {}", result_symbol(result), id);
            });
        }
        self.pb.inc(1);
    }

    fn on_level_complete(&mut self, _level: usize) {}
}
