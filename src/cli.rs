//! CLI command definitions
//!
//! Uses `clap` derive API for argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// takt - run a graph of shell tasks concurrently, with cancel
#[derive(Parser, Debug)]
#[command(name = "takt")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the task file
    #[arg(short, long, global = true, env = "TAKT_FILE")]
    pub file: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Working directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Options for running tasks
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Only run tasks carrying one of these tags
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Cancel the whole run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Skip the summary printed after the run
    #[arg(long)]
    pub no_summary: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every selected task (the default)
    Run {
        #[command(flatten)]
        args: RunArgs,
    },

    /// List available tasks
    List {
        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: ListFormat,

        /// Show task dependencies
        #[arg(long)]
        deps: bool,
    },

    /// Show task dependency graph
    Graph {
        /// Output format
        #[arg(short = 'o', long, default_value = "text")]
        format: GraphFormat,
    },

    /// Initialize a new takt.toml
    Init {
        /// Overwrite existing task file
        #[arg(long)]
        force: bool,
    },

    /// Validate the task file, including dependency cycles
    Check,
}

#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ListFormat {
    #[default]
    Table,
    Json,
    Plain,
}

#[derive(ValueEnum, Clone, Debug, Default)]
pub enum GraphFormat {
    #[default]
    Text,
    Dot,
    Json,
}

impl RunArgs {
    /// Combine options given before `run` with those given after it
    fn merged(&self, after: &RunArgs) -> RunArgs {
        let mut only = self.only.clone();
        for tag in &after.only {
            if !only.contains(tag) {
                only.push(tag.clone());
            }
        }

        RunArgs {
            only,
            timeout: after.timeout.or(self.timeout),
            no_summary: self.no_summary || after.no_summary,
        }
    }
}

impl Cli {
    /// Get the effective command, treating a bare invocation as `run`
    pub fn effective_command(&self) -> EffectiveCommand<'_> {
        match &self.command {
            Some(Commands::Run { args }) => EffectiveCommand::Run(self.run.merged(args)),
            Some(cmd) => EffectiveCommand::Subcommand(cmd),
            None => EffectiveCommand::Run(self.run.clone()),
        }
    }
}

pub enum EffectiveCommand<'a> {
    Subcommand(&'a Commands),
    Run(RunArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_invocation_runs() {
        let cli = Cli::parse_from(["takt", "--only", "ci,fast", "--timeout", "30"]);
        match cli.effective_command() {
            EffectiveCommand::Run(args) => {
                assert_eq!(args.only, vec!["ci", "fast"]);
                assert_eq!(args.timeout, Some(30));
            }
            EffectiveCommand::Subcommand(cmd) => panic!("unexpected {cmd:?}"),
        }
    }

    #[test]
    fn test_file_flag_is_global() {
        let cli = Cli::parse_from(["takt", "list", "-f", "other.toml"]);
        assert_eq!(cli.file, Some(PathBuf::from("other.toml")));
        assert!(matches!(cli.command, Some(Commands::List { .. })));
    }

    #[test]
    fn test_options_before_run_subcommand_are_kept() {
        let cli =
            Cli::parse_from(["takt", "--only", "ci", "--timeout", "5", "run", "--no-summary"]);
        match cli.effective_command() {
            EffectiveCommand::Run(args) => {
                assert_eq!(args.only, vec!["ci"]);
                assert_eq!(args.timeout, Some(5));
                assert!(args.no_summary);
            }
            EffectiveCommand::Subcommand(cmd) => panic!("unexpected {cmd:?}"),
        }
    }

    #[test]
    fn test_options_on_both_sides_of_run_combine() {
        let cli = Cli::parse_from([
            "takt", "--only", "ci", "--timeout", "5", "run", "--only", "fast,ci", "--timeout", "9",
        ]);
        match cli.effective_command() {
            EffectiveCommand::Run(args) => {
                assert_eq!(args.only, vec!["ci", "fast"]);
                assert_eq!(args.timeout, Some(9));
            }
            EffectiveCommand::Subcommand(cmd) => panic!("unexpected {cmd:?}"),
        }
    }

    #[test]
    fn test_run_subcommand() {
        let cli = Cli::parse_from(["takt", "run", "--only", "ci"]);
        match cli.effective_command() {
            EffectiveCommand::Run(args) => assert_eq!(args.only, vec!["ci"]),
            EffectiveCommand::Subcommand(cmd) => panic!("unexpected {cmd:?}"),
        }
    }
}
