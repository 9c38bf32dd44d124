//! takt - a task runner with cancel
//!
//! Reads a takt.toml of named tasks, wires them into a dependency graph and
//! runs the whole graph concurrently. The first failure, or Ctrl-C, stops
//! everything still running.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use console::style;

mod cli;
mod config;
mod engine;
mod error;
mod graph;
mod output;
mod runner;
mod task;
mod unit;

use cli::{Cli, Commands, EffectiveCommand, GraphFormat, ListFormat, RunArgs};
use config::Config;
use engine::Engine;
use error::{Result, TaktError};
use graph::TaskGraph;
use output::PrefixedOutput;
use runner::ShellRunner;
use task::TagFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Set up panic handler for nice error messages
    miette::set_panic_hook();

    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:?}", style("error").red().bold(), miette::Report::new(e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Some(cwd) = &cli.cwd {
        std::env::set_current_dir(cwd)?;
    }

    match cli.effective_command() {
        EffectiveCommand::Run(args) => run_tasks(&args, &cli).await,
        EffectiveCommand::Subcommand(cmd) => run_command(cmd, &cli).await,
    }
}

async fn run_command(cmd: &Commands, cli: &Cli) -> Result<()> {
    match cmd {
        Commands::Run { args } => run_tasks(args, cli).await,

        Commands::List { format, deps } => {
            let (config, _) = Config::load(cli.file.as_deref())?;
            let graph = TaskGraph::from_config(&config, &TagFilter::all())?;
            print_task_list(&graph, &config, format.clone(), *deps);
            Ok(())
        }

        Commands::Graph { format } => {
            let (config, _) = Config::load(cli.file.as_deref())?;
            let graph = TaskGraph::from_config(&config, &TagFilter::all())?;
            print_graph(&graph, format.clone())
        }

        Commands::Init { force } => init_config(*force),

        Commands::Check => {
            let (config, path) = Config::load(cli.file.as_deref())?;
            let graph = TaskGraph::from_config(&config, &TagFilter::all())?;
            graph.check_acyclic()?;

            println!(
                "{} {} is valid ({} tasks)",
                style("✓").green(),
                path.display(),
                graph.len()
            );
            Ok(())
        }
    }
}

async fn run_tasks(args: &RunArgs, cli: &Cli) -> Result<()> {
    let (config, _) = Config::load(cli.file.as_deref())?;
    let filter = TagFilter::new(args.only.iter().cloned());
    let graph = TaskGraph::from_config(&config, &filter)?;

    if graph.is_empty() {
        println!("{}", style("No tasks selected").yellow());
        return Ok(());
    }

    let prefixed = PrefixedOutput::new(graph.task_names());
    let engine = Engine::new(Arc::new(ShellRunner::new()), Arc::new(prefixed));

    let deadline = args.timeout.map(Duration::from_secs);
    let report = engine.run_until_interrupted(graph, deadline).await;

    if !args.no_summary {
        output::print_summary(&report);
    }

    report.into_result()
}

fn print_task_list(graph: &TaskGraph, config: &Config, format: ListFormat, show_deps: bool) {
    match format {
        ListFormat::Table => {
            println!("{}", style("Available tasks:").bold());
            println!();

            let names = graph.task_names();
            let max_name_len = names.iter().map(|n| n.len()).max().unwrap_or(0);

            for name in names {
                let desc = config
                    .tasks
                    .get(name)
                    .and_then(|t| t.desc.as_deref())
                    .unwrap_or("");

                print!(
                    "  {}{}  {}",
                    output::task_style(name).bold().apply_to(name),
                    " ".repeat(max_name_len - name.len()),
                    style(desc).dim()
                );

                if let Some(task) = graph.get_task(name) {
                    if !task.tags.is_empty() {
                        print!(" {}", style(format!("#{}", task.tags.join(" #"))).magenta().dim());
                    }
                }

                if show_deps {
                    if let Some(deps) = graph.dependencies(name) {
                        if !deps.is_empty() {
                            print!(
                                " {}",
                                style(format!("[deps: {}]", deps.join(", "))).yellow().dim()
                            );
                        }
                    }
                }

                println!();
            }
        }

        ListFormat::Json => {
            let mut tasks = serde_json::Map::new();
            for name in graph.task_names() {
                if let Some(task) = graph.get_task(name) {
                    let mut obj = serde_json::Map::new();
                    if let Some(desc) = config.tasks.get(name).and_then(|t| t.desc.as_ref()) {
                        obj.insert("description".to_string(), serde_json::json!(desc));
                    }
                    obj.insert("steps".to_string(), serde_json::json!(task.steps));
                    obj.insert("tags".to_string(), serde_json::json!(task.tags));
                    if show_deps {
                        obj.insert("depends".to_string(), serde_json::json!(task.depends));
                    }
                    tasks.insert(name.to_string(), serde_json::Value::Object(obj));
                }
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&tasks).unwrap_or_default()
            );
        }

        ListFormat::Plain => {
            for name in graph.task_names() {
                println!("{}", name);
            }
        }
    }
}

fn print_graph(graph: &TaskGraph, format: GraphFormat) -> Result<()> {
    let tasks = graph.all_tasks_ordered()?;

    match format {
        GraphFormat::Text => {
            println!("{}", style("Task dependency graph:").bold());
            println!();

            for task in &tasks {
                let deps = graph.dependencies(&task.name).unwrap_or_default();

                if deps.is_empty() {
                    println!("  {}", style(&task.name).cyan().bold());
                } else {
                    println!(
                        "  {} {} {}",
                        style(&task.name).cyan().bold(),
                        style("←").dim(),
                        deps.join(", ")
                    );
                }
            }
        }

        GraphFormat::Dot => {
            println!("digraph takt {{");
            println!("  rankdir=LR;");
            println!("  node [shape=box];");

            for task in &tasks {
                println!("  \"{}\";", task.name);
            }
            for (dep, dependent) in graph.edges() {
                println!("  \"{}\" -> \"{}\";", dep, dependent);
            }

            println!("}}");
        }

        GraphFormat::Json => {
            let nodes: Vec<_> = tasks
                .iter()
                .map(|task| {
                    serde_json::json!({
                        "id": task.name,
                        "steps": task.steps,
                        "tags": task.tags,
                    })
                })
                .collect();

            let edges: Vec<_> = graph
                .edges()
                .into_iter()
                .map(|(from, to)| serde_json::json!({ "from": from, "to": to }))
                .collect();

            let output = serde_json::json!({
                "nodes": nodes,
                "edges": edges,
            });

            println!(
                "{}",
                serde_json::to_string_pretty(&output).unwrap_or_default()
            );
        }
    }

    Ok(())
}

fn init_config(force: bool) -> Result<()> {
    let path = std::path::Path::new(config::CONFIG_FILES[0]);

    if path.exists() && !force {
        return Err(TaktError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "takt.toml already exists (use --force to overwrite)",
        )));
    }

    let template = r#"# takt.toml - task definitions
#
# Every task runs concurrently with the others, except that a task waits
# for everything in its `depends` list. If a task fails, the ones depending
# on it are skipped and everything still running is stopped.

[env]
# Global environment variables, merged under each task's own `env`
# RUST_LOG = "info"

[tasks.fmt]
desc = "Check formatting"
run = ["cargo fmt --check"]
tags = ["ci"]

[tasks.lint]
desc = "Run clippy"
run = ["cargo clippy -- -D warnings"]
tags = ["ci"]

[tasks.test]
desc = "Run tests"
run = ["cargo test"]
tags = ["ci"]

[tasks.build]
desc = "Build release binary"
depends = ["fmt", "lint", "test"]
run = ["cargo build --release"]
"#;

    std::fs::write(path, template)?;

    println!(
        "{} Created {}",
        style("✓").green(),
        style(config::CONFIG_FILES[0]).bold()
    );

    Ok(())
}
