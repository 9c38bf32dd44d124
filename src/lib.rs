//! takt - a task runner with cancel
//!
//! This crate provides both a CLI tool and a library for running a graph of
//! shell tasks concurrently.
//!
//! # Features
//!
//! - **Simple TOML task file** - named tasks, each a list of shell steps
//! - **Concurrent by default** - every task starts at once and waits only on its `depends`
//! - **Skip on failure** - tasks downstream of a failure never run
//! - **Cancel on failure** - the first failure stops every step still running
//! - **Clean interrupt** - Ctrl-C tears the run down and exits cleanly
//! - **Tag filtering** - `--only ci` runs just the tasks tagged `ci`
//!
//! # Example
//!
//! ```toml
//! # takt.toml
//!
//! [tasks.test]
//! run = ["cargo test"]
//! tags = ["ci"]
//!
//! [tasks.build]
//! depends = ["test"]
//! run = ["cargo build --release"]
//! ```
//!
//! # Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use takt::{Config, Engine, PrefixedOutput, ShellRunner, TagFilter, TaskGraph};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (config, _) = Config::load(None)?;
//!     let graph = TaskGraph::from_config(&config, &TagFilter::all())?;
//!
//!     let output = PrefixedOutput::new(graph.task_names());
//!     let engine = Engine::new(Arc::new(ShellRunner::new()), Arc::new(output));
//!     engine.run_until_interrupted(graph, None).await.into_result()?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod output;
pub mod runner;
pub mod task;
pub mod unit;

// Re-export main types
pub use config::Config;
pub use engine::{Engine, RunReport, StopCause};
pub use error::{Result, TaktError};
pub use graph::TaskGraph;
pub use output::{Output, PrefixedOutput, TaskSink};
pub use runner::{ShellRunner, Step, StepError, StepRunner};
pub use task::{TagFilter, TaskDefinition};
pub use unit::{CompletionSignal, ExecutionUnit, SkipReason, TaskOutcome, UnitState};
