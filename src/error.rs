//! Error types for takt
//!
//! Uses `miette` for pretty error reporting with codes and help text.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::runner::StepError;

/// Main error type for takt operations
#[derive(Error, Diagnostic, Debug)]
pub enum TaktError {
    #[error("Task file not found")]
    #[diagnostic(
        code(takt::config::not_found),
        help("Create a takt.toml in your project root, or specify one with --file")
    )]
    ConfigNotFound {
        searched: Vec<PathBuf>,
    },

    #[error("Failed to parse task file {}", .path.display())]
    #[diagnostic(code(takt::config::parse))]
    ConfigParse {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Invalid task '{task}': {reason}")]
    #[diagnostic(code(takt::config::invalid_task))]
    InvalidTask {
        task: String,
        reason: String,
    },

    #[error("Task '{name}' is defined more than once")]
    #[diagnostic(code(takt::graph::duplicate))]
    DuplicateTask {
        name: String,
    },

    #[error("Task '{task}' depends on '{dependency}', which is not a known task")]
    #[diagnostic(code(takt::graph::unresolved))]
    UnresolvedDependency {
        task: String,
        dependency: String,
        filtered: bool,
        #[help]
        help: Option<String>,
    },

    #[error("Dependency cycle detected: {cycle}")]
    #[diagnostic(
        code(takt::graph::cycle),
        help("Tasks in a cycle wait on each other forever; check their 'depends' fields")
    )]
    CyclicDependency {
        cycle: String,
    },

    #[error("Task '{task}' failed at step `{step}`")]
    #[diagnostic(code(takt::exec::failed))]
    TaskFailed {
        task: String,
        step: String,
        #[source]
        source: StepError,
    },

    #[error("Task '{task}' panicked")]
    #[diagnostic(code(takt::exec::panicked))]
    Panicked {
        task: String,
    },

    #[error("Run exceeded its {}s deadline", .after.as_secs())]
    #[diagnostic(code(takt::exec::deadline))]
    DeadlineExceeded {
        after: std::time::Duration,
    },

    #[error("I/O error")]
    #[diagnostic(code(takt::io))]
    Io(#[from] std::io::Error),
}

impl TaktError {
    /// A step that stopped only because the run was canceled
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TaktError::TaskFailed { source, .. } if source.is_cancellation())
    }

    /// Build an unresolved-dependency error, noting when the missing task
    /// exists but was excluded by the tag filter.
    pub fn unresolved(task: &str, dependency: &str, filtered: bool) -> Self {
        let help = if filtered {
            Some(format!("'{dependency}' was excluded by --only"))
        } else {
            Some("Run `takt list` to see available tasks".to_string())
        };

        TaktError::UnresolvedDependency {
            task: task.to_string(),
            dependency: dependency.to_string(),
            filtered,
            help,
        }
    }
}

/// Result type alias for takt operations
pub type Result<T> = std::result::Result<T, TaktError>;
