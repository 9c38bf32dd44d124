//! Task file parsing for takt.toml
//!
//! Handles loading and validating the task definitions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{Result, TaktError};
use crate::task::{TagFilter, TaskDefinition};

/// Default task file names to search for
pub const CONFIG_FILES: &[&str] = &["takt.toml", "Takt.toml"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Global environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Task definitions
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskConfig>,
}

/// Configuration for a single task
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Human-readable description
    #[serde(default)]
    pub desc: Option<String>,

    /// Shell steps, run in order
    #[serde(default)]
    pub run: Vec<String>,

    /// Tasks that must settle before this one starts
    #[serde(default)]
    pub depends: Vec<String>,

    /// Tags used by `--only`
    #[serde(default)]
    pub tags: Vec<String>,

    /// Task-specific environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Config {
    /// Load configuration from the specified path or search for it
    pub fn load(path: Option<&Path>) -> Result<(Self, PathBuf)> {
        let config_path = match path {
            Some(p) => {
                if p.exists() {
                    p.to_path_buf()
                } else {
                    return Err(TaktError::ConfigNotFound {
                        searched: vec![p.to_path_buf()],
                    });
                }
            }
            None => Self::find_config()?,
        };

        let content = std::fs::read_to_string(&config_path)?;
        let config = Self::parse(&content).map_err(|e| match e {
            TaktError::ConfigParse { source, .. } => TaktError::ConfigParse {
                source,
                path: config_path.clone(),
            },
            other => other,
        })?;

        Ok((config, config_path))
    }

    /// Parse and validate task file contents
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| TaktError::ConfigParse {
            source: e,
            path: PathBuf::new(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Search for the task file starting from current directory
    fn find_config() -> Result<PathBuf> {
        let mut current = std::env::current_dir()?;
        let mut searched = Vec::new();

        loop {
            for name in CONFIG_FILES {
                let candidate = current.join(name);
                searched.push(candidate.clone());
                if candidate.exists() {
                    return Ok(candidate);
                }
            }

            if !current.pop() {
                break;
            }
        }

        Err(TaktError::ConfigNotFound { searched })
    }

    fn validate(&self) -> Result<()> {
        for (name, task) in &self.tasks {
            if name.trim().is_empty() {
                return Err(TaktError::InvalidTask {
                    task: name.clone(),
                    reason: "task names cannot be empty".to_string(),
                });
            }

            if task.depends.contains(name) {
                return Err(TaktError::InvalidTask {
                    task: name.clone(),
                    reason: "a task cannot depend on itself".to_string(),
                });
            }
        }

        Ok(())
    }

    /// List all task names
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.keys().map(|s| s.as_str()).collect()
    }

    /// Merge environment variables for a task (global + task-specific)
    pub fn task_env(&self, task: &TaskConfig) -> HashMap<String, String> {
        let mut env = self.env.clone();
        env.extend(task.env.clone());
        env
    }

    /// Every task as a definition, global env already merged in
    pub fn definitions(&self) -> Vec<TaskDefinition> {
        self.tasks
            .iter()
            .map(|(name, task)| TaskDefinition {
                name: name.clone(),
                steps: task.run.clone(),
                depends: task.depends.clone(),
                tags: task.tags.clone(),
                env: self.task_env(task),
            })
            .collect()
    }

    /// Definitions selected by `filter`, plus the names it excluded
    pub fn select(&self, filter: &TagFilter) -> (Vec<TaskDefinition>, Vec<String>) {
        filter.apply(self.definitions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_config() {
        let toml = r#"
            [env]
            RUST_LOG = "debug"

            [tasks.test]
            desc = "Run tests"
            run = ["cargo test"]
            tags = ["ci"]

            [tasks.build]
            desc = "Build release"
            depends = ["test"]
            run = ["cargo build --release"]
            env = { PROFILE = "release" }
        "#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.env.get("RUST_LOG"), Some(&"debug".to_string()));
        assert_eq!(config.task_names(), vec!["build", "test"]);

        let defs = config.definitions();
        let build = defs.iter().find(|d| d.name == "build").unwrap();
        assert_eq!(build.depends, vec!["test"]);
        assert_eq!(build.env.get("RUST_LOG"), Some(&"debug".to_string()));
        assert_eq!(build.env.get("PROFILE"), Some(&"release".to_string()));
    }

    #[test]
    fn test_task_env_overrides_global() {
        let toml = r#"
            [env]
            MODE = "global"

            [tasks.a]
            run = ["true"]
            env = { MODE = "local" }
        "#;

        let config = Config::parse(toml).unwrap();
        let env = config.task_env(&config.tasks["a"]);
        assert_eq!(env.get("MODE"), Some(&"local".to_string()));
    }

    #[test]
    fn test_empty_steps_allowed() {
        let config = Config::parse("[tasks.noop]\n").unwrap();
        assert!(config.tasks["noop"].run.is_empty());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = r#"
            [tasks.a]
            run = ["true"]
            retries = 3
        "#;

        assert!(matches!(
            Config::parse(toml),
            Err(TaktError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let toml = r#"
            [tasks.a]
            depends = ["a"]
        "#;

        assert!(matches!(
            Config::parse(toml),
            Err(TaktError::InvalidTask { .. })
        ));
    }

    #[test]
    fn test_select_by_tag() {
        let toml = r#"
            [tasks.lint]
            run = ["true"]
            tags = ["ci"]

            [tasks.serve]
            run = ["true"]
        "#;

        let config = Config::parse(toml).unwrap();
        let (selected, excluded) = config.select(&TagFilter::new(["ci"]));
        assert_eq!(selected.len(), 1);
        assert_eq!(excluded, vec!["serve".to_string()]);
    }
}
