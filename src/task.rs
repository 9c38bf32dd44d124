//! Task definitions handed to the graph builder
//!
//! A `TaskDefinition` is immutable once loaded. The tag filter decides which
//! definitions make it into a run; the engine never looks at tags itself.

use std::collections::HashMap;

/// Static description of one named unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDefinition {
    pub name: String,
    /// Shell lines, run in order
    pub steps: Vec<String>,
    pub depends: Vec<String>,
    pub tags: Vec<String>,
    /// Passed through to the step runner
    pub env: HashMap<String, String>,
}

impl TaskDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn step(mut self, line: impl Into<String>) -> Self {
        self.steps.push(line.into());
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends.push(name.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Selects tasks by tag (`--only`)
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    only: Vec<String>,
}

impl TagFilter {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            only: tags
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }

    /// Filter that keeps every task
    pub fn all() -> Self {
        Self::default()
    }

    /// A task is selected when it carries at least one of the requested tags
    pub fn matches(&self, task: &TaskDefinition) -> bool {
        if self.only.is_empty() {
            return true;
        }
        task.tags.iter().any(|tag| self.only.contains(tag))
    }

    /// Split definitions into (selected, excluded names)
    pub fn apply(&self, tasks: Vec<TaskDefinition>) -> (Vec<TaskDefinition>, Vec<String>) {
        let mut excluded = Vec::new();
        let selected = tasks
            .into_iter()
            .filter_map(|task| {
                if self.matches(&task) {
                    Some(task)
                } else {
                    excluded.push(task.name);
                    None
                }
            })
            .collect();
        (selected, excluded)
    }
}
