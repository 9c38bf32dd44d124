//! Execution units
//!
//! One [`ExecutionUnit`] exists per selected task for the length of a run.
//! It owns the receiving ends of the signals from its dependencies and the
//! sending ends of the signals to its dependents, and walks:
//!
//! ```text
//! Pending -> Waiting -> Skipped
//!                    -> Running -> Succeeded | Failed
//! ```
//!
//! Every outbound signal is sent exactly once on every path out of the state
//! machine. If a unit is torn down before it can send (a panic, say), the
//! dropped sender reads as a failed dependency on the other side, so no
//! dependent ever waits on a settled unit.

use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, TaktError};
use crate::output::TaskSink;
use crate::runner::{Step, StepRunner};
use crate::task::TaskDefinition;

/// How a unit settled, as seen by its dependents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for Settled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Settled::Succeeded => f.write_str("succeeded"),
            Settled::Failed => f.write_str("failed"),
            Settled::Skipped => f.write_str("was skipped"),
        }
    }
}

/// One-shot message from a settled unit to one dependent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSignal {
    pub name: String,
    pub settled: Settled,
}

impl CompletionSignal {
    pub fn ok(&self) -> bool {
        self.settled == Settled::Succeeded
    }
}

/// Where a unit is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Waiting,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// Why a unit never ran its steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    DependencyFailed {
        dependency: String,
        settled: Settled,
    },
    /// The dependency went away without reporting
    DependencyLost { dependency: String },
    /// The run was canceled before this unit could start
    Interrupted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DependencyFailed {
                dependency,
                settled,
            } => write!(f, "dependency '{dependency}' {settled}"),
            SkipReason::DependencyLost { dependency } => {
                write!(f, "dependency '{dependency}' stopped without reporting")
            }
            SkipReason::Interrupted => f.write_str("interrupted before start"),
        }
    }
}

/// Terminal outcome of a unit
#[derive(Debug)]
pub enum TaskOutcome {
    Succeeded,
    /// Carries the error naming the failing task and step
    Failed(TaktError),
    Skipped(SkipReason),
}

impl TaskOutcome {
    pub fn settled(&self) -> Settled {
        match self {
            TaskOutcome::Succeeded => Settled::Succeeded,
            TaskOutcome::Failed(_) => Settled::Failed,
            TaskOutcome::Skipped(_) => Settled::Skipped,
        }
    }

    /// A failure caused by the task itself, not by the run being canceled
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed(e) if !e.is_cancellation())
    }
}

/// What a unit reports back to the orchestrator
#[derive(Debug)]
pub struct UnitResult {
    pub name: String,
    pub outcome: TaskOutcome,
    pub duration: Duration,
}

impl UnitResult {
    /// Skips and successes are not errors
    pub fn into_result(self) -> Result<()> {
        match self.outcome {
            TaskOutcome::Failed(e) => Err(e),
            TaskOutcome::Succeeded | TaskOutcome::Skipped(_) => Ok(()),
        }
    }
}

/// Runtime object for one task
#[derive(Debug)]
pub struct ExecutionUnit {
    task: TaskDefinition,
    state: UnitState,
    inbound: Vec<(String, oneshot::Receiver<CompletionSignal>)>,
    outbound: Vec<(String, oneshot::Sender<CompletionSignal>)>,
}

impl ExecutionUnit {
    pub fn new(task: TaskDefinition) -> Self {
        Self {
            task,
            state: UnitState::Pending,
            inbound: Vec::new(),
            outbound: Vec::new(),
        }
    }

    /// Connect `dependency -> dependent` with a fresh one-shot channel
    pub fn link(dependency: &mut ExecutionUnit, dependent: &mut ExecutionUnit) {
        let (tx, rx) = oneshot::channel();
        dependency.outbound.push((dependent.name().to_string(), tx));
        dependent.inbound.push((dependency.name().to_string(), rx));
    }

    pub fn name(&self) -> &str {
        &self.task.name
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    /// Names this unit waits on, in declaration order
    pub fn waits_on(&self) -> impl Iterator<Item = &str> {
        self.inbound.iter().map(|(name, _)| name.as_str())
    }

    /// Names this unit will notify, in declaration order
    pub fn notifies(&self) -> impl Iterator<Item = &str> {
        self.outbound.iter().map(|(name, _)| name.as_str())
    }

    fn transition(&mut self, next: UnitState) {
        debug!(task = %self.task.name, from = ?self.state, to = ?next, "state");
        self.state = next;
    }

    /// Drive the unit to a terminal state
    pub async fn run(
        mut self,
        runner: &dyn StepRunner,
        cancel: &CancellationToken,
        sink: &dyn TaskSink,
    ) -> UnitResult {
        let started = Instant::now();

        self.transition(UnitState::Waiting);
        let outcome = match self.wait_dependencies(cancel).await {
            Some(reason) => TaskOutcome::Skipped(reason),
            None if cancel.is_cancelled() => TaskOutcome::Skipped(SkipReason::Interrupted),
            None => {
                self.transition(UnitState::Running);
                self.execute(runner, cancel, sink).await
            }
        };

        match &outcome {
            TaskOutcome::Succeeded => {
                self.transition(UnitState::Succeeded);
                sink.stdout("done");
            }
            TaskOutcome::Failed(e) if e.is_cancellation() => {
                self.transition(UnitState::Failed);
                sink.stdout("canceled");
            }
            TaskOutcome::Failed(e) => {
                self.transition(UnitState::Failed);
                sink.stderr(&format!("failed: {}", render_chain(e)));
            }
            TaskOutcome::Skipped(reason) => {
                self.transition(UnitState::Skipped);
                sink.stdout(&format!("skipped: {reason}"));
            }
        }

        // Dependents hear the reason before the rest of the run is told to stop
        self.notify_dependents(outcome.settled());
        if matches!(outcome, TaskOutcome::Failed(_)) {
            cancel.cancel();
        }

        UnitResult {
            name: self.task.name,
            outcome,
            duration: started.elapsed(),
        }
    }

    /// Consume every inbound signal. Returns the reason to skip, if any.
    async fn wait_dependencies(&mut self, cancel: &CancellationToken) -> Option<SkipReason> {
        if !self.inbound.is_empty() {
            debug!(task = %self.task.name, count = self.inbound.len(), "waiting on dependencies");
        }

        let mut skip = None;
        for (dependency, rx) in self.inbound.drain(..) {
            let received = tokio::select! {
                biased;
                signal = rx => signal,
                _ = cancel.cancelled() => return Some(skip.unwrap_or(SkipReason::Interrupted)),
            };

            let reason = match received {
                Ok(signal) if signal.ok() => continue,
                Ok(signal) => SkipReason::DependencyFailed {
                    dependency: signal.name,
                    settled: signal.settled,
                },
                Err(_) => SkipReason::DependencyLost { dependency },
            };
            skip.get_or_insert(reason);
        }

        skip
    }

    async fn execute(
        &self,
        runner: &dyn StepRunner,
        cancel: &CancellationToken,
        sink: &dyn TaskSink,
    ) -> TaskOutcome {
        sink.stdout("starting");

        for line in &self.task.steps {
            let step = Step {
                task: &self.task.name,
                command: line,
                env: &self.task.env,
            };

            if let Err(source) = runner.run(step, cancel, sink).await {
                return TaskOutcome::Failed(TaktError::TaskFailed {
                    task: self.task.name.clone(),
                    step: line.clone(),
                    source,
                });
            }
        }

        TaskOutcome::Succeeded
    }

    fn notify_dependents(&mut self, settled: Settled) {
        for (dependent, tx) in self.outbound.drain(..) {
            let signal = CompletionSignal {
                name: self.task.name.clone(),
                settled,
            };
            if tx.send(signal).is_err() {
                debug!(task = %self.task.name, %dependent, "dependent no longer listening");
            }
        }
    }
}

fn render_chain(error: &TaktError) -> String {
    let mut rendered = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
