//! Run orchestration
//!
//! Spawns one tokio task per execution unit, all at once, against a single
//! shared [`CancellationToken`]. Ordering between units comes only from the
//! completion signals they exchange. The first unit to fail cancels the
//! token, so unrelated in-flight steps are asked to stop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TaktError};
use crate::graph::TaskGraph;
use crate::output::Output;
use crate::runner::StepRunner;
use crate::unit::{TaskOutcome, UnitResult};

/// Why a run stopped early without a task failing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// Ctrl-C or SIGTERM
    Interrupt,
    Deadline(Duration),
    /// The caller canceled the token
    Canceled,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub succeeded: usize,
    pub failed: usize,
    /// Stopped mid-step by cancellation
    pub canceled: usize,
    pub skipped: usize,
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunReport {
    /// In the order units settled
    pub results: Vec<UnitResult>,
    /// Tasks the tag filter left out
    pub excluded: Vec<String>,
    pub stopped: Option<StopCause>,
    pub duration: Duration,
}

impl RunReport {
    /// The first unit that failed on its own account
    pub fn failure(&self) -> Option<&UnitResult> {
        self.results.iter().find(|r| r.outcome.is_failure())
    }

    pub fn get(&self, name: &str) -> Option<&TaskOutcome> {
        self.results
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outcome)
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.results
            .iter()
            .fold(OutcomeCounts::default(), |mut counts, r| {
                match &r.outcome {
                    TaskOutcome::Succeeded => counts.succeeded += 1,
                    TaskOutcome::Failed(e) if e.is_cancellation() => counts.canceled += 1,
                    TaskOutcome::Failed(_) => counts.failed += 1,
                    TaskOutcome::Skipped(_) => counts.skipped += 1,
                }
                counts
            })
    }

    /// The run's error, if any. Interrupts and caller cancellation are clean.
    pub fn into_result(self) -> Result<()> {
        let stopped = self.stopped;
        if let Some(failed) = self
            .results
            .into_iter()
            .find(|r| r.outcome.is_failure())
        {
            return failed.into_result();
        }

        match stopped {
            Some(StopCause::Deadline(after)) => Err(TaktError::DeadlineExceeded { after }),
            _ => Ok(()),
        }
    }
}

/// Runs a task graph to settlement
#[derive(Clone)]
pub struct Engine {
    runner: Arc<dyn StepRunner>,
    output: Arc<dyn Output>,
}

impl Engine {
    pub fn new(runner: Arc<dyn StepRunner>, output: Arc<dyn Output>) -> Self {
        Self { runner, output }
    }

    /// Run every task concurrently until all have settled.
    ///
    /// Canceling `cancel` stops the run: running steps are terminated and
    /// units still waiting settle as skipped.
    pub async fn run(&self, graph: TaskGraph, cancel: CancellationToken) -> RunReport {
        let started = Instant::now();
        let excluded = graph.excluded().to_vec();
        let units = graph.into_units();

        info!(tasks = units.len(), "starting run");

        let mut set = JoinSet::new();
        for unit in units {
            let name = unit.name().to_string();
            let runner = Arc::clone(&self.runner);
            let sink = self.output.sink(&name);
            let cancel = cancel.clone();

            set.spawn(async move {
                let run = unit.run(runner.as_ref(), &cancel, sink.as_ref());
                match AssertUnwindSafe(run).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(task = %name, "unit panicked");
                        cancel.cancel();
                        UnitResult {
                            outcome: TaskOutcome::Failed(TaktError::Panicked { task: name.clone() }),
                            name,
                            duration: started.elapsed(),
                        }
                    }
                }
            });
        }

        let mut results = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => {
                    debug!(task = %result.name, settled = ?result.outcome.settled(), "unit settled");
                    results.push(result);
                }
                Err(e) => {
                    warn!(error = %e, "unit task did not complete");
                    cancel.cancel();
                }
            }
        }

        let mut report = RunReport {
            results,
            excluded,
            stopped: None,
            duration: started.elapsed(),
        };

        if cancel.is_cancelled() && report.failure().is_none() {
            report.stopped = Some(StopCause::Canceled);
        }

        report
    }

    /// Run with Ctrl-C / SIGTERM, and optionally a deadline, wired to the
    /// shared token. An interrupted run is reported as clean.
    pub async fn run_until_interrupted(
        &self,
        graph: TaskGraph,
        deadline: Option<Duration>,
    ) -> RunReport {
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_for_stop(cancel.clone(), deadline));

        let mut report = self.run(graph, cancel).await;

        watcher.abort();
        if let Ok(Some(cause)) = watcher.await {
            if report.failure().is_none() {
                report.stopped = Some(cause);
            }
        }

        report
    }
}

async fn watch_for_stop(cancel: CancellationToken, deadline: Option<Duration>) -> Option<StopCause> {
    let expired = async {
        match deadline {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending::<()>().await,
        }
    };

    let cause = tokio::select! {
        _ = cancel.cancelled() => return None,
        _ = shutdown_signal() => {
            eprintln!("Interrupted, cleaning up...");
            StopCause::Interrupt
        }
        _ = expired => {
            let after = deadline.unwrap_or_default();
            eprintln!("Deadline of {}s reached, cleaning up...", after.as_secs());
            StopCause::Deadline(after)
        }
    };

    cancel.cancel();
    Some(cause)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
