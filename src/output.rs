//! Task output presentation
//!
//! The engine hands every unit a [`TaskSink`] and writes plain lines to it.
//! Formatting lives here: a timestamp, the task name padded to the longest
//! name and coloured by a hash of the name, then the line.

use std::io::Write;
use std::sync::Arc;

use console::{style, Style};

use crate::engine::{RunReport, StopCause};
use crate::unit::TaskOutcome;

/// Line-oriented sink for one task's output
pub trait TaskSink: Send + Sync {
    fn stdout(&self, line: &str);
    fn stderr(&self, line: &str);
}

/// Hands out one sink per task
pub trait Output: Send + Sync {
    fn sink(&self, task: &str) -> Arc<dyn TaskSink>;
}

const PALETTE: [fn(Style) -> Style; 6] = [
    Style::cyan,
    Style::green,
    Style::magenta,
    Style::yellow,
    Style::blue,
    Style::red,
];

/// FNV-1, 32 bit
fn fnv1(key: &str) -> u32 {
    key.bytes().fold(0x811c_9dc5_u32, |hash, b| {
        hash.wrapping_mul(0x0100_0193) ^ u32::from(b)
    })
}

/// Stable colour for a task name
pub fn task_style(name: &str) -> Style {
    let pick = PALETTE[fnv1(name) as usize % PALETTE.len()];
    pick(Style::new()).bright()
}

/// Default output: `2024/01/31 12:00:00 build   | line`
#[derive(Debug, Clone)]
pub struct PrefixedOutput {
    width: usize,
}

impl PrefixedOutput {
    /// Pads every prefix to the longest of `names`
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let width = names.into_iter().map(str::len).max().unwrap_or(0);
        Self { width }
    }
}

impl Output for PrefixedOutput {
    fn sink(&self, task: &str) -> Arc<dyn TaskSink> {
        let padded = format!("{task:<width$}", width = self.width);
        Arc::new(PrefixedSink {
            prefix: task_style(task).apply_to(padded).to_string(),
        })
    }
}

struct PrefixedSink {
    prefix: String,
}

impl PrefixedSink {
    fn format(&self, line: &str) -> String {
        let now = chrono::Local::now().format("%Y/%m/%d %H:%M:%S");
        format!("{now} {} {line}", self.prefix)
    }
}

impl TaskSink for PrefixedSink {
    fn stdout(&self, line: &str) {
        let _ = writeln!(std::io::stdout().lock(), "{}", self.format(line));
    }

    fn stderr(&self, line: &str) {
        let _ = writeln!(std::io::stderr().lock(), "{}", self.format(line));
    }
}

/// Print the end-of-run summary
pub fn print_summary(report: &RunReport) {
    println!();

    match report.stopped {
        Some(StopCause::Interrupt) => {
            println!("{}", style("Interrupted").yellow().bold());
        }
        Some(StopCause::Deadline(after)) => {
            println!(
                "{} after {:.0}s",
                style("Deadline reached").yellow().bold(),
                after.as_secs_f64()
            );
        }
        Some(StopCause::Canceled) | None => {}
    }

    for result in &report.results {
        let (mark, detail) = match &result.outcome {
            TaskOutcome::Succeeded => (style("✓").green(), String::new()),
            TaskOutcome::Failed(error) if error.is_cancellation() => {
                (style("○").yellow(), "canceled".to_string())
            }
            TaskOutcome::Failed(error) => (style("✗").red(), error.to_string()),
            TaskOutcome::Skipped(reason) => (style("-").yellow(), reason.to_string()),
        };

        println!(
            "{} {} {} {}",
            mark,
            style(&result.name).bold(),
            style(format!("{:.2}s", result.duration.as_secs_f64())).dim(),
            style(detail).dim()
        );
    }

    for name in &report.excluded {
        println!("{} {} {}", style("·").dim(), style(name).dim(), style("filtered").dim());
    }

    let line = counts_line(report);
    if failed(report) {
        println!("{} {}", style("✗").red().bold(), line);
    } else {
        println!("{} {}", style("✓").green().bold(), line);
    }
}

fn counts_line(report: &RunReport) -> String {
    let counts = report.counts();
    format!(
        "{} succeeded, {} failed, {} canceled, {} skipped, {} filtered in {:.2}s",
        counts.succeeded,
        counts.failed,
        counts.canceled,
        counts.skipped,
        report.excluded.len(),
        report.duration.as_secs_f64()
    )
}

/// Whether the run ends in an error exit
fn failed(report: &RunReport) -> bool {
    report.failure().is_some() || matches!(report.stopped, Some(StopCause::Deadline(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaktError;
    use crate::runner::StepError;
    use crate::unit::{SkipReason, UnitResult};
    use std::time::Duration;

    fn result(name: &str, outcome: TaskOutcome) -> UnitResult {
        UnitResult {
            name: name.to_string(),
            outcome,
            duration: Duration::ZERO,
        }
    }

    fn canceled(task: &str) -> TaskOutcome {
        TaskOutcome::Failed(TaktError::TaskFailed {
            task: task.to_string(),
            step: "sleep 30".to_string(),
            source: StepError::Canceled,
        })
    }

    #[test]
    fn test_interrupted_run_counts_no_failures() {
        let report = RunReport {
            results: vec![
                result("a", canceled("a")),
                result("b", TaskOutcome::Skipped(SkipReason::Interrupted)),
            ],
            excluded: vec![],
            stopped: Some(StopCause::Interrupt),
            duration: Duration::ZERO,
        };

        assert!(counts_line(&report).starts_with("0 succeeded, 0 failed, 1 canceled, 1 skipped"));
        assert!(!failed(&report));
    }

    #[test]
    fn test_deadline_marks_run_failed() {
        let report = RunReport {
            results: vec![result("a", canceled("a"))],
            excluded: vec![],
            stopped: Some(StopCause::Deadline(Duration::from_secs(1))),
            duration: Duration::ZERO,
        };

        assert!(failed(&report));
    }

    #[test]
    fn test_fnv1_known_values() {
        assert_eq!(fnv1(""), 0x811c_9dc5);
        assert_eq!(fnv1("a"), 0x050c_5d7e);
        assert_eq!(fnv1("foobar"), 0x31f0_b262);
    }

    #[test]
    fn test_style_is_stable_per_name() {
        console::set_colors_enabled(true);
        let a = task_style("build").apply_to("x").to_string();
        let b = task_style("build").apply_to("x").to_string();
        assert_eq!(a, b);
    }

    #[test]
    fn test_prefix_is_padded_to_longest_name() {
        console::set_colors_enabled(false);
        let output = PrefixedOutput::new(["a", "long-name"]);
        assert_eq!(output.width, 9);

        let sink = PrefixedSink {
            prefix: format!("{:<9}", "a"),
        };
        assert!(sink.format("hello").ends_with("a         hello"));
    }
}
