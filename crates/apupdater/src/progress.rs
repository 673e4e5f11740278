//! Terminal progress for update batches.

use std::cell::RefCell;
use std::time::Duration;

use apcore::update::{Reporter, UpdateReport, WorldOutcome};
use indicatif::{ProgressBar, ProgressStyle};

/// Pause after an up-to-date line so quick results stay readable as they scroll by.
const PACE: Duration = Duration::from_millis(250);

/// Draws a bar while a batch runs and prints one line per world.
pub struct ProgressReporter {
    bar: RefCell<Option<ProgressBar>>,
    pace: Duration,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            bar: RefCell::new(None),
            pace: PACE,
        }
    }

    fn println(&self, line: String) {
        match self.bar.borrow().as_ref() {
            Some(bar) => bar.println(line),
            None => println!("{line}"),
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ProgressReporter {
    fn begin(&self, total: usize) {
        let style = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        let bar = ProgressBar::new(total as u64).with_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        *self.bar.borrow_mut() = Some(bar);
    }

    fn checking(&self, world: &str) {
        if let Some(bar) = self.bar.borrow().as_ref() {
            bar.set_message(format!("Checking {world}"));
        }
    }

    fn finished(&self, world: &str, outcome: &WorldOutcome) {
        self.println(outcome_line(world, outcome));
        if let Some(bar) = self.bar.borrow().as_ref() {
            bar.inc(1);
        }
        if outcome.is_up_to_date() {
            std::thread::sleep(self.pace);
        }
    }

    fn notice(&self, message: &str) {
        self.println(format!("! {message}"));
    }

    fn end(&self) {
        if let Some(bar) = self.bar.borrow_mut().take() {
            bar.finish_and_clear();
        }
    }
}

/// One line describing what happened to a world.
pub fn outcome_line(world: &str, outcome: &WorldOutcome) -> String {
    match outcome {
        WorldOutcome::UpToDate { version } => format!("  {world} is up to date ({version})"),
        WorldOutcome::Updated {
            version,
            warning: None,
        } => format!("+ {world} updated to {version}"),
        WorldOutcome::Updated {
            version,
            warning: Some(warning),
        } => format!("+ {world} updated to {version} (warning: {warning})"),
        WorldOutcome::Skipped(reason) => format!("x {world} skipped: {reason}"),
    }
}

/// Counts for a finished batch.
pub fn summary_line(report: &UpdateReport) -> String {
    format!(
        "{} updated, {} up to date, {} skipped",
        report.updated(),
        report.up_to_date(),
        report.skipped()
    )
}
