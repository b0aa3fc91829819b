//! Reports merge progress to whoever is watching: a console progress bar
//! for the CLI, or nothing at all for library callers and tests.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;

/// Receives progress events as the merge works its way through each model.
/// A model's `start_model`/`finish_model` pair always brackets zero or more
/// `advance` calls; `warn` can fire at any time, most often during the
/// post-merge referential-integrity check.
pub trait ProgressReporter {
    fn start_model(&mut self, model: &str, total: usize);
    fn advance(&mut self, model: &str, delta: usize);
    fn finish_model(&mut self, model: &str);
    fn warn(&mut self, message: &str);
}

/// Discards every event. Used by library callers that don't want console
/// output, and by tests.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn start_model(&mut self, _model: &str, _total: usize) {}
    fn advance(&mut self, _model: &str, _delta: usize) {}
    fn finish_model(&mut self, _model: &str) {}
    fn warn(&mut self, _message: &str) {}
}

/// Draws one `indicatif` bar per model, reusing the same `MultiProgress`
/// terminal area across the whole merge so bars for finished models stay
/// visible above the one currently advancing.
pub struct ConsoleReporter {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleReporter {
    fn start_model(&mut self, model: &str, total: usize) {
        let bar = self.multi.add(ProgressBar::new(total as u64));
        bar.set_style(
            ProgressStyle::with_template(
                "{msg:>16} [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        bar.set_message(model.to_string());
        self.bars.insert(model.to_string(), bar);
    }

    fn advance(&mut self, model: &str, delta: usize) {
        if let Some(bar) = self.bars.get(model) {
            bar.inc(delta as u64);
        }
    }

    fn finish_model(&mut self, model: &str) {
        if let Some(bar) = self.bars.get(model) {
            bar.finish();
        }
    }

    fn warn(&mut self, message: &str) {
        self.multi.suspend(|| log::warn!("{message}"));
    }
}
