use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;

/// Progress event of a slim pass, emitted on every zoom change and every N tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlimProgress {
    pub zoom: u8,
    pub processed: u64,
    pub total: u64,
    pub removed_features: u64,
}

/// Terminal progress bar fed by [`SlimProgress`] events.
pub struct ProgressTracker {
    pub bar: ProgressBar,
    pub total: u64,
    pub is_bar: bool,
}

impl ProgressTracker {
    pub fn new(message: &str, total: u64, use_bar: bool) -> Self {
        let bar = if use_bar && total > 0 {
            let bar = make_progress_bar(total);
            bar.set_message(message.to_string());
            bar
        } else {
            make_spinner(message)
        };
        Self {
            bar,
            total,
            is_bar: use_bar && total > 0,
        }
    }

    pub fn update(&mut self, progress: &SlimProgress) {
        if self.total == 0 && progress.total > 0 {
            self.total = progress.total;
            self.bar.set_length(progress.total);
        }
        self.bar.set_message(format!(
            "zoom {} ({} features removed)",
            progress.zoom, progress.removed_features
        ));
        if self.is_bar {
            let cap = self.total.saturating_sub(1);
            self.bar.set_position(progress.processed.min(cap));
        } else {
            self.bar.set_position(progress.processed);
        }
    }

    pub fn finish(self) {
        if self.is_bar {
            self.bar.set_position(self.total);
        }
        self.bar.finish_and_clear();
    }
}

fn make_progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr_with_hz(10));
    let style = ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(200));
    bar
}

fn make_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg} ({pos} tiles processed)")
        .map(|style| style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

pub fn progress_for_phase(message: &str, total: u64, no_progress: bool) -> Option<ProgressTracker> {
    if no_progress {
        None
    } else {
        Some(ProgressTracker::new(message, total, true))
    }
}
