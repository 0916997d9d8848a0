//! Terminal feedback for the tools.
//!
//! Spinner stages for slow steps (model load, calibration solve) and a bar for
//! calibration capture progress. Falls back to plain `==>` lines on stderr
//! when stderr is not a terminal or `--ui plain` is given.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum UiMode {
    #[default]
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        let pretty = match mode {
            UiMode::Pretty => true,
            UiMode::Auto => is_tty,
            UiMode::Plain => false,
        };
        Self { pretty }
    }

    /// Decide from the flag and whether stderr is a terminal.
    pub fn detect(mode: UiMode) -> Self {
        Self::new(mode, std::io::stderr().is_terminal())
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    /// Start a named stage; it is reported finished when the guard drops.
    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Bar counting captured calibration views towards `min_samples`.
    pub fn capture_progress(&self, min_samples: usize) -> CaptureProgress {
        if !self.pretty {
            return CaptureProgress::hidden(min_samples);
        }
        let bar = ProgressBar::new(min_samples as u64);
        bar.set_draw_target(ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template("views {pos}/{len} {wide_bar} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message("c = capture, q = finish");
        CaptureProgress { bar }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Calibration capture counter. Hidden bars track position without drawing.
pub struct CaptureProgress {
    bar: ProgressBar,
}

impl CaptureProgress {
    pub fn hidden(min_samples: usize) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(min_samples as u64);
        Self { bar }
    }

    pub fn set_samples(&self, samples: usize) {
        // Captures past the minimum stretch the bar rather than overflow it.
        if samples as u64 > self.bar.length().unwrap_or(0) {
            self.bar.set_length(samples as u64);
        }
        self.bar.set_position(samples as u64);
    }

    pub fn samples(&self) -> u64 {
        self.bar.position()
    }
}

impl Drop for CaptureProgress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_resolution() {
        assert!(Ui::new(UiMode::Pretty, false).is_pretty());
        assert!(Ui::new(UiMode::Auto, true).is_pretty());
        assert!(!Ui::new(UiMode::Auto, false).is_pretty());
        assert!(!Ui::new(UiMode::Plain, true).is_pretty());
    }

    #[test]
    fn capture_progress_tracks_samples() {
        let progress = CaptureProgress::hidden(15);
        progress.set_samples(4);
        assert_eq!(progress.samples(), 4);
        progress.set_samples(16);
        assert_eq!(progress.samples(), 16);
    }

    #[test]
    fn durations_switch_units() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
