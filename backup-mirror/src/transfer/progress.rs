//! Progress reporting for the plan and copy phases.
//!
//! Each phase gets its own bar on stderr. Bars are hidden when progress is
//! turned off or stderr is not a terminal, but still count, so callers never
//! need to branch on visibility.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PLAN_TEMPLATE: &str =
    "{spinner:.green} {prefix} [{wide_bar:.cyan/blue}] {pos}/{len} entries ({eta})";
const COPY_TEMPLATE: &str =
    "{spinner:.green} {prefix} [{wide_bar:.cyan/blue}] {pos}/{len} files, {msg} ({eta})";

/// What a phase counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseUnit {
    Entries,
    Files,
}

/// Hands out a progress bar per phase
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressReporter {
    visible: bool,
}

impl ProgressReporter {
    pub fn new(visible: bool) -> Self {
        Self { visible }
    }

    /// Counts without drawing anything
    pub fn hidden() -> Self {
        Self { visible: false }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn phase(&self, label: &'static str, total: u64, unit: PhaseUnit) -> PhaseProgress {
        let bar = if self.visible {
            let bar = ProgressBar::new(total);
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            let bar = ProgressBar::hidden();
            bar.set_length(total);
            bar
        };

        let template = match unit {
            PhaseUnit::Entries => PLAN_TEMPLATE,
            PhaseUnit::Files => COPY_TEMPLATE,
        };
        bar.set_style(
            ProgressStyle::with_template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(label);

        PhaseProgress {
            bar,
            bytes: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Progress of one phase, cloned into every worker of that phase
#[derive(Clone)]
pub struct PhaseProgress {
    bar: ProgressBar,
    bytes: Arc<AtomicU64>,
}

impl PhaseProgress {
    pub fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    /// Count one finished copy of `bytes` bytes
    pub fn record_copy(&self, bytes: u64) {
        let total = self.bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.bar.set_message(format!(
            "{} at {}",
            format_bytes(total),
            format_speed(total, self.bar.elapsed())
        ));
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];

/// Format a byte count, exact below one KiB
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", size, UNITS[unit])
}

/// Throughput over `elapsed`, zero when nothing measurable elapsed
pub fn format_speed(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    };
    format!("{}/s", format_bytes(rate))
}

/// Most runs against an unchanged tree finish in well under a second
pub fn format_duration(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    match seconds {
        0 => format!("{}ms", elapsed.as_millis()),
        1..=59 => format!("{:.1}s", elapsed.as_secs_f64()),
        60..=3599 => format!("{}m {}s", seconds / 60, seconds % 60),
        _ => format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60),
    }
}
