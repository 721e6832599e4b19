use crate::ui::icons::{CHECK, CROSS, RETRY, SPARKLE, THINKING};
use crate::usage::{UsageEntry, format_cost, format_tokens};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Terminal UI for one pipeline run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Phase bar: how many phases of the plan have finished
/// - Agent bar: spinner with the current attempt and live agent activity
pub struct PipelineUI {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    agent_bar: ProgressBar,
    verbose: bool,
    current_attempt: AtomicU32,
    max_attempts: AtomicU32,
}

impl PipelineUI {
    /// Create the UI sized for `total_phases`.
    ///
    /// In verbose mode step and thinking lines are printed as well as shown
    /// on the spinner.
    pub fn new(total_phases: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let phase_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░");

        let phase_bar = multi.add(ProgressBar::new(total_phases));
        phase_bar.set_style(phase_style);
        phase_bar.set_prefix("Phases");

        let agent_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let agent_bar = multi.add(ProgressBar::new_spinner());
        agent_bar.set_style(agent_style);
        agent_bar.set_prefix(" Agent");

        Self {
            multi,
            phase_bar,
            agent_bar,
            verbose,
            current_attempt: AtomicU32::new(0),
            max_attempts: AtomicU32::new(0),
        }
    }

    /// Print a line above the bars, falling back to `eprintln!`.
    pub fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn attempt_prefix(&self) -> String {
        let attempt = self.current_attempt.load(Ordering::SeqCst);
        let max = self.max_attempts.load(Ordering::SeqCst);
        format!("Attempt {}/{}", style(attempt).cyan(), max)
    }

    /// Resize the phase bar once the plan is known.
    pub fn set_total(&self, total_phases: u64) {
        self.phase_bar.set_length(total_phases);
    }

    pub fn start_phase(&self, phase: &str, label: &str) {
        self.phase_bar
            .set_message(format!("{}: {}", style(phase).yellow(), label));
    }

    /// Start the spinner for one agent call.
    pub fn start_attempt(&self, attempt: u32, max: u32) {
        self.current_attempt.store(attempt, Ordering::SeqCst);
        self.max_attempts.store(max, Ordering::SeqCst);
        self.agent_bar.reset();
        self.agent_bar.set_message(format!(
            "{} {}",
            self.attempt_prefix(),
            style("(waiting for agent...)").dim()
        ));
        self.agent_bar.enable_steady_tick(Duration::from_millis(100));
    }

    pub fn log_step(&self, msg: &str) {
        self.agent_bar
            .set_message(format!("{} {}", self.attempt_prefix(), style(format!("({})", msg)).dim()));
        if self.verbose {
            self.print_line(format!("    {} {}", style("→").dim(), style(msg).dim()));
        }
    }

    /// Refresh the spinner with wall-clock time, `Xs` or `Xm Ys`.
    pub fn update_elapsed(&self, elapsed: Duration) {
        let secs = elapsed.as_secs();
        let time_str = if secs >= 60 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}s", secs)
        };
        self.agent_bar.set_message(format!(
            "{} {}",
            self.attempt_prefix(),
            style(format!("({})", time_str)).dim()
        ));
    }

    /// Show a short note from the agent's stream.
    pub fn show_activity(&self, snippet: &str) {
        self.agent_bar.set_message(format!(
            "{} {}",
            self.attempt_prefix(),
            style(format!("{}{}", THINKING, snippet)).dim()
        ));
        if self.verbose {
            self.print_line(format!("    {}{}", THINKING, style(snippet).dim()));
        }
    }

    pub fn attempt_rejected(&self, reason: &str) {
        self.print_line(format!(
            "    {}{}",
            RETRY,
            style(format!("Response rejected, retrying: {}", reason)).yellow()
        ));
    }

    /// Advance the phase bar and stop the spinner.
    pub fn phase_complete(&self, phase: &str, usage: &UsageEntry) {
        self.phase_bar.inc(1);
        self.agent_bar.finish_and_clear();
        self.print_line(format!(
            "{}{} {}",
            CHECK,
            style(phase).green().bold(),
            style(format!(
                "({} in / {} out, {})",
                format_tokens(usage.input_tokens),
                format_tokens(usage.output_tokens),
                format_cost(usage.estimated_cost)
            ))
            .dim()
        ));
    }

    /// Report a failed phase without advancing the phase bar.
    pub fn phase_failed(&self, phase: &str, reason: &str) {
        self.agent_bar.finish_and_clear();
        self.print_line(format!(
            "{}{} failed: {}",
            CROSS,
            style(phase).red().bold(),
            reason
        ));
    }

    /// Clear the bars and print the closing line.
    pub fn finish(&self, success: bool, summary: &str) {
        self.agent_bar.finish_and_clear();
        self.phase_bar.finish_and_clear();
        let icon = if success { SPARKLE } else { CROSS };
        self.print_line(format!("{}{}", icon, summary));
    }
}
