//! Progress bar on stderr

use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Instant;

use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use fleetcheck_core::{AuditPhase, ProgressObserver};

const BAR_WIDTH: usize = 30;

/// `[#####-----]` filled in proportion to `done / total`
fn bar(done: usize, total: usize, width: usize) -> String {
    let filled = if total == 0 {
        width
    } else {
        (done.min(total) * width) / total
    };
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

pub(crate) fn format_line(label: &str, done: usize, total: usize, elapsed_secs: f64) -> String {
    format!(
        "{label:<14} {} {done}/{total} {elapsed_secs:.1}s",
        bar(done, total, BAR_WIDTH)
    )
}

pub(crate) fn summary_line(phase: AuditPhase, elapsed_secs: f64) -> String {
    format!("{phase} after {elapsed_secs:.1}s")
}

struct State {
    label: &'static str,
    line_open: bool,
}

/// Redraws a single stderr line as nodes are probed and applications checked
pub struct ProgressBar {
    started: Instant,
    state: Mutex<State>,
}

impl ProgressBar {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            state: Mutex::new(State {
                label: "",
                line_open: false,
            }),
        }
    }

    fn draw(&self, done: usize, total: usize) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let line = format_line(
            state.label,
            done,
            total,
            self.started.elapsed().as_secs_f64(),
        );

        let mut stderr = io::stderr().lock();
        let _ = queue!(stderr, MoveToColumn(0), Clear(ClearType::CurrentLine));
        let _ = write!(stderr, "{line}");
        let _ = stderr.flush();
        state.line_open = true;
    }

    fn finish_line(state: &mut State) {
        if state.line_open {
            let _ = writeln!(io::stderr());
            state.line_open = false;
        }
    }
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ProgressBar {
    fn phase_changed(&self, phase: AuditPhase) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        Self::finish_line(&mut state);
        state.label = match phase {
            AuditPhase::ProbingNodes => "nodes",
            AuditPhase::CheckingApplications => "applications",
            _ => "",
        };

        if phase.is_terminal() {
            let _ = writeln!(
                io::stderr(),
                "{}",
                summary_line(phase, self.started.elapsed().as_secs_f64())
            );
        }
    }

    fn node_probed(&self, _node: &str, _reachable: bool, done: usize, total: usize) {
        self.draw(done, total);
    }

    fn application_checked(&self, _app: &str, done: usize, total: usize) {
        self.draw(done, total);
    }
}
