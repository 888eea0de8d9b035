//! Operator feedback while blocking on the guest.

use console::Term;

/// Feedback for an open-ended wait: one symbol per attempt.
pub trait WaitProgress {
    fn begin(&self, message: &str);
    fn tick(&self);
    fn end(&self);
}

/// Writes `Waiting.`, then a dot per retry, then a newline, to stdout.
pub struct TerminalProgress {
    term: Term,
}

impl TerminalProgress {
    pub fn stdout() -> Self {
        Self {
            term: Term::stdout(),
        }
    }
}

impl WaitProgress for TerminalProgress {
    fn begin(&self, message: &str) {
        // Progress output is best-effort.
        let _ = self.term.write_str(message);
        let _ = self.term.flush();
    }

    fn tick(&self) {
        let _ = self.term.write_str(".");
        let _ = self.term.flush();
    }

    fn end(&self) {
        let _ = self.term.write_line("");
    }
}
