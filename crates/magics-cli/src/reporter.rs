//! Console rendering of job status updates.

use magics_session::{JobState, STATUS_UNKNOWN, StatusReporter, StatusUpdate};

use crate::output::IoStreams;

/// Printed once the server has acknowledged a submission.
pub(crate) const SUBMITTED: &str = "Plan has been submitted successfully!";

/// Prints each status change as soon as it is reported.
///
/// Failures and lost jobs repeat the command line that submitted the job,
/// since they usually arrive after later commands have been typed.
pub(crate) struct ConsoleReporter {
    streams: IoStreams,
    command: String,
}

impl ConsoleReporter {
    pub(crate) fn new(streams: IoStreams, command: impl Into<String>) -> Self {
        Self {
            streams,
            command: command.into(),
        }
    }

    fn command_line(&self) -> String {
        format!("*** Command: {}", self.command)
    }
}

impl StatusReporter for ConsoleReporter {
    fn report(&self, update: &StatusUpdate) {
        match update {
            StatusUpdate::Changed(status) => {
                let line = format!("[{}] {}", status.correlation_id(), status.state());
                if status.state() == JobState::Queued {
                    self.streams.stdout.block([String::from(SUBMITTED), line]);
                } else {
                    self.streams.stdout.line(line);
                }
            }
            StatusUpdate::Terminal(status) => {
                let correlation_id = status.correlation_id();
                let mut lines = vec![format!("[{correlation_id}] {}", status.state())];
                if !status.run_uids().is_empty() {
                    lines.push(format!(
                        "[{correlation_id}] Run UIDs: {}",
                        status.run_uids().join(" ")
                    ));
                }
                self.streams.stdout.block(lines);
                if status.state() != JobState::Succeeded {
                    let mut details: Vec<String> =
                        status.error().into_iter().map(str::to_owned).collect();
                    details.push(self.command_line());
                    self.streams.stderr.block(details);
                }
            }
            StatusUpdate::Unknown {
                correlation_id,
                reason,
            } => {
                self.streams.stderr.block([
                    format!("[{correlation_id}] {STATUS_UNKNOWN}"),
                    format!("*** {reason}"),
                    self.command_line(),
                ]);
            }
        }
    }
}
