//! Console writers shared between the prompt and monitor threads.
//!
//! Status changes arrive on background threads while the prompt waits for
//! input, so each stream sits behind a mutex and is flushed after every
//! write. Output therefore appears line by line as it happens.

use std::fmt::Display;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::CLI_TARGET;

/// Cloneable handle to one output stream.
#[derive(Clone)]
pub(crate) struct ConsoleWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl ConsoleWriter {
    pub(crate) fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Writes `text` followed by a newline.
    pub(crate) fn line(&self, text: impl Display) {
        let mut writer = self.lock();
        let result = writeln!(writer, "{text}").and_then(|()| writer.flush());
        report_write_failure(result);
    }

    /// Writes every line of `lines` under one lock so they stay together.
    pub(crate) fn block<I, T>(&self, lines: I)
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        let mut writer = self.lock();
        let result = lines
            .into_iter()
            .try_for_each(|line| writeln!(writer, "{line}"))
            .and_then(|()| writer.flush());
        report_write_failure(result);
    }

    /// Writes `text` without a trailing newline.
    pub(crate) fn prompt(&self, text: &str) {
        let mut writer = self.lock();
        let result = write!(writer, "{text}").and_then(|()| writer.flush());
        report_write_failure(result);
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn report_write_failure(result: std::io::Result<()>) {
    if let Err(error) = result {
        debug!(
            target: CLI_TARGET,
            event = "write_failed",
            error = %error,
            "console write failed"
        );
    }
}

/// Standard output and standard error of one console.
#[derive(Clone)]
pub(crate) struct IoStreams {
    pub(crate) stdout: ConsoleWriter,
    pub(crate) stderr: ConsoleWriter,
}

impl IoStreams {
    pub(crate) fn new(stdout: impl Write + Send + 'static, stderr: impl Write + Send + 'static) -> Self {
        Self {
            stdout: ConsoleWriter::new(stdout),
            stderr: ConsoleWriter::new(stderr),
        }
    }

    /// Reports a failed command.
    ///
    /// The first line is fixed so scripts can detect failures; each reason
    /// follows on its own `***` line.
    pub(crate) fn failure<I, T>(&self, reasons: I)
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        let mut lines = vec![String::from("Failed to run the provided plan.")];
        lines.extend(reasons.into_iter().map(|reason| format!("*** {reason}")));
        self.stderr.block(lines);
    }
}
