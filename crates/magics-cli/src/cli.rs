//! Command-line argument definitions for the `magics` binary.
//!
//! Configuration flags are filtered out before clap sees the arguments, so
//! this parser only handles help, version, and the optional one-shot command.

use clap::Parser;

/// Interactive console for an experiment queue server.
#[derive(Parser, Debug)]
#[command(name = "magics", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Command to run once instead of starting the interactive console
    /// (for example `count SIM_det -n 3`).
    #[arg(
        value_name = "COMMAND",
        num_args = 0..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub(crate) command: Vec<String>,
}

impl Cli {
    /// Returns the one-shot command line, if any.
    pub(crate) fn one_shot(&self) -> Option<String> {
        if self.command.is_empty() {
            return None;
        }
        Some(
            shlex::try_join(self.command.iter().map(String::as_str))
                .unwrap_or_else(|_| self.command.join(" ")),
        )
    }
}
