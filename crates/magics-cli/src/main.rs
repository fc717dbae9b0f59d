//! Entry point for the `magics` console.
//!
//! The binary delegates to [`magics_cli::run_with_prompt`], which loads
//! configuration, opens the session for the configured mode, and then either
//! runs the command given on the command line or reads commands from
//! standard input. Passwords typed at a terminal are not echoed.

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use magics_cli::PasswordPrompt;

fn main() -> ExitCode {
    let stdin = io::stdin();
    let password_prompt = if stdin.is_terminal() {
        PasswordPrompt::Hidden
    } else {
        PasswordPrompt::Input
    };
    magics_cli::run_with_prompt(
        std::env::args_os(),
        stdin.lock(),
        io::stdout(),
        io::stderr(),
        password_prompt,
    )
}
