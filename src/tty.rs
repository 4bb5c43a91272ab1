//! Terminal I/O utilities for CLI.
//!
//! Provides TTY detection and operator prompting.

use std::io::{self, BufRead, IsTerminal, Write};

use sfdeploy::confirm::{self, Confirm};

pub fn is_stdin_tty() -> bool {
    io::stdin().is_terminal()
}

pub fn prompt(message: &str) -> sfdeploy::Result<String> {
    eprint!("{}", message);
    io::stderr().flush().ok();

    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line).map_err(|e| {
        sfdeploy::Error::new(
            sfdeploy::ErrorCode::InternalIoError,
            format!("Failed to read input: {}", e),
            serde_json::Value::Null,
        )
    })?;

    Ok(line.trim().to_string())
}

/// Asks on the terminal. Without one, every answer is no.
pub struct TtyConfirm;

impl Confirm for TtyConfirm {
    fn confirm(&self, question: &str) -> sfdeploy::Result<bool> {
        if !is_stdin_tty() {
            sfdeploy::log_status!("confirm", "{} no (stdin is not a terminal)", question);
            return Ok(false);
        }

        let answer = prompt(&format!("{} ", question))?;
        Ok(confirm::is_affirmative(&answer))
    }
}

/// Print status message to stderr if running in a terminal.
pub fn status(message: &str) {
    if io::stderr().is_terminal() {
        eprintln!("{}", message);
    }
}
