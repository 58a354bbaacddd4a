//! UI utilities for the shell.

use std::io::Write;

pub const PROMPT: &str = "> ";

/// Redisplay the prompt after printing an event
pub fn redisplay_prompt() {
    print!("{}", PROMPT);
    std::io::stdout().flush().ok();
}
