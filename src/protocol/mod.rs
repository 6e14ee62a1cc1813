//! Protocol definitions for the line-oriented chat surface
//!
//! Clients speak plain text, one command or message per line. Lines that
//! start with `/` are commands; everything else is chat.

mod command;
mod message;

pub use command::{parse_line, Command};
pub use message::{LineKind, ServerLine};

use thiserror::Error;

/// Prompt sent while a client is choosing a username
pub const USERNAME_PROMPT: &str = "Username: ";

/// Protocol-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Username must not be empty")]
    EmptyUsername,

    #[error("Username must not contain whitespace")]
    UsernameWhitespace,

    #[error("Username must not start with '/'")]
    UsernameSlash,

    #[error("Username must not contain control characters")]
    UsernameControl,

    #[error("Username is too long: {len} characters (max: {max})")]
    UsernameTooLong { len: usize, max: usize },

    #[error("Line too long (max: {max} bytes)")]
    LineTooLong { max: usize },
}

/// Check a proposed username against the naming rules
///
/// The candidate is expected to be trimmed already; surrounding whitespace
/// is the parser's concern, not this function's.
pub fn validate_username(name: &str, max_len: usize) -> Result<(), ProtocolError> {
    if name.is_empty() {
        return Err(ProtocolError::EmptyUsername);
    }
    if name.starts_with('/') {
        return Err(ProtocolError::UsernameSlash);
    }
    if name.chars().any(char::is_whitespace) {
        return Err(ProtocolError::UsernameWhitespace);
    }
    if name.chars().any(char::is_control) {
        return Err(ProtocolError::UsernameControl);
    }
    let len = name.chars().count();
    if len > max_len {
        return Err(ProtocolError::UsernameTooLong { len, max: max_len });
    }
    Ok(())
}

/// Static help text listing every command
pub fn help_text() -> String {
    [
        "  Usage:",
        "   /help: Print this help message.",
        "   /list: List connected users.",
        "   /message <username> <message>: Send private message to a user.",
        "   /status <text>: Set your status (empty clears it).",
        "   /quit: Quit chatty.",
        "   <message>: Send a public message to all connected users.",
    ]
    .join("\n")
}
