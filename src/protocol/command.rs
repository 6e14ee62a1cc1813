//! Client command parsing

use crate::server::SessionState;

/// A single parsed line of client input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Candidate username sent during name negotiation
    ProposeName(String),

    /// Show the help text
    Help,

    /// Replace the issuer's status (empty clears it)
    SetStatus(String),

    /// List active users with their statuses
    ListUsers,

    /// Directed message to one user
    PrivateMessage { target: String, body: String },

    /// Message to everyone else
    PublicMessage(String),

    /// Leave the chat
    Quit,

    /// Unparseable input; the reason is shown to the issuer
    Invalid(String),
}

/// Parse one line of input in the context of the session's state.
///
/// Returns `None` when the line produces no command at all: blank lines
/// while active, or any input outside the two interactive states.
pub fn parse_line(line: &str, state: SessionState) -> Option<Command> {
    match state {
        SessionState::NegotiatingName => Some(parse_username(line)),
        SessionState::Active => parse_active(line),
        _ => None,
    }
}

fn parse_username(line: &str) -> Command {
    let name = line.trim();
    if name.is_empty() {
        Command::Invalid("Username must not be empty".to_string())
    } else {
        Command::ProposeName(name.to_string())
    }
}

fn parse_active(line: &str) -> Option<Command> {
    if line.trim().is_empty() {
        return None;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::PublicMessage(line.to_string()));
    };

    let (keyword, args) = match rest.split_once(char::is_whitespace) {
        Some((keyword, args)) => (keyword, args),
        None => (rest, ""),
    };

    let command = match keyword.to_ascii_lowercase().as_str() {
        "help" | "h" | "?" => Command::Help,
        "list" | "l" => Command::ListUsers,
        "quit" | "q" => Command::Quit,
        "status" | "s" => Command::SetStatus(args.trim_end().to_string()),
        "message" | "msg" | "m" => parse_private(args),
        "" => Command::Invalid("Missing command name after '/'".to_string()),
        other => Command::Invalid(format!("Unknown command: /{}", other)),
    };

    Some(command)
}

fn parse_private(args: &str) -> Command {
    let args = args.trim_start();
    if args.is_empty() {
        return Command::Invalid("Usage: /message <username> <message> (missing username)".into());
    }

    let (target, body) = match args.split_once(char::is_whitespace) {
        Some((target, body)) => (target, body),
        None => (args, ""),
    };

    if body.trim().is_empty() {
        return Command::Invalid("Usage: /message <username> <message> (missing message)".into());
    }

    Command::PrivateMessage {
        target: target.to_string(),
        body: body.to_string(),
    }
}
