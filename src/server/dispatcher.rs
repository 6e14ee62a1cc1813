//! Command dispatch
//!
//! Interprets one parsed command on behalf of an active session. Lines for
//! other users go straight into their queues through the registry; lines for
//! the issuer are returned so the session can queue them on its own path.

use super::registry::{Registry, RegistryError, UserInfo};
use crate::config::ChatConfig;
use crate::protocol::{help_text, Command, ServerLine};

/// Result of dispatching one command
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Lines for the issuer only
    pub replies: Vec<ServerLine>,

    /// New status for the issuer, when it changed
    pub status: Option<String>,

    /// The issuer asked to leave
    pub quit: bool,
}

impl Outcome {
    fn reply(line: ServerLine) -> Self {
        Self {
            replies: vec![line],
            ..Self::default()
        }
    }
}

/// Dispatch `command` issued by the active user `issuer`
pub async fn dispatch(
    command: Command,
    issuer: &str,
    registry: &Registry,
    chat: &ChatConfig,
) -> Outcome {
    match command {
        Command::Help => Outcome::reply(ServerLine::info(help_text())),

        Command::ListUsers => {
            let users = registry.snapshot().await;
            Outcome::reply(ServerLine::notice(format_user_list(&users)))
        }

        Command::SetStatus(status) => {
            if !chat.status_allowed(&status) {
                return Outcome::reply(ServerLine::error(format!(
                    "Status '{}' is not allowed. Choose one from {}.",
                    status,
                    chat.allowed_statuses.join(", ")
                )));
            }
            if let Err(e) = registry.set_status(issuer, &status).await {
                return Outcome::reply(ServerLine::error(e));
            }
            tracing::debug!(username = %issuer, status = %status, "Status updated");

            let confirmation = if status.is_empty() {
                "Status cleared.".to_string()
            } else {
                format!("Updated status to {}.", status)
            };
            Outcome {
                replies: vec![ServerLine::notice(confirmation)],
                status: Some(status),
                quit: false,
            }
        }

        Command::PublicMessage(body) => {
            let line = ServerLine::public(issuer, &body);
            let delivered = registry.broadcast(&line, Some(issuer)).await;
            tracing::debug!(from = %issuer, delivered, "Public message");
            Outcome::default()
        }

        Command::PrivateMessage { target, body } => {
            match send_private(registry, issuer, &target, &body).await {
                Ok(()) => {
                    tracing::debug!(from = %issuer, to = %target, "Private message");
                    Outcome::reply(ServerLine::private_echo(issuer, &target, &body))
                }
                Err(e) => Outcome::reply(ServerLine::error(e)),
            }
        }

        Command::Quit => Outcome {
            replies: vec![ServerLine::info("Goodbye!")],
            status: None,
            quit: true,
        },

        Command::Invalid(reason) => Outcome::reply(ServerLine::error(reason)),

        // Names are only negotiated before the session is active
        Command::ProposeName(_) => Outcome::reply(ServerLine::error("You already have a username")),
    }
}

async fn send_private(
    registry: &Registry,
    issuer: &str,
    target: &str,
    body: &str,
) -> Result<(), RegistryError> {
    if target == issuer {
        return Err(RegistryError::SelfMessage);
    }
    registry
        .send_to(target, ServerLine::private(issuer, body))
        .await
}

/// Render a `/list` reply
pub fn format_user_list(users: &[UserInfo]) -> String {
    let mut out = String::from("Connected users:");
    for user in users {
        if user.status.is_empty() {
            out.push_str(&format!("\n  {}", user.username));
        } else {
            out.push_str(&format!("\n  {} ({})", user.username, user.status));
        }
    }
    out
}
