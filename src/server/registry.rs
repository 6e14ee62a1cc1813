//! Session registry - the shared directory of active users
//!
//! The registry maps usernames to an addressable handle for each active
//! session. It never owns a session or its connection: a handle is just the
//! session's outbound queue plus the token used to ask it to disconnect.
//!
//! All access goes through one `RwLock`. No method holds the lock across
//! I/O; fan-out clones the recipient handles under the lock and delivers
//! after releasing it.

use crate::protocol::ServerLine;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Registry errors, all reported back to the issuing client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("A user named '{0}' is already connected. Try again...")]
    NameTaken(String),

    #[error("No such user: {0}")]
    NoSuchUser(String),

    #[error("You can't send private messages to yourself.")]
    SelfMessage,

    #[error("Message to {0} could not be delivered")]
    Undeliverable(String),
}

/// Addressable, non-owning reference to one session
#[derive(Debug, Clone)]
pub struct Recipient {
    id: Uuid,
    sender: mpsc::Sender<ServerLine>,
    kill: CancellationToken,
}

impl Recipient {
    pub fn new(id: Uuid, sender: mpsc::Sender<ServerLine>, kill: CancellationToken) -> Self {
        Self { id, sender, kill }
    }

    /// Session this handle points at
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a line without waiting.
    ///
    /// A full queue means the client is not keeping up; the session is asked
    /// to disconnect and `false` is returned. A closed queue means the
    /// session is already going away.
    pub fn deliver(&self, line: ServerLine) -> bool {
        match self.sender.try_send(line) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(session = %self.id, "Outbound queue exceeded, disconnecting");
                self.kill.cancel();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// One row of a `/list` snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    pub status: String,
    pub joined_at: DateTime<Utc>,
}

struct Member {
    recipient: Recipient,
    status: String,
    joined_at: DateTime<Utc>,
}

/// Process-wide directory of active sessions, keyed by username
#[derive(Default)]
pub struct Registry {
    members: RwLock<HashMap<String, Member>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `username` if nobody holds it yet.
    ///
    /// The check and the insert happen under one write lock, so of several
    /// concurrent claims for the same name exactly one succeeds.
    pub async fn claim(&self, username: &str, recipient: Recipient) -> Result<(), RegistryError> {
        let mut members = self.members.write().await;
        if members.contains_key(username) {
            return Err(RegistryError::NameTaken(username.to_string()));
        }
        members.insert(
            username.to_string(),
            Member {
                recipient,
                status: String::new(),
                joined_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Remove `username` if it still belongs to session `id`.
    ///
    /// Returns the join time of the removed entry.
    pub async fn release(&self, username: &str, id: Uuid) -> Option<DateTime<Utc>> {
        let mut members = self.members.write().await;
        let owned = members
            .get(username)
            .is_some_and(|member| member.recipient.id == id);
        if !owned {
            return None;
        }
        members.remove(username).map(|member| member.joined_at)
    }

    /// Update the status shown for `username`
    pub async fn set_status(&self, username: &str, status: &str) -> Result<(), RegistryError> {
        let mut members = self.members.write().await;
        let member = members
            .get_mut(username)
            .ok_or_else(|| RegistryError::NoSuchUser(username.to_string()))?;
        member.status = status.to_string();
        Ok(())
    }

    /// Consistent snapshot of all active users, sorted by username
    pub async fn snapshot(&self) -> Vec<UserInfo> {
        let members = self.members.read().await;
        let mut users: Vec<UserInfo> = members
            .iter()
            .map(|(name, member)| UserInfo {
                username: name.clone(),
                status: member.status.clone(),
                joined_at: member.joined_at,
            })
            .collect();
        drop(members);

        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    /// Active usernames, sorted
    pub async fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.members.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.members.read().await.contains_key(username)
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }

    /// Handle for `username`, if active
    pub async fn lookup(&self, username: &str) -> Option<Recipient> {
        self.members
            .read()
            .await
            .get(username)
            .map(|m| m.recipient.clone())
    }

    /// Handles for every active user except `except`
    pub async fn recipients(&self, except: Option<&str>) -> Vec<Recipient> {
        self.members
            .read()
            .await
            .iter()
            .filter(|(name, _)| Some(name.as_str()) != except)
            .map(|(_, m)| m.recipient.clone())
            .collect()
    }

    /// Deliver `line` to every active user except `except`.
    ///
    /// Returns how many recipients accepted the line. A recipient that
    /// cannot accept it is asked to disconnect; the others still get it.
    pub async fn broadcast(&self, line: &ServerLine, except: Option<&str>) -> usize {
        let recipients = self.recipients(except).await;
        recipients
            .iter()
            .filter(|r| r.deliver(line.clone()))
            .count()
    }

    /// Deliver `line` to exactly one user
    pub async fn send_to(&self, username: &str, line: ServerLine) -> Result<(), RegistryError> {
        let recipient = self
            .lookup(username)
            .await
            .ok_or_else(|| RegistryError::NoSuchUser(username.to_string()))?;
        if recipient.deliver(line) {
            Ok(())
        } else {
            Err(RegistryError::Undeliverable(username.to_string()))
        }
    }
}
