//! Server module - TCP listener, sessions and the shared user registry

mod connection;
mod dispatcher;
mod listener;
mod registry;
mod session;

pub use dispatcher::{dispatch, format_user_list, Outcome};
pub use listener::ServerListener;
pub use registry::{Recipient, Registry, RegistryError, UserInfo};
pub use session::{CloseReason, Session, SessionState};

use crate::config::Config;
use std::sync::Arc;

/// State every session shares
#[derive(Clone)]
pub struct ServerContext {
    pub registry: Arc<Registry>,
    pub config: Arc<Config>,
}

impl ServerContext {
    pub fn new(config: Config) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            config: Arc::new(config),
        }
    }
}
