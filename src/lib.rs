//! chatty - a line-oriented, telnet-compatible chat server
//!
//! This crate provides the core functionality for chatty, including:
//! - Command parsing for the plain-text client protocol
//! - Per-connection sessions and the shared user registry
//! - Configuration management
//!
//! # Architecture
//!
//! chatty runs one task per connection:
//! - The listener accepts TCP connections and hands each to a `Session`
//! - A session negotiates a unique username, then parses and dispatches lines
//! - The `Registry` maps active usernames to their sessions' outbound queues
//! - Each session has a writer task draining its bounded outbound queue

pub mod config;
pub mod protocol;
pub mod server;
