//! Integration tests for configuration loading

use chatty::config::{Config, MIN_OUTBOUND_QUEUE};
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();

    assert_eq!(config.server.port, 6666);
    assert_eq!(config.server.outbound_queue, 256);
    assert_eq!(config.server.idle_timeout(), None);
    assert!(config.chat.announce_presence);
    assert!(config.chat.allowed_statuses.is_empty());
}

#[test]
fn test_partial_file_keeps_other_defaults() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[server]
port = 2323
idle_timeout_secs = 300

[chat]
announce_presence = false
allowed_statuses = ["online", "away"]
"#,
    )?;

    let config = Config::load_from(&path)?;
    assert_eq!(config.server.bind_addr(), "127.0.0.1:2323");
    assert_eq!(config.server.idle_timeout(), Some(Duration::from_secs(300)));
    assert_eq!(config.server.max_line_length, 4096);
    assert!(!config.chat.announce_presence);
    assert!(config.chat.status_allowed("away"));
    assert!(config.chat.status_allowed(""));
    assert!(!config.chat.status_allowed("busy"));

    Ok(())
}

#[test]
fn test_invalid_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[server]\nport = \"not a number\"\n").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"));
}

#[test]
fn test_free_text_status_by_default() {
    let config = Config::default();
    assert!(config.chat.status_allowed("anything at all"));
}

#[test]
fn test_small_outbound_queue_is_raised() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[server]\noutbound_queue = 4\n")?;

    let config = Config::load_from(&path)?;
    assert_eq!(config.server.outbound_queue, 4);
    assert_eq!(config.server.outbound_capacity(), MIN_OUTBOUND_QUEUE);

    Ok(())
}
