//! Outbound line types

/// What a server line is, used to pick its colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Input prompt, written without a trailing newline
    Prompt,
    /// Help, greetings and replies to the issuer
    Info,
    /// Presence and status changes, user lists
    Notice,
    /// Public chat
    Public,
    /// Private chat
    Private,
    /// Something the client got wrong
    Error,
}

impl LineKind {
    fn ansi_color(self) -> Option<&'static str> {
        match self {
            LineKind::Prompt => None,
            LineKind::Notice => Some("34"),
            LineKind::Private => Some("32"),
            LineKind::Public => Some("35"),
            LineKind::Info => Some("33"),
            LineKind::Error => Some("31"),
        }
    }
}

/// A line queued for delivery to one client
///
/// `text` may span several lines; they are written with CR-LF endings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLine {
    pub kind: LineKind,
    pub text: String,
}

impl ServerLine {
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn prompt(text: impl Into<String>) -> Self {
        Self::new(LineKind::Prompt, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(LineKind::Info, text)
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(LineKind::Notice, text)
    }

    pub fn error(reason: impl std::fmt::Display) -> Self {
        Self::new(LineKind::Error, format!("Error: {}", reason))
    }

    /// `alice: hello`
    pub fn public(from: &str, body: &str) -> Self {
        Self::new(LineKind::Public, format!("{}: {}", from, body))
    }

    /// `[private] bob: hi`, as seen by the recipient
    pub fn private(from: &str, body: &str) -> Self {
        Self::new(LineKind::Private, format!("[private] {}: {}", from, body))
    }

    /// `[private to alice] bob: hi`, the sender's confirmation
    pub fn private_echo(from: &str, to: &str, body: &str) -> Self {
        Self::new(
            LineKind::Private,
            format!("[private to {}] {}: {}", to, from, body),
        )
    }

    /// Render to the bytes sent over the wire
    pub fn render(&self, colors: bool) -> String {
        let text = self.text.replace('\n', "\r\n");
        let text = match self.kind.ansi_color() {
            Some(code) if colors => format!("\x1b[{}m{}\x1b[0m", code, text),
            _ => text,
        };

        if self.kind == LineKind::Prompt {
            text
        } else {
            format!("{}\r\n", text)
        }
    }
}
