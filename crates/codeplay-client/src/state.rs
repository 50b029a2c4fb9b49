//! Local session state kept by the sync client.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};

use codeplay_core::LanguageId;

/// Connectivity of a [`SyncClient`](crate::SyncClient).
///
/// ```text
/// Disconnected ──▶ Connecting ──▶ Connected
///      ▲                              │
///      └──────────── loss ────────────┘
///
/// any ──shutdown──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: the client was shut down.
    Closed,
}

impl ConnectionStatus {
    /// Sends are only attempted in this state.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One received chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// What the local user currently sees: the selected language and the
/// chat transcript.
///
/// The transcript holds only messages received from the hub. A message
/// this client sent appears once its echo arrives, never optimistically.
#[derive(Debug, Clone)]
pub struct SessionState {
    language: LanguageId,
    chat: VecDeque<ChatEntry>,
    chat_limit: usize,
}

impl SessionState {
    pub fn new(language: LanguageId, chat_limit: usize) -> Self {
        Self {
            language,
            chat: VecDeque::new(),
            chat_limit,
        }
    }

    pub fn language(&self) -> &LanguageId {
        &self.language
    }

    pub fn set_language(&mut self, language: LanguageId) {
        self.language = language;
    }

    /// Appends a received message, evicting the oldest past the limit.
    pub fn push_chat(&mut self, text: String) {
        if self.chat_limit == 0 {
            return;
        }
        while self.chat.len() >= self.chat_limit {
            self.chat.pop_front();
        }
        self.chat.push_back(ChatEntry {
            text,
            received_at: Utc::now(),
        });
    }

    /// Transcript, oldest first.
    pub fn chat(&self) -> impl Iterator<Item = &ChatEntry> {
        self.chat.iter()
    }

    pub fn chat_len(&self) -> usize {
        self.chat.len()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(LanguageId::default(), 500)
    }
}
