//! The transport seam between the model and the physical socket layer.
//!
//! The model never owns a socket. Entities issue formatted command strings
//! through a [`Connection`] capability and consume [`EventRecord`]s the
//! owning application feeds back in. Reconnect, auth, and wire framing are
//! the implementation's concern and out of scope here.

use crate::error::ModelResult;
use async_trait::async_trait;

/// Reply classification per the control protocol.
///
/// Commands return `+OK …` on success and `-ERR …` on failure. A handful of
/// commands return a raw value with no prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReplyStatus {
    /// Reply text starts with `+OK` or is absent/empty.
    Ok,
    /// Reply text starts with `-ERR`.
    Err,
    /// Reply text present but matches neither prefix.
    Other,
}

/// Raw response returned by [`Connection::send_api`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    reply_text: Option<String>,
    body: Option<String>,
    status: ReplyStatus,
}

impl CommandReply {
    /// Status is derived from the reply text at construction.
    pub fn new(reply_text: Option<String>, body: Option<String>) -> Self {
        let status = match reply_text.as_deref() {
            None | Some("") => ReplyStatus::Ok,
            Some(t) if t.starts_with("+OK") => ReplyStatus::Ok,
            Some(t) if t.starts_with("-ERR") => ReplyStatus::Err,
            Some(_) => ReplyStatus::Other,
        };
        Self {
            reply_text,
            body,
            status,
        }
    }

    /// A bare successful reply with no body.
    pub fn ok() -> Self {
        Self::new(Some("+OK".to_string()), None)
    }

    /// `true` if the reply text is `+OK` or absent.
    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    /// Classification of the reply text.
    pub fn reply_status(&self) -> ReplyStatus {
        self.status
    }

    /// Raw reply text (e.g. `+OK`, `-ERR invalid command`).
    pub fn reply_text(&self) -> Option<&str> {
        self.reply_text
            .as_deref()
    }

    /// Response body, if the command produced one.
    pub fn body(&self) -> Option<&str> {
        self.body
            .as_deref()
    }
}

/// Capability for pushing formatted command strings out to the server.
///
/// Implementations are expected to propagate transport failures unmodified;
/// the model performs no local error handling on the command path.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Fire-and-forget command send (no reply expected by the caller).
    async fn send_command(&self, text: &str) -> ModelResult<()>;

    /// Send an API command and return the raw reply.
    async fn send_api(&self, text: &str) -> ModelResult<CommandReply>;
}
