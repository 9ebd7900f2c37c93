//! Typed event header names.
//!
//! These are the headers the model resolves by name against the ledger. The
//! ledger and session lookups accept `impl AsRef<str>`, so an [`EventHeader`]
//! can be passed anywhere a raw header string is accepted.

use std::fmt;
use std::str::FromStr;

/// Header names the model resolves against folded events.
///
/// The set is intentionally small: identity, direction, and timing headers the
/// entities care about. Everything else is addressed through the generic
/// string-keyed ledger lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EventHeader {
    EventName,
    UniqueId,
    CallerUniqueId,
    OtherLegUniqueId,
    ChannelCallUuid,
    JobUuid,
    CallDirection,
    AnswerState,
    HangupCause,
    CallerChannelCreatedTime,
    CallerChannelAnsweredTime,
}

impl EventHeader {
    /// Wire-format header name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventName => "Event-Name",
            Self::UniqueId => "Unique-ID",
            Self::CallerUniqueId => "Caller-Unique-ID",
            Self::OtherLegUniqueId => "Other-Leg-Unique-ID",
            Self::ChannelCallUuid => "Channel-Call-UUID",
            Self::JobUuid => "Job-UUID",
            Self::CallDirection => "Call-Direction",
            Self::AnswerState => "Answer-State",
            Self::HangupCause => "Hangup-Cause",
            Self::CallerChannelCreatedTime => "Caller-Channel-Created-Time",
            Self::CallerChannelAnsweredTime => "Caller-Channel-Answered-Time",
        }
    }
}

impl fmt::Display for EventHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for EventHeader {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Error returned when parsing an unrecognized event header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventHeaderError(pub String);

impl fmt::Display for ParseEventHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event header: {}", self.0)
    }
}

impl std::error::Error for ParseEventHeaderError {}

impl FromStr for EventHeader {
    type Err = ParseEventHeaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: &[EventHeader] = &[
            EventHeader::EventName,
            EventHeader::UniqueId,
            EventHeader::CallerUniqueId,
            EventHeader::OtherLegUniqueId,
            EventHeader::ChannelCallUuid,
            EventHeader::JobUuid,
            EventHeader::CallDirection,
            EventHeader::AnswerState,
            EventHeader::HangupCause,
            EventHeader::CallerChannelCreatedTime,
            EventHeader::CallerChannelAnsweredTime,
        ];
        ALL.iter()
            .find(|h| s.eq_ignore_ascii_case(h.as_str()))
            .copied()
            .ok_or_else(|| ParseEventHeaderError(s.to_string()))
    }
}
