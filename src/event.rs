//! Protocol event records as delivered by the connection layer.

use crate::constants::VARIABLE_PREFIX;
use crate::headers::EventHeader;
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// One externally-delivered event: an opaque key→value header bag with an
/// optional body.
///
/// Records are produced by the connection layer and consumed read-only by the
/// model; the setters exist for the connection layer and for tests. Equality is
/// structural and only used in tests — the model never compares records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl EventRecord {
    /// Create a new empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a header by name (case-sensitive).
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .map(|s| s.as_str())
    }

    /// All headers as a map.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Set or overwrite a header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .insert(name.into(), value.into());
    }

    /// Builder-style [`set_header`](Self::set_header), handy for tests and fixtures.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Event body (the content after the blank line in plain-text events).
    pub fn body(&self) -> Option<&str> {
        self.body
            .as_deref()
    }

    /// Set the event body.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = Some(body.into());
    }

    /// `Event-Name` header.
    pub fn event_name(&self) -> Option<&str> {
        self.header(EventHeader::EventName)
    }

    /// `Unique-ID` header, falling back to `Caller-Unique-ID`.
    pub fn unique_id(&self) -> Option<&str> {
        self.header(EventHeader::UniqueId)
            .or_else(|| self.header(EventHeader::CallerUniqueId))
    }

    /// `Job-UUID` header from `BACKGROUND_JOB` events.
    pub fn job_uuid(&self) -> Option<&str> {
        self.header(EventHeader::JobUuid)
    }

    /// `Hangup-Cause` header (e.g. `NORMAL_CLEARING`, `USER_BUSY`).
    pub fn hangup_cause(&self) -> Option<&str> {
        self.header(EventHeader::HangupCause)
    }

    /// Parse the `Call-Direction` header into a [`CallDirection`].
    pub fn call_direction(&self) -> Option<CallDirection> {
        self.header(EventHeader::CallDirection)?
            .parse()
            .ok()
    }

    /// Look up a channel variable by name.
    ///
    /// Checks the `variable_{name}` header, which is how the server exposes
    /// channel variables in events.
    pub fn variable(&self, name: &str) -> Option<&str> {
        let key = format!("{}{}", VARIABLE_PREFIX, name);
        self.header(&key)
    }

    /// Serialize to the plain-text wire shape with percent-encoded header
    /// values, for introspection and debugging.
    ///
    /// `Event-Name` is emitted first, remaining headers are sorted
    /// alphabetically for deterministic output.
    pub fn to_plain_format(&self) -> String {
        use std::fmt::Write;

        let name_key = EventHeader::EventName.as_str();
        let mut out = String::new();
        let mut line = |key: &str, value: &str| {
            let _ = writeln!(
                out,
                "{}: {}",
                key,
                percent_encode(value.as_bytes(), NON_ALPHANUMERIC)
            );
        };

        if let Some(name) = self.event_name() {
            line(name_key, name);
        }

        let mut rest: Vec<_> = self
            .headers
            .iter()
            .filter(|(k, _)| k.as_str() != name_key && k.as_str() != "Content-Length")
            .collect();
        rest.sort_by_key(|(k, _)| k.as_str());
        for (key, value) in rest {
            line(key, value);
        }

        match &self.body {
            Some(body) => {
                let _ = writeln!(out, "Content-Length: {}", body.len());
                out.push('\n');
                out.push_str(body);
            }
            None => out.push('\n'),
        }

        out
    }
}

/// Call direction from the `Call-Direction` header. Wire format is lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an invalid call direction string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCallDirectionError(pub String);

impl fmt::Display for ParseCallDirectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown call direction: {}", self.0)
    }
}

impl std::error::Error for ParseCallDirectionError {}

impl FromStr for CallDirection {
    type Err = ParseCallDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s
            .to_lowercase()
            .as_str()
        {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            _ => Err(ParseCallDirectionError(s.to_string())),
        }
    }
}
