//! Well-known protocol names and defaults.

/// Event announcing creation of a new channel/leg.
pub const EVENT_CHANNEL_CREATE: &str = "CHANNEL_CREATE";

/// Event announcing a channel was answered.
pub const EVENT_CHANNEL_ANSWER: &str = "CHANNEL_ANSWER";

/// Event announcing a channel hangup.
pub const EVENT_CHANNEL_HANGUP: &str = "CHANNEL_HANGUP";

/// Completion event for a `bgapi` background command.
pub const EVENT_BACKGROUND_JOB: &str = "BACKGROUND_JOB";

/// Hangup cause used when the caller does not supply one.
pub const DEFAULT_HANGUP_CAUSE: &str = "NORMAL_CLEARING";

/// Header prefix under which channel variables appear in events.
pub const VARIABLE_PREFIX: &str = "variable_";
