//! Grouping of bridged session legs under one call id.

use crate::error::ModelResult;
use crate::session::Session;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A call: one or more [`Session`] legs sharing a call id.
///
/// Constructed with its primary leg, so the leg list is never empty. The
/// first leg appended stays the primary for the call's lifetime; call-level
/// operations target it alone and rely on server-side bridge semantics to
/// propagate to the rest.
pub struct Call {
    uuid: String,
    sessions: Mutex<Vec<Arc<Session>>>,
}

impl Call {
    /// Create a call around its primary leg.
    pub fn new(uuid: impl Into<String>, primary: Arc<Session>) -> Self {
        let uuid = uuid.into();
        primary.set_call_uuid(&uuid);
        Self {
            uuid,
            sessions: Mutex::new(vec![primary]),
        }
    }

    /// The call id shared by all legs.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Attach another leg, recording the call id on it.
    pub fn append(&self, session: Arc<Session>) {
        session.set_call_uuid(&self.uuid);
        self.sessions
            .lock()
            .push(session);
    }

    /// The primary (first-attached) leg.
    pub fn primary(&self) -> Arc<Session> {
        // constructor guarantees at least one leg
        Arc::clone(&self.sessions.lock()[0])
    }

    /// Snapshot of all legs, in attachment order.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .lock()
            .clone()
    }

    /// Number of attached legs.
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .len()
    }

    /// Always `false`: a call owns at least its primary leg.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Hang up the call by hanging up the primary leg only.
    ///
    /// The bridge tears the other legs down server-side; their hangup events
    /// arrive through the normal dispatch path.
    pub async fn hangup(&self, cause: Option<&str>) -> ModelResult<()> {
        self.primary()
            .hangup(cause)
            .await
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("uuid", &self.uuid)
            .field("legs", &self.len())
            .finish()
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uuid)
    }
}
