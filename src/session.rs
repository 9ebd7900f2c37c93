//! Per-leg session state and call-control command issuance.

use crate::connection::Connection;
use crate::constants::DEFAULT_HANGUP_CAUSE;
use crate::error::{CallModelError, ModelResult};
use crate::event::{CallDirection, EventRecord};
use crate::headers::EventHeader;
use crate::job::Job;
use crate::ledger::EventLedger;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Timestamps for a leg, epoch seconds. `INFINITY` means "not yet occurred".
#[derive(Debug, Clone, Copy, PartialEq)]
struct SessionTimes {
    create: f64,
    answer: f64,
    originate: f64,
    duration: f64,
}

impl Default for SessionTimes {
    fn default() -> Self {
        Self {
            create: f64::INFINITY,
            answer: f64::INFINITY,
            originate: f64::INFINITY,
            duration: 0.0,
        }
    }
}

/// Model of one call leg's accumulated event-derived state plus command
/// issuance.
///
/// Event-derived state lives in the session's [`EventLedger`] and is read
/// through [`get`](Self::get)/[`lookup`](Self::lookup)/[`variable`](Self::variable).
/// Auxiliary state (flags, timestamps, the app variable namespace) is *not*
/// derived from events — [`update`](Self::update) only folds the event in, and
/// dispatch handlers set the auxiliary fields based on the event's semantic
/// type.
///
/// Command methods format a fixed wire template with the session's own id and
/// forward it through the bound [`Connection`]. They never mutate ledger state
/// directly; state changes arrive later as events.
pub struct Session {
    uuid: String,
    ledger: EventLedger,
    // free-form namespace for applications to stash per-leg state
    vars: Mutex<HashMap<String, String>>,
    times: Mutex<SessionTimes>,
    answered: AtomicBool,
    hungup: AtomicBool,
    bg_job: Mutex<Option<Arc<Job>>>,
    call_uuid: Mutex<Option<String>>,
    partner: Mutex<Weak<Session>>,
    con: Mutex<Option<Arc<dyn Connection>>>,
}

impl Session {
    /// Build a session from its creation event.
    ///
    /// The unique id is resolved via strict lookup of the `Unique-ID` header;
    /// fails with [`CallModelError::HeaderNotFound`] if the seed does not
    /// carry one.
    pub fn new(seed: EventRecord) -> ModelResult<Self> {
        let ledger = EventLedger::with_seed(seed);
        let uuid = ledger.lookup(EventHeader::UniqueId)?;
        Ok(Self::build(uuid, ledger))
    }

    /// Build a session with an explicitly supplied id.
    ///
    /// Supports identifiers assigned before any event is observed, e.g. an
    /// originated leg whose creation event has not arrived yet. The supplied
    /// id overrides whatever the seed resolves to.
    pub fn with_uuid(uuid: impl Into<String>, seed: Option<EventRecord>) -> Self {
        let ledger = match seed {
            Some(record) => EventLedger::with_seed(record),
            None => EventLedger::new(),
        };
        Self::build(uuid.into(), ledger)
    }

    fn build(uuid: String, ledger: EventLedger) -> Self {
        Self {
            uuid,
            ledger,
            vars: Mutex::new(HashMap::new()),
            times: Mutex::new(SessionTimes::default()),
            answered: AtomicBool::new(false),
            hungup: AtomicBool::new(false),
            bg_job: Mutex::new(None),
            call_uuid: Mutex::new(None),
            partner: Mutex::new(Weak::new()),
            con: Mutex::new(None),
        }
    }

    /// The session's unique id.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// The session's event history.
    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    /// Fold a new event into the ledger.
    ///
    /// No other side effects: auxiliary fields (timestamps, flags) are updated
    /// by the dispatching caller based on the event's semantic type.
    pub fn update(&self, event: EventRecord) {
        self.ledger
            .update(event);
    }

    /// Newest-wins header lookup; `None` if absent.
    pub fn get(&self, key: impl AsRef<str>) -> Option<String> {
        self.ledger
            .get(key)
    }

    /// Strict header lookup for values the caller requires to exist.
    pub fn lookup(&self, key: impl AsRef<str>) -> ModelResult<String> {
        self.ledger
            .lookup(key)
    }

    /// Raw record at `index`, newest first.
    pub fn event_at(&self, index: usize) -> ModelResult<EventRecord> {
        self.ledger
            .event_at(index)
    }

    /// Ledger-backed channel variable lookup (`variable_{name}` header).
    ///
    /// Distinct from the app variable namespace ([`var`](Self::var)) — channel
    /// variables come from events, app variables are local state.
    pub fn variable(&self, name: &str) -> Option<String> {
        self.ledger
            .get(format!("{}{}", crate::constants::VARIABLE_PREFIX, name))
    }

    // --- auxiliary (non-event-derived) state ---

    /// Set an app variable in the session's local namespace.
    pub fn set_var(&self, key: impl Into<String>, value: impl Into<String>) {
        self.vars
            .lock()
            .insert(key.into(), value.into());
    }

    /// Read an app variable from the session's local namespace.
    pub fn var(&self, key: &str) -> Option<String> {
        self.vars
            .lock()
            .get(key)
            .cloned()
    }

    /// Snapshot of the app variable namespace.
    pub fn vars(&self) -> HashMap<String, String> {
        self.vars
            .lock()
            .clone()
    }

    /// Whether the leg has been answered.
    pub fn answered(&self) -> bool {
        self.answered
            .load(Ordering::Acquire)
    }

    /// Mark the leg answered.
    pub fn set_answered(&self, answered: bool) {
        self.answered
            .store(answered, Ordering::Release);
    }

    /// Whether the leg has hung up. The session object persists after hangup;
    /// reclaiming it is its owner's responsibility.
    pub fn hungup(&self) -> bool {
        self.hungup
            .load(Ordering::Acquire)
    }

    /// Mark the leg hungup (the logical end of its lifecycle).
    pub fn set_hungup(&self, hungup: bool) {
        self.hungup
            .store(hungup, Ordering::Release);
    }

    /// Background job currently associated with this leg.
    pub fn bg_job(&self) -> Option<Arc<Job>> {
        self.bg_job
            .lock()
            .clone()
    }

    /// Associate (or clear) a background job.
    pub fn set_bg_job(&self, job: Option<Arc<Job>>) {
        *self
            .bg_job
            .lock() = job;
    }

    /// Call this leg belongs to, by call id.
    pub fn call_uuid(&self) -> Option<String> {
        self.call_uuid
            .lock()
            .clone()
    }

    /// Record the owning call id.
    pub fn set_call_uuid(&self, call_uuid: impl Into<String>) {
        *self
            .call_uuid
            .lock() = Some(call_uuid.into());
    }

    /// Link the partner leg of a bridged call.
    pub fn set_partner(&self, partner: &Arc<Session>) {
        *self
            .partner
            .lock() = Arc::downgrade(partner);
    }

    /// The partner leg, if linked and still alive.
    pub fn partner(&self) -> Option<Arc<Session>> {
        self.partner
            .lock()
            .upgrade()
    }

    // --- timestamps (monotonically set: first write wins) ---

    /// Leg creation time, epoch seconds; `INFINITY` until observed.
    pub fn create_time(&self) -> f64 {
        self.times
            .lock()
            .create
    }

    /// Record the creation time. Only takes effect while still unset.
    pub fn set_create_time(&self, epoch_secs: f64) {
        let mut times = self
            .times
            .lock();
        if times.create.is_infinite() {
            times.create = epoch_secs;
        }
    }

    /// Answer time, epoch seconds; `INFINITY` until observed.
    pub fn answer_time(&self) -> f64 {
        self.times
            .lock()
            .answer
    }

    /// Record the answer time. Only takes effect while still unset.
    pub fn set_answer_time(&self, epoch_secs: f64) {
        let mut times = self
            .times
            .lock();
        if times.answer.is_infinite() {
            times.answer = epoch_secs;
        }
    }

    /// Originate time, epoch seconds; `INFINITY` until observed.
    pub fn originate_time(&self) -> f64 {
        self.times
            .lock()
            .originate
    }

    /// Record the originate time. Only takes effect while still unset.
    pub fn set_originate_time(&self, epoch_secs: f64) {
        let mut times = self
            .times
            .lock();
        if times.originate.is_infinite() {
            times.originate = epoch_secs;
        }
    }

    /// Call duration in seconds, maintained by the owning application.
    pub fn duration(&self) -> f64 {
        self.times
            .lock()
            .duration
    }

    /// Set the call duration.
    pub fn set_duration(&self, seconds: f64) {
        self.times
            .lock()
            .duration = seconds;
    }

    // --- derived properties ---

    /// Time from this leg's creation to the partner leg's creation.
    ///
    /// Requires a resolvable partner leg; NaN while either timestamp is still
    /// unset.
    pub fn invite_latency(&self) -> ModelResult<f64> {
        let partner = self
            .partner()
            .ok_or(CallModelError::PartnerUnresolved)?;
        Ok(partner.create_time() - self.create_time())
    }

    /// Time from the partner leg's answer to this leg's answer.
    ///
    /// Requires a resolvable partner leg; NaN while either timestamp is still
    /// unset.
    pub fn answer_latency(&self) -> ModelResult<f64> {
        let partner = self
            .partner()
            .ok_or(CallModelError::PartnerUnresolved)?;
        Ok(self.answer_time() - partner.answer_time())
    }

    /// Resolved `Call-Direction`, via strict lookup.
    pub fn direction(&self) -> ModelResult<CallDirection> {
        let raw = self.lookup(EventHeader::CallDirection)?;
        match raw.parse() {
            Ok(direction) => Ok(direction),
            Err(_) => Err(CallModelError::InvalidHeader {
                key: EventHeader::CallDirection.to_string(),
                value: raw,
            }),
        }
    }

    /// Whether this is an inbound leg. Fails if `Call-Direction` was never
    /// observed, mirroring the strict lookup contract.
    pub fn is_inbound(&self) -> ModelResult<bool> {
        Ok(self.direction()? == CallDirection::Inbound)
    }

    /// Whether this is an outbound leg. Fails if `Call-Direction` was never
    /// observed, mirroring the strict lookup contract.
    pub fn is_outbound(&self) -> ModelResult<bool> {
        Ok(self.direction()? == CallDirection::Outbound)
    }

    // --- connection binding ---

    /// Set or clear the connection handle used for command issuance.
    pub fn set_connection(&self, con: Option<Arc<dyn Connection>>) {
        *self
            .con
            .lock() = con;
    }

    /// Bind a connection for a scope; the returned guard clears the handle on
    /// drop, on every exit path.
    ///
    /// The binding is last-writer-wins and not protected against concurrent
    /// binds — only one task should hold/clear it at a time.
    pub fn bind_connection(
        self: &Arc<Self>,
        con: Arc<dyn Connection>,
    ) -> ConnectionBinding {
        debug!(uuid = %self.uuid, "binding connection");
        self.set_connection(Some(con));
        ConnectionBinding {
            session: Arc::clone(self),
        }
    }

    fn connection(&self) -> ModelResult<Arc<dyn Connection>> {
        self.con
            .lock()
            .clone()
            .ok_or(CallModelError::NotConnected)
    }

    async fn command(&self, text: String) -> ModelResult<()> {
        let con = self.connection()?;
        debug!(uuid = %self.uuid, command = %text, "sending command");
        con.send_command(&text)
            .await
    }

    async fn api(&self, text: String) -> ModelResult<()> {
        let con = self.connection()?;
        debug!(uuid = %self.uuid, command = %text, "sending api command");
        con.send_api(&text)
            .await
            .map(|_| ())
    }

    // --- call control ---

    /// Set a channel variable on this leg.
    pub async fn set_variable(&self, var: &str, value: &str) -> ModelResult<()> {
        self.command(format!("set::{}={}", var, value))
            .await
    }

    /// Unset a channel variable on this leg.
    pub async fn unset_variable(&self, var: &str) -> ModelResult<()> {
        self.command(format!("unset::{}", var))
            .await
    }

    /// Set several channel variables with a single command.
    pub async fn set_variables(&self, params: &[(&str, &str)]) -> ModelResult<()> {
        let pairs = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";");
        self.api(format!("uuid_setvar_multi {} {}", self.uuid, pairs))
            .await
    }

    /// Answer this leg.
    pub async fn answer(&self) -> ModelResult<()> {
        self.command("answer::".to_string())
            .await
    }

    /// Hang up this leg with the given cause (default `NORMAL_CLEARING`).
    pub async fn hangup(&self, cause: Option<&str>) -> ModelResult<()> {
        let cause = cause.unwrap_or(DEFAULT_HANGUP_CAUSE);
        self.api(format!("uuid_kill {} {}", self.uuid, cause))
            .await
    }

    /// Schedule this leg to hang up after `timeout` seconds.
    pub async fn schedule_hangup(&self, timeout: u32, cause: Option<&str>) -> ModelResult<()> {
        let cause = cause.unwrap_or(DEFAULT_HANGUP_CAUSE);
        self.api(format!("sched_hangup +{} {} {}", timeout, self.uuid, cause))
            .await
    }

    /// Schedule a DTMF sequence to play on this leg after `delay` seconds.
    pub async fn schedule_dtmf(
        &self,
        delay: u32,
        sequence: &str,
        tone_duration: Option<u32>,
    ) -> ModelResult<()> {
        let mut cmd = format!(
            "sched_api +{} none uuid_send_dtmf {} {}",
            delay, self.uuid, sequence
        );
        if let Some(duration) = tone_duration {
            cmd.push_str(&format!(" @{}", duration));
        }
        self.api(cmd)
            .await
    }

    /// Play an audio file on this leg (a-leg).
    pub async fn playback(&self, file_path: &str) -> ModelResult<()> {
        self.api(format!(
            "uuid_broadcast {} playback::{} aleg",
            self.uuid, file_path
        ))
        .await
    }

    /// Re-invite a bridged node into or out of the media path.
    pub async fn bypass_media(&self, bypass: bool) -> ModelResult<()> {
        let cmd = if bypass {
            format!("uuid_media off {}", self.uuid)
        } else {
            format!("uuid_media {}", self.uuid)
        };
        self.api(cmd)
            .await
    }

    /// Stop media playback on this leg and move on.
    pub async fn break_playback(&self) -> ModelResult<()> {
        self.api(format!("uuid_break {}", self.uuid))
            .await
    }

    /// Start voicemail/answering-machine detection, optionally auto-stopping
    /// after `timeout` seconds.
    pub async fn start_call_progress_detection(&self, timeout: Option<u32>) -> ModelResult<()> {
        self.api(format!("avmd {} start", self.uuid))
            .await?;
        if let Some(timeout) = timeout {
            self.api(format!(
                "sched_api +{} none avmd {} stop",
                timeout, self.uuid
            ))
            .await?;
        }
        Ok(())
    }

    /// Stop voicemail/answering-machine detection.
    pub async fn stop_call_progress_detection(&self) -> ModelResult<()> {
        self.api(format!("avmd {} stop", self.uuid))
            .await
    }

    /// Park this leg.
    pub async fn park(&self) -> ModelResult<()> {
        self.api(format!("uuid_park {}", self.uuid))
            .await
    }

    /// Execute an application on the chosen leg(s) of this session.
    pub async fn broadcast(&self, path: &str, leg: &str) -> ModelResult<()> {
        self.api(format!("uuid_broadcast {} {} {}", self.uuid, path, leg))
            .await
    }

    /// Bridge this leg to `dest_url` through the given profile.
    ///
    /// `params` pairs become the leading variable-set segment, joined with
    /// `,` in the order supplied; no params produces an empty `{}` segment.
    pub async fn bridge(
        &self,
        profile: &str,
        dest_url: &str,
        params: &[(&str, &str)],
    ) -> ModelResult<()> {
        let varset = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        self.command(format!(
            "bridge::{{{}}}sofia/{}/{}",
            varset, profile, dest_url
        ))
        .await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("uuid", &self.uuid)
            .field("events", &self.ledger.len())
            .field("answered", &self.answered())
            .field("hungup", &self.hungup())
            .finish()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uuid)
    }
}

/// Guard for a scoped connection binding; clears the session's handle on drop.
#[must_use = "dropping the binding immediately clears the connection"]
pub struct ConnectionBinding {
    session: Arc<Session>,
}

impl Drop for ConnectionBinding {
    fn drop(&mut self) {
        debug!(uuid = %self.session.uuid, "clearing connection");
        self.session
            .set_connection(None);
    }
}

impl fmt::Debug for ConnectionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBinding")
            .field("uuid", &self.session.uuid)
            .finish()
    }
}
