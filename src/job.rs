//! Background job futures.
//!
//! A [`Job`] correlates a background command (issued via `bgapi`-style
//! dispatch) with its eventual completion event. The issuing side creates the
//! job from the seed event carrying the server-assigned `Job-UUID`; the event
//! dispatch side resolves it exactly once with [`complete`](Job::complete) or
//! [`fail`](Job::fail); any number of consumers await the result with
//! [`get`](Job::get) / [`wait`](Job::wait).

use crate::error::{CallModelError, JobError, ModelResult};
use crate::event::EventRecord;
use crate::headers::EventHeader;
use crate::ledger::EventLedger;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

/// Result-transform callback applied at completion time.
///
/// Receives the raw response and the job's keyword payload (merged with any
/// extras supplied to [`Job::complete_with`]) and produces the stored result.
pub type ResultTransform = Box<dyn Fn(&str, &HashMap<String, String>) -> String + Send + Sync>;

/// Optional construction parameters for a [`Job`].
///
/// The keyword payload is a fresh map per job; it is never shared between
/// instances.
#[derive(Default)]
pub struct JobOptions {
    /// Session this job belongs to, if it targets an active leg.
    pub session_uuid: Option<String>,
    /// Transform applied to the response at completion time.
    pub callback: Option<ResultTransform>,
    /// Caller-supplied keyword payload handed to the callback.
    pub kwargs: HashMap<String, String>,
}

impl fmt::Debug for JobOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobOptions")
            .field("session_uuid", &self.session_uuid)
            .field("callback", &self.callback.as_ref().map(|_| "<fn>"))
            .field("kwargs", &self.kwargs)
            .finish()
    }
}

/// Single-assignment future for a background command.
///
/// State machine: `Pending → Completed(success)` or `Pending → Completed(failure)`.
/// The first completing call wins; there is no re-arming. A second `complete`
/// or `fail` is a programming error reported as
/// [`CallModelError::JobAlreadyComplete`], never silent state corruption.
///
/// The completion signal is a one-shot multi-waiter gate (a `watch` channel):
/// all waiters are released when it fires and it is never reset.
pub struct Job {
    uuid: String,
    ledger: EventLedger,
    session_uuid: Option<String>,
    launch_time: Instant,
    callback: Option<ResultTransform>,
    kwargs: Mutex<HashMap<String, String>>,
    slot: Mutex<Option<Result<String, JobError>>>,
    claimed: AtomicBool,
    failed: AtomicBool,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl Job {
    /// Build a job from its seed event.
    ///
    /// The job id is resolved via strict lookup of the `Job-UUID` header;
    /// fails with [`CallModelError::HeaderNotFound`] if the seed does not
    /// carry one.
    pub fn new(seed: EventRecord) -> ModelResult<Self> {
        Self::with_options(seed, JobOptions::default())
    }

    /// Build a job with an owning session, result transform, and/or payload.
    pub fn with_options(seed: EventRecord, options: JobOptions) -> ModelResult<Self> {
        let ledger = EventLedger::with_seed(seed);
        let uuid = ledger.lookup(EventHeader::JobUuid)?;
        let (done_tx, done_rx) = watch::channel(false);

        Ok(Self {
            uuid,
            ledger,
            session_uuid: options.session_uuid,
            launch_time: Instant::now(),
            callback: options.callback,
            kwargs: Mutex::new(options.kwargs),
            slot: Mutex::new(None),
            claimed: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            done_tx,
            done_rx,
        })
    }

    /// Server-assigned job id.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Owning session id, if the job targets an active leg.
    pub fn session_uuid(&self) -> Option<&str> {
        self.session_uuid
            .as_deref()
    }

    /// When the job was constructed (i.e. when the command was launched).
    pub fn launch_time(&self) -> Instant {
        self.launch_time
    }

    /// The job's event history.
    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    /// Fold an intermediate progress event into the job's ledger.
    ///
    /// Does not affect completion state — the final completion event is
    /// reported separately through [`complete`](Self::complete)/[`fail`](Self::fail).
    pub fn update(&self, event: EventRecord) {
        self.ledger
            .update(event);
    }

    /// Resolve the job successfully and return the stored result.
    ///
    /// Applies the result transform if one was supplied at construction,
    /// otherwise stores the raw response. Releases all waiters.
    pub fn complete(&self, response: impl Into<String>) -> ModelResult<String> {
        self.finish(response.into(), HashMap::new(), false)
    }

    /// [`complete`](Self::complete) with extra keyword arguments merged into
    /// the payload before the transform runs.
    pub fn complete_with(
        &self,
        response: impl Into<String>,
        extra: HashMap<String, String>,
    ) -> ModelResult<String> {
        self.finish(response.into(), extra, false)
    }

    /// Resolve the job via the failure path.
    ///
    /// The produced result is wrapped in a [`JobError`] and the failure flag
    /// is set before the completion signal fires. Returns the (transformed)
    /// response value that was wrapped.
    pub fn fail(&self, response: impl Into<String>) -> ModelResult<String> {
        self.finish(response.into(), HashMap::new(), true)
    }

    /// [`fail`](Self::fail) with extra keyword arguments merged into the payload.
    pub fn fail_with(
        &self,
        response: impl Into<String>,
        extra: HashMap<String, String>,
    ) -> ModelResult<String> {
        self.finish(response.into(), extra, true)
    }

    /// Single entry point for both completion paths.
    fn finish(
        &self,
        response: String,
        extra: HashMap<String, String>,
        failed: bool,
    ) -> ModelResult<String> {
        // Claim resolution before running the callback. The callback runs
        // with no job lock held, so it may re-enter the job (and observe
        // `JobAlreadyComplete`) without deadlocking.
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CallModelError::JobAlreadyComplete);
        }

        let value = match &self.callback {
            Some(cb) => {
                let kwargs = {
                    let mut kwargs = self
                        .kwargs
                        .lock();
                    kwargs.extend(extra);
                    kwargs.clone()
                };
                cb(&response, &kwargs)
            }
            None => response,
        };

        if failed {
            self.failed
                .store(true, Ordering::Release);
            *self
                .slot
                .lock() = Some(Err(JobError::new(value.clone())));
        } else {
            *self
                .slot
                .lock() = Some(Ok(value.clone()));
        }

        // Fire the one-shot gate; released waiters will find the slot filled.
        let _ = self
            .done_tx
            .send(true);
        debug!(job_uuid = %self.uuid, failed, "job resolved");
        Ok(value)
    }

    /// Await completion and return the stored result.
    ///
    /// With a timeout, fails with [`CallModelError::JobTimeout`] if it elapses
    /// first; without one, waits indefinitely. A job resolved via the failure
    /// path surfaces [`CallModelError::Job`] here.
    pub async fn get(&self, timeout: Option<Duration>) -> ModelResult<String> {
        self.await_done(timeout)
            .await?;
        self.read_result()
    }

    /// Alias for [`get`](Self::get) with no timeout.
    pub async fn result(&self) -> ModelResult<String> {
        self.get(None)
            .await
    }

    /// Await completion, discarding the result value.
    pub async fn wait(&self, timeout: Option<Duration>) -> ModelResult<()> {
        self.await_done(timeout)
            .await
    }

    /// Non-blocking poll of the completion signal.
    pub fn ready(&self) -> bool {
        *self
            .done_rx
            .borrow()
    }

    /// Whether the job completed without error.
    ///
    /// Fails with [`CallModelError::JobNotComplete`] if called before
    /// completion.
    pub fn successful(&self) -> ModelResult<bool> {
        if !self.ready() {
            return Err(CallModelError::JobNotComplete);
        }
        Ok(!self
            .failed
            .load(Ordering::Acquire))
    }

    async fn await_done(&self, timeout: Option<Duration>) -> ModelResult<()> {
        let mut rx = self
            .done_rx
            .clone();
        let gate = rx.wait_for(|done| *done);
        match timeout {
            Some(t) => {
                tokio::time::timeout(t, gate)
                    .await
                    .map_err(|_| CallModelError::JobTimeout { timeout: t })?
                    // the sender lives in self, so the channel cannot close
                    .map(|_| ())
                    .map_err(|_| CallModelError::JobNotComplete)
            }
            None => gate
                .await
                .map(|_| ())
                .map_err(|_| CallModelError::JobNotComplete),
        }
    }

    fn read_result(&self) -> ModelResult<String> {
        match self
            .slot
            .lock()
            .clone()
        {
            Some(Ok(value)) => Ok(value),
            Some(Err(err)) => Err(CallModelError::Job(err)),
            // unreachable after the gate fires, but do not panic on it
            None => Err(CallModelError::JobNotComplete),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("uuid", &self.uuid)
            .field("session_uuid", &self.session_uuid)
            .field("ready", &self.ready())
            .field("events", &self.ledger.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn seed(job_uuid: &str) -> EventRecord {
        EventRecord::new()
            .with_header("Event-Name", "BACKGROUND_JOB")
            .with_header("Job-UUID", job_uuid)
    }

    #[test]
    fn uuid_resolved_from_seed() {
        let job = Job::new(seed("J1")).unwrap();
        assert_eq!(job.uuid(), "J1");
        assert!(!job.ready());
    }

    #[test]
    fn seed_without_job_uuid_is_rejected() {
        let err = Job::new(EventRecord::new()).unwrap_err();
        assert!(matches!(
            err,
            CallModelError::HeaderNotFound { ref key } if key == "Job-UUID"
        ));
    }

    #[tokio::test]
    async fn complete_then_get() {
        let job = Job::new(seed("J1")).unwrap();
        assert_eq!(
            job.complete("ok")
                .unwrap(),
            "ok"
        );
        assert!(job.ready());
        assert_eq!(
            job.get(None)
                .await
                .unwrap(),
            "ok"
        );
        assert!(job
            .successful()
            .unwrap());
    }

    #[tokio::test]
    async fn fail_surfaces_job_error() {
        let job = Job::new(seed("J1")).unwrap();
        job.fail("boom")
            .unwrap();

        assert!(job.ready());
        assert!(!job
            .successful()
            .unwrap());
        let err = job
            .get(None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CallModelError::Job(ref e) if e.response == "boom"
        ));
    }

    #[test]
    fn second_resolution_is_an_error() {
        let job = Job::new(seed("J1")).unwrap();
        job.complete("first")
            .unwrap();

        assert!(matches!(
            job.complete("second"),
            Err(CallModelError::JobAlreadyComplete)
        ));
        assert!(matches!(
            job.fail("late failure"),
            Err(CallModelError::JobAlreadyComplete)
        ));
        // first result is untouched
        assert!(job
            .successful()
            .unwrap());
    }

    #[test]
    fn successful_before_completion_is_precondition_error() {
        let job = Job::new(seed("J1")).unwrap();
        assert!(matches!(
            job.successful(),
            Err(CallModelError::JobNotComplete)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn get_times_out_when_never_completed() {
        let job = Job::new(seed("J1")).unwrap();
        let err = job
            .get(Some(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, CallModelError::JobTimeout { .. }));

        // timing out does not resolve the job
        assert!(!job.ready());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_observes_completion_without_result() {
        let job = Arc::new(Job::new(seed("J1")).unwrap());

        let waiter = {
            let job = Arc::clone(&job);
            tokio::spawn(async move {
                job.wait(Some(Duration::from_secs(5)))
                    .await
            })
        };
        tokio::task::yield_now().await;
        job.complete("done")
            .unwrap();

        waiter
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_waiters_all_observe_result() {
        let job = Arc::new(Job::new(seed("J1")).unwrap());

        // one waiter parked before completion, one arriving after
        let early = {
            let job = Arc::clone(&job);
            tokio::spawn(async move {
                job.get(None)
                    .await
            })
        };
        tokio::task::yield_now().await;

        job.complete("x")
            .unwrap();

        let late = {
            let job = Arc::clone(&job);
            tokio::spawn(async move {
                job.get(None)
                    .await
            })
        };

        assert_eq!(
            early
                .await
                .unwrap()
                .unwrap(),
            "x"
        );
        assert_eq!(
            late.await
                .unwrap()
                .unwrap(),
            "x"
        );
    }

    #[tokio::test]
    async fn callback_transforms_response_with_kwargs() {
        let mut kwargs = HashMap::new();
        kwargs.insert("prefix".to_string(), "job:".to_string());

        let options = JobOptions {
            session_uuid: Some("U1".to_string()),
            callback: Some(Box::new(|resp, kw| {
                let prefix = kw
                    .get("prefix")
                    .map(|s| s.as_str())
                    .unwrap_or("");
                let suffix = kw
                    .get("suffix")
                    .map(|s| s.as_str())
                    .unwrap_or("");
                format!("{prefix}{resp}{suffix}")
            })),
            kwargs,
        };
        let job = Job::with_options(seed("J1"), options).unwrap();
        assert_eq!(job.session_uuid(), Some("U1"));

        let mut extra = HashMap::new();
        extra.insert("suffix".to_string(), "!".to_string());
        let stored = job
            .complete_with("+OK", extra)
            .unwrap();
        assert_eq!(stored, "job:+OK!");
        assert_eq!(
            job.result()
                .await
                .unwrap(),
            "job:+OK!"
        );
    }

    #[test]
    fn reentrant_resolution_from_callback_is_rejected() {
        // the callback loops back into the job it resolves
        let handle: Arc<Mutex<Option<Arc<Job>>>> = Arc::new(Mutex::new(None));
        let seen: Arc<Mutex<Option<ModelResult<String>>>> = Arc::new(Mutex::new(None));

        let options = JobOptions {
            session_uuid: None,
            callback: Some(Box::new({
                let handle = Arc::clone(&handle);
                let seen = Arc::clone(&seen);
                move |resp, _| {
                    let job = handle
                        .lock()
                        .clone();
                    if let Some(job) = job {
                        *seen.lock() = Some(job.fail("from inside"));
                    }
                    resp.to_string()
                }
            })),
            kwargs: HashMap::new(),
        };
        let job = Arc::new(Job::with_options(seed("J1"), options).unwrap());
        *handle.lock() = Some(Arc::clone(&job));

        // must not deadlock; the inner resolution attempt loses the claim
        assert_eq!(
            job.complete("outer")
                .unwrap(),
            "outer"
        );
        assert!(matches!(
            seen.lock()
                .take(),
            Some(Err(CallModelError::JobAlreadyComplete))
        ));
        assert!(job
            .successful()
            .unwrap());
    }

    #[test]
    fn update_folds_progress_events_without_completing() {
        let job = Job::new(seed("J1")).unwrap();
        job.update(
            EventRecord::new()
                .with_header("Job-UUID", "J1")
                .with_header("Job-Progress", "50"),
        );

        assert_eq!(
            job.ledger()
                .len(),
            2
        );
        assert_eq!(
            job.ledger()
                .get("Job-Progress"),
            Some("50".into())
        );
        assert!(!job.ready());
    }
}
