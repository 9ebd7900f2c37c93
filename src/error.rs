//! Error types for the call-state model.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type ModelResult<T> = Result<T, CallModelError>;

/// Errors surfaced by the call-state model.
///
/// Lookup-style accessors (`get`) never fail — absence is `None`. The strict
/// accessors (`lookup`, positional access, direction predicates) fail fast with
/// the variants below and must not be swallowed by callers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CallModelError {
    /// A strict header lookup found no record with a non-empty value.
    #[error("no record carries a non-empty '{key}' header")]
    HeaderNotFound {
        /// The header name that was requested.
        key: String,
    },

    /// Positional ledger access past the end of the folded records.
    #[error("event index {index} out of range (ledger holds {len})")]
    IndexOutOfRange {
        /// Requested newest-first position.
        index: usize,
        /// Number of records folded so far.
        len: usize,
    },

    /// `Job::get` was called with a timeout that elapsed before completion.
    #[error("job not complete after {timeout:?}")]
    JobTimeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The job completed via the failure path; carries the failure payload.
    #[error(transparent)]
    Job(#[from] JobError),

    /// `Job::successful` was called before the job completed.
    #[error("job has not completed yet")]
    JobNotComplete,

    /// A second `complete`/`fail` call on an already-completed job.
    #[error("job result already assigned")]
    JobAlreadyComplete,

    /// A latency computation required a partner leg but none is linked.
    #[error("no partner leg resolvable for this session")]
    PartnerUnresolved,

    /// A command was issued while no connection handle is bound.
    #[error("no connection bound to this session")]
    NotConnected,

    /// A header resolved to a value the typed accessor could not parse.
    #[error("invalid value {value:?} for header '{key}'")]
    InvalidHeader {
        /// The header name.
        key: String,
        /// The unparseable value.
        value: String,
    },

    /// Transport-level I/O failure reported by a `Connection` implementation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport failure that is not a raw I/O error.
    #[error("transport error: {message}")]
    Transport {
        /// Description supplied by the connection layer.
        message: String,
    },
}

impl CallModelError {
    /// Build a [`CallModelError::HeaderNotFound`].
    pub fn header_not_found(key: impl Into<String>) -> Self {
        Self::HeaderNotFound { key: key.into() }
    }

    /// Build a [`CallModelError::Transport`].
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Payload wrapped around a job's result when it completes via the failure path.
///
/// Captured, not thrown, at the point of resolution; it surfaces to waiting
/// callers as [`CallModelError::Job`] when the result is read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("background job failed: {response}")]
pub struct JobError {
    /// The (possibly transformed) response value the job failed with.
    pub response: String,
}

impl JobError {
    /// Wrap a failure response.
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_error_display_carries_response() {
        let err = JobError::new("-ERR no such channel");
        assert_eq!(
            err.to_string(),
            "background job failed: -ERR no such channel"
        );
    }

    #[test]
    fn job_error_converts_into_model_error() {
        let err: CallModelError = JobError::new("boom").into();
        assert!(matches!(err, CallModelError::Job(ref e) if e.response == "boom"));
    }

    #[test]
    fn header_not_found_display() {
        let err = CallModelError::header_not_found("Unique-ID");
        assert_eq!(
            err.to_string(),
            "no record carries a non-empty 'Unique-ID' header"
        );
    }
}
