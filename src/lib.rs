//! Client-side call-control model for FreeSWITCH event socket applications
//!
//! This crate models the entities a call-control application tracks on top of
//! an event socket connection: per-leg sessions, multi-leg calls, and
//! background jobs. It owns no socket — the application feeds events in and
//! binds a [`Connection`] capability for command issuance.
//!
//! # Architecture
//!
//! Everything hangs off the [`EventLedger`], an append-only per-entity event
//! history with newest-wins header resolution:
//! - [`Session`] — one call leg: ledger, timestamps, flags, call control
//! - [`Call`] — bridged legs grouped under a call id, primary-leg semantics
//! - [`Job`] — an awaitable background job resolved by its completion event
//! - [`HandlerRegistry`] — explicit event-name → handler routing
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use freeswitch_call_model::{
//!     CommandReply, Connection, EventRecord, ModelResult, Session,
//! };
//!
//! struct NullConnection;
//!
//! #[async_trait::async_trait]
//! impl Connection for NullConnection {
//!     async fn send_command(&self, _text: &str) -> ModelResult<()> {
//!         Ok(())
//!     }
//!     async fn send_api(&self, _text: &str) -> ModelResult<CommandReply> {
//!         Ok(CommandReply::ok())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> ModelResult<()> {
//!     let seed = EventRecord::new()
//!         .with_header("Event-Name", "CHANNEL_CREATE")
//!         .with_header("Unique-ID", "leg-1")
//!         .with_header("Call-Direction", "inbound");
//!     let session = Arc::new(Session::new(seed)?);
//!
//!     let _binding = session.bind_connection(Arc::new(NullConnection));
//!     session.answer().await?;
//!     session.playback("ivr/ivr-welcome.wav").await?;
//!
//!     assert!(session.is_inbound()?);
//!     Ok(())
//! }
//! ```

pub mod call;
pub mod connection;
pub mod constants;
pub mod error;
pub mod event;
pub mod headers;
pub mod job;
pub mod ledger;
pub mod registry;
pub mod session;

pub use call::Call;
pub use connection::{CommandReply, Connection, ReplyStatus};
pub use error::{CallModelError, JobError, ModelResult};
pub use event::{CallDirection, EventRecord, ParseCallDirectionError};
pub use headers::{EventHeader, ParseEventHeaderError};
pub use job::{Job, JobOptions};
pub use ledger::EventLedger;
pub use registry::{EventHandler, HandlerKind, HandlerRegistry};
pub use session::{ConnectionBinding, Session};
