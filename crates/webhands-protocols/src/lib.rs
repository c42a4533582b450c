//! # WebHands Protocols
//!
//! Shared type definitions for the WebHands browser automation subsystem.
//! Contains the request/action data model, the error taxonomy, transport
//! descriptors, and the Chrome DevTools Protocol wire message shapes used by
//! both the CDP client stack and the relay server.
//!
//! This crate holds types only - no I/O, no browser logic.

pub mod action;
pub mod cdp;
pub mod error;
pub mod request;
pub mod transport;

pub use action::{Action, ActionResult, LoadState, RawAction};
pub use error::{ActionError, LockError, RelayError, RequestError, TransportError};
pub use request::{BrowserRequest, TransportPreference, DEFAULT_ACTION_TIMEOUT_MS, MAX_ACTIONS};
pub use transport::{BrowserSummary, TransportKind};
