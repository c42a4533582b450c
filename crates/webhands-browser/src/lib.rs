//! # WebHands Browser
//!
//! Browser automation transport for WebHands: obtains a controllable page
//! through one of three strategies and runs typed action lists against it.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   spawn + CDP    ┌──────────────────┐
//! │   Negotiator   │ ───────────────► │  Chrome process  │
//! │                │   Playwright     ├──────────────────┤
//! │  (strategies,  │ ───────────────► │ managed context  │
//! │   fallback)    │   relay CDP      ├──────────────────┤
//! └───────┬────────┘ ───────────────► │ extension tab    │
//!         │ page handle               └──────────────────┘
//!         ▼
//! ┌────────────────┐
//! │  Action engine │  navigate / click / type / wait / extract / ...
//! └────────────────┘
//! ```
//!
//! Persistent profiles are serialized across processes by a lock file; the
//! second concurrent user of a profile fails fast instead of queueing.
//! Teardown releases resources in reverse-acquisition order on every exit
//! path.

pub mod cdp;
pub mod config;
pub mod engine;
pub mod executable;
pub mod extensions;
pub mod launcher;
pub mod lock;
pub mod negotiator;
pub mod page;
pub mod playwright;
pub mod profile;
pub mod runner;

pub use config::{BrowserConfig, RelayEndpoint};
pub use engine::{ActionEngine, ActionFailure};
pub use lock::{ProfileLockGuard, ProfileLockManager};
pub use negotiator::{TransportNegotiator, TransportSession};
pub use page::{BridgePage, CdpPage, NativeWaits, PageError, PageHandle};
pub use profile::ProfileSelection;
pub use runner::{BrowserRunner, RunError};
