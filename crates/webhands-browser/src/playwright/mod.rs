//! Node.js Playwright bridge.
//!
//! The managed persistent-context strategy launches the browser through
//! Playwright's `launchPersistentContext`, reached over a small JSON-RPC
//! sidecar process. Pages obtained this way also expose Playwright's native
//! wait primitives.

mod api;
mod bridge;
mod error;

pub use api::PersistentContext;
pub use bridge::{PlaywrightBridge, PlaywrightBridgeConfig};
pub use error::BridgeError;
