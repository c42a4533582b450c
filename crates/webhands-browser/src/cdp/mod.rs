//! Chrome DevTools Protocol client.
//!
//! Connects to a browser's (or the relay's) debugging endpoint over
//! WebSocket, correlates command responses, and exposes per-target page
//! sessions built from raw CDP methods.

mod client;
mod error;
mod session;

pub use client::CdpClient;
pub use error::CdpError;
pub use session::PageSession;
