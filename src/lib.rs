//! Quota Relay - chat-to-completion relay daemon
//!
//! Forwards chat messages that address the bot to a text-completion service,
//! gated by a per-user daily quota that redemption codes can top up, and sends
//! the answer back in size-bounded chunks.

pub mod classifier;
pub mod completion;
pub mod config;
pub mod error;
pub mod message;
pub mod quota;
pub mod redemption;
pub mod relay;
pub mod reply;
pub mod transport;

pub use error::{Error, Result};
