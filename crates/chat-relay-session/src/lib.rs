//! Session registry and relay orchestration.
//!
//! Provides:
//! - `SessionRegistry` - Binds session ids to their live outbound channel
//! - `Relay` - End-to-end path from a client submission to delivered events

pub mod registry;
pub mod relay;

#[cfg(test)]
pub(crate) mod testing;

pub use registry::{ConnectionId, RegistryError, SessionRegistry};
pub use relay::{Delivery, Relay, RelayError};
