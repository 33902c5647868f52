//! RelayBridge Core Types
//!
//! This crate defines the data structures shared by every RelayBridge crate:
//! peer identities, relay messages and the protocol constants the bridge
//! relies on.

mod error;
mod types;

pub use error::*;
pub use types::*;

/// Size of a peer identity (X25519 public key) in bytes
pub const KEY_LEN: usize = 32;

/// Bytes read from a local socket per readiness event
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Largest payload a single relay message may carry
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;
