//! RelayBridge Cryptography
//!
//! Identity key pairs for the relay and end-to-end payload sealing.

mod encrypt;
mod keys;

pub use encrypt::*;
pub use keys::*;
