//! peerauth-core — identity capability, key material and configuration.
//! The session crates depend on this one.

pub mod config;
pub mod crypto;
pub mod wallet;

pub use config::PeerAuthConfig;
pub use wallet::{Counterparty, GetPublicKeyOptions, Protocol, SecurityLevel, Wallet, WalletError};
