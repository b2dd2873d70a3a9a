//! Identity capability — the wallet contract the handshake consumes.
//!
//! A wallet answers four kinds of question for the local identity:
//! - which public key belongs to a given protocol context
//! - sign this payload for that counterparty / is this signature theirs
//! - issue a handshake nonce / did we issue this nonce
//!
//! Every call takes a [`CancellationToken`] supplied by the caller and fails
//! with [`WalletError::Cancelled`] once it fires.
//!
//! Two implementations share the contract: [`ProtoWallet`] holds a real
//! Ed25519 root key, [`MockWallet`] returns fixed values so that session
//! logic can be exercised without cryptography.

mod mock;
mod proto;

pub use mock::{MockWallet, DERIVED_KEY_MOCK, IDENTITY_KEY_MOCK, MOCK_NONCE, MOCK_SIGNATURE};
pub use proto::ProtoWallet;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How strictly a protocol's keys are scoped to a counterparty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SecurityLevel {
    /// Keys usable by anyone in the protocol.
    Silent = 0,
    /// Keys scoped to the protocol only.
    App = 1,
    /// Keys scoped to both the protocol and the counterparty.
    #[default]
    Counterparty = 2,
}

impl TryFrom<u8> for SecurityLevel {
    type Error = WalletError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::Silent),
            1 => Ok(Self::App),
            2 => Ok(Self::Counterparty),
            _ => Err(WalletError::InvalidInput("security level must be 0, 1 or 2")),
        }
    }
}

/// A named protocol context for key derivation and signing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Protocol {
    pub security_level: SecurityLevel,
    pub name: String,
}

impl Protocol {
    pub fn new(security_level: SecurityLevel, name: impl Into<String>) -> Self {
        Self {
            security_level,
            name: name.into(),
        }
    }

    /// Derivation label: `"{level}-{name}-{key_id}"`.
    pub fn invoice(&self, key_id: &str) -> String {
        format!("{}-{}-{}", self.security_level as u8, self.name, key_id)
    }
}

/// The other party a key or signature is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Counterparty {
    /// The wallet's own identity.
    Me,
    /// Anyone; a publicly derivable scope.
    Anyone,
    /// A specific peer, by hex identity key.
    Other(String),
}

impl Counterparty {
    /// Stable label mixed into derivations and signing digests.
    pub fn label<'a>(&'a self, own_identity: &'a str) -> &'a str {
        match self {
            Self::Me => own_identity,
            Self::Anyone => "anyone",
            Self::Other(key) => key,
        }
    }
}

impl FromStr for Counterparty {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(WalletError::InvalidInput("counterparty is empty")),
            "self" => Ok(Self::Me),
            "anyone" => Ok(Self::Anyone),
            key => Ok(Self::Other(key.to_string())),
        }
    }
}

impl fmt::Display for Counterparty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Me => f.write_str("self"),
            Self::Anyone => f.write_str("anyone"),
            Self::Other(key) => f.write_str(key),
        }
    }
}

/// What `get_public_key` should return.
///
/// `identity_key = true` asks for the root identity key; everything else is
/// ignored in that case. Otherwise `protocol` and a non-blank `key_id` are
/// required to derive a key.
#[derive(Debug, Clone, Default)]
pub struct GetPublicKeyOptions {
    pub identity_key: bool,
    pub protocol: Option<Protocol>,
    pub key_id: Option<String>,
    /// Defaults to [`Counterparty::Me`].
    pub counterparty: Option<Counterparty>,
    /// Privileged keys live in a separate keyring neither wallet exposes.
    pub privileged: bool,
}

impl GetPublicKeyOptions {
    pub fn identity() -> Self {
        Self {
            identity_key: true,
            ..Self::default()
        }
    }

    pub fn derived(protocol: Protocol, key_id: impl Into<String>, counterparty: Counterparty) -> Self {
        Self {
            protocol: Some(protocol),
            key_id: Some(key_id.into()),
            counterparty: Some(counterparty),
            ..Self::default()
        }
    }

    /// The key id, if present and not blank.
    pub(crate) fn usable_key_id(&self) -> Option<&str> {
        self.key_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

/// The identity capability.
///
/// Implementations must be safe to share across request handlers.
pub trait Wallet: Send + Sync {
    /// Return a hex public key: the identity key or a derived one.
    fn get_public_key(
        &self,
        cancel: &CancellationToken,
        options: &GetPublicKeyOptions,
    ) -> Result<String, WalletError>;

    /// Sign `data` for `counterparty` under `protocol` / `key_id`.
    fn create_signature(
        &self,
        cancel: &CancellationToken,
        data: &[u8],
        protocol: &Protocol,
        key_id: &str,
        counterparty: &Counterparty,
    ) -> Result<Vec<u8>, WalletError>;

    /// Check that `counterparty` signed `data` for this wallet.
    fn verify_signature(
        &self,
        cancel: &CancellationToken,
        data: &[u8],
        signature: &[u8],
        protocol: &Protocol,
        key_id: &str,
        counterparty: &Counterparty,
    ) -> Result<bool, WalletError>;

    /// Issue a fresh handshake nonce.
    fn create_nonce(&self, cancel: &CancellationToken) -> Result<String, WalletError>;

    /// Whether `nonce` was issued by this wallet.
    fn verify_nonce(&self, cancel: &CancellationToken, nonce: &str) -> Result<bool, WalletError>;
}

/// Fail fast when the caller has given up.
pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), WalletError> {
    if cancel.is_cancelled() {
        return Err(WalletError::Cancelled);
    }
    Ok(())
}

/// Argument checks shared by signing and verification.
pub(crate) fn check_signing_input(data: &[u8], key_id: &str, counterparty: &Counterparty) -> Result<(), WalletError> {
    if data.is_empty() {
        return Err(WalletError::InvalidInput("data is empty"));
    }
    if key_id.trim().is_empty() {
        return Err(WalletError::InvalidInput("key id is empty"));
    }
    if matches!(counterparty, Counterparty::Other(key) if key.trim().is_empty()) {
        return Err(WalletError::InvalidInput("counterparty is empty"));
    }
    Ok(())
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("operation cancelled by caller")]
    Cancelled,

    #[error("privileged key access is not available")]
    NoPrivilege,

    #[error("this wallet has no key deriver")]
    KeyDeriverUnavailable,

    #[error("protocol and key id are required to derive a key")]
    MissingParameters,

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error(transparent)]
    Key(#[from] crate::crypto::CryptoError),
}
