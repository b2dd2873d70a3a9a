//! Deterministic wallet for tests.
//!
//! Applies the same argument rules as [`super::ProtoWallet`] but returns
//! fixed keys, signatures and nonces.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use super::{
    check_cancelled, check_signing_input, Counterparty, GetPublicKeyOptions, Protocol, Wallet,
    WalletError,
};

pub const IDENTITY_KEY_MOCK: &str =
    "02a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";
pub const DERIVED_KEY_MOCK: &str =
    "03ffeeddccbbaa99887766554433221100ffeeddccbbaa99887766554433221100";
pub const MOCK_SIGNATURE: &[u8] = b"mock-signature";
pub const MOCK_NONCE: &str = "bW9jay1ub25jZQ==";

/// Wallet double that never touches real keys.
///
/// Every nonce it issues is [`MOCK_NONCE`], so a store driven through it
/// holds one session at a time. Use [`super::ProtoWallet`] for multi-peer tests.
#[derive(Debug)]
pub struct MockWallet {
    identity_key: String,
    key_deriver: bool,
    issued_nonces: Mutex<HashSet<String>>,
}

impl MockWallet {
    /// A mock with or without a key deriver.
    pub fn new(key_deriver: bool) -> Self {
        Self::with_identity(IDENTITY_KEY_MOCK, key_deriver)
    }

    /// A mock reporting `identity_key` as its identity.
    pub fn with_identity(identity_key: impl Into<String>, key_deriver: bool) -> Self {
        Self {
            identity_key: identity_key.into(),
            key_deriver,
            issued_nonces: Mutex::new(HashSet::new()),
        }
    }
}

impl Wallet for MockWallet {
    fn get_public_key(
        &self,
        cancel: &CancellationToken,
        options: &GetPublicKeyOptions,
    ) -> Result<String, WalletError> {
        check_cancelled(cancel)?;

        if options.privileged {
            return Err(WalletError::NoPrivilege);
        }

        if options.identity_key {
            if !self.key_deriver {
                return Err(WalletError::KeyDeriverUnavailable);
            }
            return Ok(self.identity_key.clone());
        }

        if options.protocol.is_none() || options.usable_key_id().is_none() {
            return Err(WalletError::MissingParameters);
        }

        if !self.key_deriver {
            return Err(WalletError::KeyDeriverUnavailable);
        }

        Ok(DERIVED_KEY_MOCK.to_string())
    }

    fn create_signature(
        &self,
        cancel: &CancellationToken,
        data: &[u8],
        _protocol: &Protocol,
        key_id: &str,
        counterparty: &Counterparty,
    ) -> Result<Vec<u8>, WalletError> {
        check_cancelled(cancel)?;
        check_signing_input(data, key_id, counterparty)?;
        Ok(MOCK_SIGNATURE.to_vec())
    }

    fn verify_signature(
        &self,
        cancel: &CancellationToken,
        _data: &[u8],
        signature: &[u8],
        _protocol: &Protocol,
        _key_id: &str,
        _counterparty: &Counterparty,
    ) -> Result<bool, WalletError> {
        check_cancelled(cancel)?;
        Ok(signature == MOCK_SIGNATURE)
    }

    fn create_nonce(&self, cancel: &CancellationToken) -> Result<String, WalletError> {
        check_cancelled(cancel)?;
        self.issued_nonces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(MOCK_NONCE.to_string());
        Ok(MOCK_NONCE.to_string())
    }

    fn verify_nonce(&self, cancel: &CancellationToken, nonce: &str) -> Result<bool, WalletError> {
        check_cancelled(cancel)?;
        Ok(self
            .issued_nonces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(nonce))
    }
}
