//! Production wallet backed by an Ed25519 root key.

use tokio_util::sync::CancellationToken;

use super::{
    check_cancelled, check_signing_input, Counterparty, GetPublicKeyOptions, Protocol, Wallet,
    WalletError,
};
use crate::config::IdentityConfig;
use crate::crypto::{self, Hasher, RootKey};

const SIGNATURE_DOMAIN: &[u8] = b"peerauth signature v1";

/// A wallet that can derive keys, sign and issue nonces for one identity.
///
/// Built without a root key it is anonymous: every operation that needs
/// the identity fails with [`WalletError::KeyDeriverUnavailable`].
#[derive(Debug)]
pub struct ProtoWallet {
    root: Option<RootKey>,
    identity: String,
}

impl ProtoWallet {
    pub fn new(root: RootKey) -> Self {
        let identity = root.public_hex();
        Self {
            root: Some(root),
            identity,
        }
    }

    /// A wallet with no identity of its own.
    pub fn anonymous() -> Self {
        Self {
            root: None,
            identity: String::new(),
        }
    }

    /// Build from config, loading or generating the root key file.
    pub fn from_config(config: &IdentityConfig) -> Result<Self, WalletError> {
        if !config.key_deriver {
            tracing::info!("key deriver disabled, running with an anonymous wallet");
            return Ok(Self::anonymous());
        }
        let root = RootKey::load_or_generate(&config.key_path)?;
        Ok(Self::new(root))
    }

    fn root(&self) -> Result<&RootKey, WalletError> {
        self.root.as_ref().ok_or(WalletError::KeyDeriverUnavailable)
    }

    /// Public key bytes of a concrete counterparty.
    fn resolve(&self, counterparty: &Counterparty) -> Result<[u8; 32], WalletError> {
        match counterparty {
            Counterparty::Me => Ok(self.root()?.public),
            Counterparty::Other(key) => Ok(crypto::parse_public_key(key.trim())?),
            Counterparty::Anyone => Err(WalletError::InvalidInput(
                "signatures need a concrete counterparty",
            )),
        }
    }
}

/// Digest an Ed25519 signature commits to.
///
/// Binding both parties means a signature made for one peer does not
/// verify for another, even under the same protocol and key id.
fn signing_digest(invoice: &str, signer: &[u8; 32], recipient: &[u8; 32], data: &[u8]) -> [u8; 32] {
    let mut h = Hasher::new();
    h.field(SIGNATURE_DOMAIN);
    h.field(invoice.as_bytes());
    h.field(signer);
    h.field(recipient);
    h.field(data);
    h.finalize()
}

impl Wallet for ProtoWallet {
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
            return Ok(self.root()?.public_hex());
        }

        let (Some(protocol), Some(key_id)) = (options.protocol.as_ref(), options.usable_key_id())
        else {
            return Err(WalletError::MissingParameters);
        };

        let root = self.root()?;
        let counterparty = options.counterparty.clone().unwrap_or(Counterparty::Me);
        let label = format!(
            "{}\0{}",
            protocol.invoice(key_id),
            counterparty.label(&self.identity)
        );
        Ok(hex::encode(root.derive_public(label.as_bytes())))
    }

    fn create_signature(
        &self,
        cancel: &CancellationToken,
        data: &[u8],
        protocol: &Protocol,
        key_id: &str,
        counterparty: &Counterparty,
    ) -> Result<Vec<u8>, WalletError> {
        check_cancelled(cancel)?;
        check_signing_input(data, key_id, counterparty)?;

        let root = self.root()?;
        let recipient = self.resolve(counterparty)?;
        let digest = signing_digest(&protocol.invoice(key_id), &root.public, &recipient, data);

        check_cancelled(cancel)?;
        Ok(root.sign(&digest).to_vec())
    }

    fn verify_signature(
        &self,
        cancel: &CancellationToken,
        data: &[u8],
        signature: &[u8],
        protocol: &Protocol,
        key_id: &str,
        counterparty: &Counterparty,
    ) -> Result<bool, WalletError> {
        check_cancelled(cancel)?;
        check_signing_input(data, key_id, counterparty)?;
        if signature.is_empty() {
            return Err(WalletError::InvalidInput("signature is empty"));
        }

        let recipient = self.root()?.public;
        let signer = self.resolve(counterparty)?;
        let digest = signing_digest(&protocol.invoice(key_id), &signer, &recipient, data);

        let valid = crypto::verify(&signer, &digest, signature);
        if !valid {
            tracing::debug!(%counterparty, protocol = %protocol.name, "signature rejected");
        }
        Ok(valid)
    }

    fn create_nonce(&self, cancel: &CancellationToken) -> Result<String, WalletError> {
        check_cancelled(cancel)?;
        let root = self.root()?;
        Ok(crypto::create_nonce(&root.nonce_key()))
    }

    fn verify_nonce(&self, cancel: &CancellationToken, nonce: &str) -> Result<bool, WalletError> {
        check_cancelled(cancel)?;
        if nonce.is_empty() {
            return Err(WalletError::InvalidInput("nonce is empty"));
        }
        let root = self.root()?;
        crypto::verify_nonce(&root.nonce_key(), nonce)
            .map_err(|_| WalletError::InvalidInput("nonce is malformed"))
    }
}
