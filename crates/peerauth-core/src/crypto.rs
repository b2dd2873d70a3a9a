//! Cryptographic primitives for peerauth.
//!
//! Provides three things:
//!   1. BLAKE3 hashing — signing digests, key derivation, nonce MACs
//!   2. The Ed25519 root identity key and the keys derived from it
//!   3. Stateless handshake nonces that only the issuer can verify
//!
//! Key material is wiped from memory when dropped.
//! There is no unsafe code in this module.

use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

// ── BLAKE3 ────────────────────────────────────────────────────────────────────

/// Hash a byte slice, returning a 32-byte BLAKE3 digest.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Incremental BLAKE3 hasher for digests built from several fields.
///
/// Each field is length-prefixed so that `("ab", "c")` and `("a", "bc")`
/// never collide.
///
/// # Example
/// ```
/// use peerauth_core::crypto::Hasher;
/// let mut a = Hasher::new();
/// a.field(b"ab");
/// a.field(b"c");
/// let mut b = Hasher::new();
/// b.field(b"a");
/// b.field(b"bc");
/// assert_ne!(a.finalize(), b.finalize());
/// ```
pub struct Hasher(blake3::Hasher);

impl Hasher {
    pub fn new() -> Self {
        Self(blake3::Hasher::new())
    }

    /// Start a hasher in BLAKE3 key-derivation mode.
    pub fn derive_key(context: &str) -> Self {
        Self(blake3::Hasher::new_derive_key(context))
    }

    pub fn field(&mut self, data: &[u8]) {
        self.0.update(&(data.len() as u64).to_le_bytes());
        self.0.update(data);
    }

    pub fn finalize(self) -> [u8; 32] {
        *self.0.finalize().as_bytes()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

// ── Root key ──────────────────────────────────────────────────────────────────

const DERIVED_KEY_CONTEXT: &str = "peerauth 2026-10 derived signing key";
const NONCE_KEY_CONTEXT: &str = "peerauth 2026-10 handshake nonce key";

/// A server's long-term Ed25519 identity key.
///
/// Generated once and stored persistently. The hex public key is the
/// identity peers see. The seed never leaves this struct except through
/// [`RootKey::seed`], which hands it back zeroizing.
pub struct RootKey {
    signing: SigningKey,
    /// Public key — the identity key advertised to peers.
    pub public: [u8; 32],
}

impl RootKey {
    /// Generate a new random root key.
    pub fn generate() -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        rand::thread_rng().fill_bytes(&mut *seed);
        Self::from_seed(*seed)
    }

    /// Reconstruct a root key from stored seed bytes.
    /// The public key is derived deterministically from the seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let seed = Zeroizing::new(seed);
        let signing = SigningKey::from_bytes(&seed);
        let public = signing.verifying_key().to_bytes();
        Self { signing, public }
    }

    /// Serialize the seed for persistent storage.
    pub fn seed(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing.to_bytes())
    }

    /// Hex-encoded public key.
    pub fn public_hex(&self) -> String {
        hex::encode(self.public)
    }

    /// Load the seed from `path`, or generate one and write it there.
    ///
    /// The file holds the hex seed on a single line. A generated file is
    /// created with mode 0600 on unix.
    pub fn load_or_generate(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            let text = Zeroizing::new(
                std::fs::read_to_string(path).map_err(|e| CryptoError::KeyFile(path.into(), e))?,
            );
            let mut seed = Zeroizing::new([0u8; 32]);
            hex::decode_to_slice(text.trim(), &mut *seed)
                .map_err(|_| CryptoError::MalformedKeyFile(path.into()))?;
            return Ok(Self::from_seed(*seed));
        }

        let key = Self::generate();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CryptoError::KeyFile(path.into(), e))?;
        }
        let text = Zeroizing::new(hex::encode(*key.seed()));
        write_secret(path, text.as_bytes()).map_err(|e| CryptoError::KeyFile(path.into(), e))?;
        tracing::info!(path = %path.display(), public_key = %key.public_hex(), "generated new root key");
        Ok(key)
    }

    /// Sign a digest with the root key.
    pub fn sign(&self, digest: &[u8; 32]) -> [u8; 64] {
        self.signing.sign(digest).to_bytes()
    }

    /// Public half of the key derived for `label`.
    ///
    /// The label binds the key to a protocol, key id and counterparty.
    /// Only the holder of the root seed can compute it.
    pub fn derive_public(&self, label: &[u8]) -> [u8; 32] {
        let mut h = Hasher::derive_key(DERIVED_KEY_CONTEXT);
        h.field(&*self.seed());
        h.field(label);
        let child_seed = Zeroizing::new(h.finalize());
        SigningKey::from_bytes(&child_seed).verifying_key().to_bytes()
    }

    /// Key used to authenticate handshake nonces issued by this identity.
    pub fn nonce_key(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(blake3::derive_key(NONCE_KEY_CONTEXT, &*self.seed()))
    }
}

/// Write `bytes` to a new file readable only by its owner.
fn write_secret(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootKey")
            .field("public", &self.public_hex())
            .finish_non_exhaustive()
    }
}

/// Check an Ed25519 signature over `digest` made by `public`.
///
/// Malformed keys or signatures are reported as a failed check, not an error.
pub fn verify(public: &[u8; 32], digest: &[u8; 32], signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(public) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(digest, &sig).is_ok()
}

/// Parse a hex identity key into raw public key bytes.
pub fn parse_public_key(hex_key: &str) -> Result<[u8; 32], CryptoError> {
    let mut public = [0u8; 32];
    hex::decode_to_slice(hex_key, &mut public).map_err(|_| CryptoError::BadPublicKey)?;
    VerifyingKey::from_bytes(&public).map_err(|_| CryptoError::BadPublicKey)?;
    Ok(public)
}

// ── Nonces ────────────────────────────────────────────────────────────────────

const NONCE_RANDOM_LEN: usize = 16;
const NONCE_LEN: usize = NONCE_RANDOM_LEN + 32;

/// Generate 16 cryptographically random bytes.
pub fn generate_nonce() -> [u8; NONCE_RANDOM_LEN] {
    let mut nonce = [0u8; NONCE_RANDOM_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Issue a nonce that `nonce_key`'s owner can later verify without state.
///
///   nonce = hex(random || BLAKE3_keyed(nonce_key, random))
pub fn create_nonce(nonce_key: &[u8; 32]) -> String {
    let random = generate_nonce();
    let mac = blake3::keyed_hash(nonce_key, &random);
    let mut out = [0u8; NONCE_LEN];
    out[..NONCE_RANDOM_LEN].copy_from_slice(&random);
    out[NONCE_RANDOM_LEN..].copy_from_slice(mac.as_bytes());
    hex::encode(out)
}

/// Verify a nonce produced by [`create_nonce`] under the same key.
///
/// The MAC comparison is constant time.
pub fn verify_nonce(nonce_key: &[u8; 32], nonce: &str) -> Result<bool, CryptoError> {
    let mut raw = [0u8; NONCE_LEN];
    hex::decode_to_slice(nonce, &mut raw).map_err(|_| CryptoError::BadNonce)?;
    let mut mac = [0u8; 32];
    mac.copy_from_slice(&raw[NONCE_RANDOM_LEN..]);
    let expected = blake3::keyed_hash(nonce_key, &raw[..NONCE_RANDOM_LEN]);
    Ok(expected == blake3::Hash::from(mac))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to access key file {0}: {1}")]
    KeyFile(std::path::PathBuf, std::io::Error),

    #[error("key file {0} does not hold a 32-byte hex seed")]
    MalformedKeyFile(std::path::PathBuf),

    #[error("not a hex-encoded Ed25519 public key")]
    BadPublicKey,

    #[error("nonce is not 48 hex-encoded bytes")]
    BadNonce,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
