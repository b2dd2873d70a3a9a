//! peerauth integration test harness.
//!
//! Exercises the session store and handshake responder across crate
//! boundaries, with real Ed25519 wallets where it matters.
//!
//!   cargo test --test integration
//!
//! Set RUST_LOG=peerauth_services=debug to see store activity.

mod concurrency;
mod handshake;

use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use peerauth_core::crypto::RootKey;
use peerauth_core::wallet::ProtoWallet;
use peerauth_core::{GetPublicKeyOptions, Wallet};
use peerauth_services::PeerSession;
use tokio_util::sync::CancellationToken;

// ── Harness ───────────────────────────────────────────────────────────────────

static TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A production wallet with a deterministic root key.
pub fn wallet(seed: u8) -> Arc<ProtoWallet> {
    Arc::new(ProtoWallet::new(RootKey::from_seed([seed; 32])))
}

/// Hex identity key of a wallet.
pub fn identity_of(wallet: &dyn Wallet) -> anyhow::Result<String> {
    Ok(wallet.get_public_key(&CancellationToken::new(), &GetPublicKeyOptions::identity())?)
}

/// A session under `identity` whose last update is `secs` after `base`.
pub fn session_at(base: Instant, secs: u64, nonce: &str, identity: &str, authenticated: bool) -> PeerSession {
    let mut s = PeerSession::new(Some(nonce.to_string()), Some(identity.to_string()));
    s.is_authenticated = authenticated;
    s.last_update = base + Duration::from_secs(secs);
    s
}
