//! Responder side of the nonce handshake.
//!
//! 1. Peer sends `InitialRequest { identity_key, initial_nonce }`.
//! 2. We issue a session nonce, sign `initial_nonce || session_nonce` for
//!    the peer, and record an unauthenticated session under both keys.
//! 3. Peer sends `GeneralMessage`s that echo the session nonce and carry a
//!    signature over their payload. The first one that verifies marks the
//!    session authenticated.
//!
//! The session store is the only state; the responder itself holds none.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use peerauth_core::config::HandshakeConfig;
use peerauth_core::{Counterparty, GetPublicKeyOptions, Protocol, Wallet, WalletError};

use crate::session::{PeerSession, SessionStore};

/// First message from a peer opening a session.
#[derive(Debug, Clone)]
pub struct InitialRequest {
    pub identity_key: String,
    pub initial_nonce: String,
}

/// Our answer to an [`InitialRequest`].
#[derive(Debug, Clone)]
pub struct InitialResponse {
    /// Our identity key.
    pub identity_key: String,
    /// The session nonce we issued. Peers echo it as `your_nonce`.
    pub initial_nonce: String,
    /// The peer's initial nonce, echoed back.
    pub your_nonce: String,
    /// Signature over `your_nonce || initial_nonce`, scoped to the peer.
    pub signature: Vec<u8>,
}

/// A signed message on an established session.
#[derive(Debug, Clone)]
pub struct GeneralMessage {
    pub identity_key: String,
    /// Fresh nonce chosen by the peer for this message.
    pub nonce: String,
    /// Our session nonce.
    pub your_nonce: String,
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Key id both sides use for a signature: `"{their_nonce} {our_nonce}"`.
pub fn key_id(nonce: &str, session_nonce: &str) -> String {
    format!("{nonce} {session_nonce}")
}

/// Bytes signed in an [`InitialResponse`].
pub fn initial_signing_data(peer_nonce: &str, session_nonce: &str) -> Vec<u8> {
    [peer_nonce.as_bytes(), session_nonce.as_bytes()].concat()
}

/// Drives the server side of the handshake against a wallet and a store.
pub struct Responder {
    wallet: Arc<dyn Wallet>,
    sessions: Arc<dyn SessionStore>,
    protocol: Protocol,
}

impl Responder {
    pub fn new(wallet: Arc<dyn Wallet>, sessions: Arc<dyn SessionStore>, protocol: Protocol) -> Self {
        Self {
            wallet,
            sessions,
            protocol,
        }
    }

    pub fn from_config(
        wallet: Arc<dyn Wallet>,
        sessions: Arc<dyn SessionStore>,
        config: &HandshakeConfig,
    ) -> Self {
        Self::new(wallet, sessions, config.protocol())
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Answer an initial request and record the new session.
    pub fn respond(
        &self,
        cancel: &CancellationToken,
        request: &InitialRequest,
    ) -> Result<InitialResponse, HandshakeError> {
        require("identity_key", &request.identity_key)?;
        require("initial_nonce", &request.initial_nonce)?;

        let identity_key = self
            .wallet
            .get_public_key(cancel, &GetPublicKeyOptions::identity())?;
        let session_nonce = self.wallet.create_nonce(cancel)?;

        let signature = self.wallet.create_signature(
            cancel,
            &initial_signing_data(&request.initial_nonce, &session_nonce),
            &self.protocol,
            &key_id(&request.initial_nonce, &session_nonce),
            &Counterparty::Other(request.identity_key.clone()),
        )?;

        let mut session = PeerSession::new(
            Some(session_nonce.clone()),
            Some(request.identity_key.clone()),
        );
        session.peer_nonce = Some(request.initial_nonce.clone());
        self.sessions.add_session(session);

        tracing::debug!(
            peer = %request.identity_key,
            nonce = %session_nonce,
            "answered initial request"
        );

        Ok(InitialResponse {
            identity_key,
            initial_nonce: session_nonce,
            your_nonce: request.initial_nonce.clone(),
            signature,
        })
    }

    /// Verify a general message and mark its session authenticated.
    ///
    /// Returns the updated session.
    pub fn authenticate(
        &self,
        cancel: &CancellationToken,
        message: &GeneralMessage,
    ) -> Result<PeerSession, HandshakeError> {
        require("identity_key", &message.identity_key)?;
        require("nonce", &message.nonce)?;
        require("your_nonce", &message.your_nonce)?;

        // Resolve strictly by nonce; an identity key here is not a session.
        let session = self
            .sessions
            .get_session(&message.your_nonce)
            .filter(|s| s.session_nonce.as_deref() == Some(message.your_nonce.as_str()))
            .ok_or(HandshakeError::UnknownSession)?;

        if session.peer_identity_key.as_deref() != Some(message.identity_key.as_str()) {
            tracing::warn!(
                claimed = %message.identity_key,
                nonce = %message.your_nonce,
                "message identity does not match session"
            );
            return Err(HandshakeError::IdentityMismatch);
        }

        if !self.wallet.verify_nonce(cancel, &message.your_nonce)? {
            return Err(HandshakeError::InvalidNonce);
        }

        let verified = self.wallet.verify_signature(
            cancel,
            &message.payload,
            &message.signature,
            &self.protocol,
            &key_id(&message.nonce, &message.your_nonce),
            &Counterparty::Other(message.identity_key.clone()),
        )?;
        if !verified {
            return Err(HandshakeError::InvalidSignature);
        }

        let mut updated = session;
        let newly = !updated.is_authenticated;
        updated.is_authenticated = true;
        updated.touch();
        if !self.sessions.replace_session(updated.clone()) {
            tracing::warn!(nonce = %message.your_nonce, "session closed during authentication");
            return Err(HandshakeError::UnknownSession);
        }

        if newly {
            tracing::info!(peer = %message.identity_key, "peer authenticated");
        }
        Ok(updated)
    }

    /// The session to use for `identifier` (a session nonce or identity key).
    pub fn resolve(&self, identifier: &str) -> Option<PeerSession> {
        self.sessions.get_session(identifier)
    }

    /// Drop the session `identifier` resolves to. Returns whether one existed.
    pub fn close(&self, identifier: &str) -> bool {
        match self.sessions.get_session(identifier) {
            Some(session) => {
                self.sessions.remove_session(&session);
                true
            }
            None => false,
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), HandshakeError> {
    if value.trim().is_empty() {
        return Err(HandshakeError::MissingField(field));
    }
    Ok(())
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("message is missing {0}")]
    MissingField(&'static str),

    #[error("no session for that nonce")]
    UnknownSession,

    #[error("identity key does not own this session")]
    IdentityMismatch,

    #[error("session nonce was not issued by us")]
    InvalidNonce,

    #[error("signature does not verify")]
    InvalidSignature,
}
