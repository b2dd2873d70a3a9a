use std::sync::Arc;

use anyhow::Result;
use peerauth_core::{Counterparty, PeerAuthConfig, Wallet};
use peerauth_services::handshake::{initial_signing_data, key_id};
use peerauth_services::{
    GeneralMessage, HandshakeError, InitialRequest, Responder, SessionManager, SessionStore,
};
use tokio_util::sync::CancellationToken;

use crate::*;

struct Fixture {
    responder: Responder,
    sessions: Arc<SessionManager>,
    server_id: String,
}

fn fixture() -> Result<Fixture> {
    init_tracing();
    let server = wallet(1);
    let server_id = identity_of(&*server)?;
    let sessions = Arc::new(SessionManager::new());
    let config = PeerAuthConfig::default();
    let responder = Responder::from_config(server, sessions.clone(), &config.handshake);
    Ok(Fixture {
        responder,
        sessions,
        server_id,
    })
}

/// Client half of the exchange: open a session and check the server's proof.
fn open_session(fx: &Fixture, client: &dyn Wallet) -> Result<String> {
    let cancel = CancellationToken::new();
    let client_id = identity_of(client)?;
    let client_nonce = client.create_nonce(&cancel)?;

    let resp = fx.responder.respond(
        &cancel,
        &InitialRequest {
            identity_key: client_id,
            initial_nonce: client_nonce.clone(),
        },
    )?;
    assert_eq!(resp.identity_key, fx.server_id);
    assert_eq!(resp.your_nonce, client_nonce);
    assert!(client.verify_nonce(&cancel, &resp.your_nonce)?);

    let server_signed = client.verify_signature(
        &cancel,
        &initial_signing_data(&client_nonce, &resp.initial_nonce),
        &resp.signature,
        fx.responder.protocol(),
        &key_id(&client_nonce, &resp.initial_nonce),
        &Counterparty::Other(fx.server_id.clone()),
    )?;
    assert!(server_signed, "client should accept the server's signature");

    Ok(resp.initial_nonce)
}

/// Client signs a general message on an open session.
fn signed_message(fx: &Fixture, client: &dyn Wallet, session_nonce: &str, payload: &[u8]) -> Result<GeneralMessage> {
    let cancel = CancellationToken::new();
    let nonce = client.create_nonce(&cancel)?;
    let signature = client.create_signature(
        &cancel,
        payload,
        fx.responder.protocol(),
        &key_id(&nonce, session_nonce),
        &Counterparty::Other(fx.server_id.clone()),
    )?;
    Ok(GeneralMessage {
        identity_key: identity_of(client)?,
        nonce,
        your_nonce: session_nonce.to_string(),
        payload: payload.to_vec(),
        signature,
    })
}

#[test]
fn test_full_handshake_authenticates_peer() -> Result<()> {
    let fx = fixture()?;
    let alice = wallet(2);
    let alice_id = identity_of(&*alice)?;

    let session_nonce = open_session(&fx, &*alice)?;
    let pending = fx.sessions.get_session(&alice_id).expect("session recorded");
    assert!(!pending.is_authenticated);

    let msg = signed_message(&fx, &*alice, &session_nonce, b"GET /balance")?;
    let session = fx.responder.authenticate(&CancellationToken::new(), &msg)?;

    assert!(session.is_authenticated);
    assert_eq!(fx.responder.resolve(&alice_id), Some(session.clone()));
    assert_eq!(fx.sessions.get_session(&session_nonce), Some(session));
    Ok(())
}

#[test]
fn test_second_connection_does_not_displace_authenticated_session() -> Result<()> {
    let fx = fixture()?;
    let alice = wallet(2);
    let alice_id = identity_of(&*alice)?;

    let first = open_session(&fx, &*alice)?;
    let msg = signed_message(&fx, &*alice, &first, b"hello")?;
    fx.responder.authenticate(&CancellationToken::new(), &msg)?;

    let second = open_session(&fx, &*alice)?;
    assert_ne!(first, second);
    assert_eq!(fx.sessions.nonces_for(&alice_id), vec![first.clone(), second.clone()]);

    // The newer connection is unauthenticated, so the first still wins.
    let best = fx.responder.resolve(&alice_id).expect("alice has sessions");
    assert_eq!(best.session_nonce.as_deref(), Some(first.as_str()));

    // Once the second proves itself it is both authenticated and newer.
    let msg = signed_message(&fx, &*alice, &second, b"hello again")?;
    fx.responder.authenticate(&CancellationToken::new(), &msg)?;
    let best = fx.responder.resolve(&alice_id).expect("alice has sessions");
    assert_eq!(best.session_nonce.as_deref(), Some(second.as_str()));
    Ok(())
}

#[test]
fn test_impersonation_is_rejected() -> Result<()> {
    let fx = fixture()?;
    let alice = wallet(2);
    let mallory = wallet(3);

    let session_nonce = open_session(&fx, &*alice)?;

    // Mallory signs with her own key but claims Alice's identity.
    let mut msg = signed_message(&fx, &*mallory, &session_nonce, b"transfer")?;
    msg.identity_key = identity_of(&*alice)?;
    let err = fx
        .responder
        .authenticate(&CancellationToken::new(), &msg)
        .unwrap_err();
    assert!(matches!(err, HandshakeError::InvalidSignature), "got {err:?}");

    // Under her own identity she does not own the session.
    let msg = signed_message(&fx, &*mallory, &session_nonce, b"transfer")?;
    let err = fx
        .responder
        .authenticate(&CancellationToken::new(), &msg)
        .unwrap_err();
    assert!(matches!(err, HandshakeError::IdentityMismatch), "got {err:?}");

    assert!(!fx.sessions.get_session(&session_nonce).unwrap().is_authenticated);
    Ok(())
}

#[test]
fn test_tampered_payload_is_rejected() -> Result<()> {
    let fx = fixture()?;
    let alice = wallet(2);

    let session_nonce = open_session(&fx, &*alice)?;
    let mut msg = signed_message(&fx, &*alice, &session_nonce, b"amount=1")?;
    msg.payload = b"amount=1000".to_vec();

    assert!(matches!(
        fx.responder.authenticate(&CancellationToken::new(), &msg),
        Err(HandshakeError::InvalidSignature)
    ));
    Ok(())
}

#[test]
fn test_closed_session_cannot_authenticate() -> Result<()> {
    let fx = fixture()?;
    let alice = wallet(2);
    let alice_id = identity_of(&*alice)?;

    let session_nonce = open_session(&fx, &*alice)?;
    assert!(fx.responder.close(&session_nonce));
    assert!(!fx.sessions.has_session(&alice_id));

    let msg = signed_message(&fx, &*alice, &session_nonce, b"late")?;
    assert!(matches!(
        fx.responder.authenticate(&CancellationToken::new(), &msg),
        Err(HandshakeError::UnknownSession)
    ));
    Ok(())
}
