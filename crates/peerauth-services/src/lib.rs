//! peerauth-services — session store and handshake responder.

pub mod handshake;
pub mod session;

pub use handshake::{GeneralMessage, HandshakeError, InitialRequest, InitialResponse, Responder};
pub use session::{PeerSession, SessionManager, SessionStore};
