use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use peerauth_services::{PeerSession, SessionManager, SessionStore};

use crate::*;

const WRITERS: usize = 32;

/// Concurrent adds under one identity all land, none duplicated.
#[test]
fn test_concurrent_adds_same_identity() {
    init_tracing();
    let store = Arc::new(SessionManager::new());
    let base = Instant::now();

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || {
                let s = session_at(base, i as u64, &format!("n-{i}"), "alice", i % 4 == 0);
                store.add_session(s.clone());
                s
            })
        })
        .collect();

    let added: Vec<PeerSession> = handles
        .into_iter()
        .map(|h| h.join().expect("writer panicked"))
        .collect();

    let best = store.get_session("alice").expect("identity should resolve");
    assert!(added.contains(&best));
    // Latest authenticated writer: i = 28.
    assert_eq!(best.session_nonce.as_deref(), Some("n-28"));

    let nonces = store.nonces_for("alice");
    assert_eq!(nonces.len(), WRITERS);
    let unique: HashSet<_> = nonces.iter().collect();
    assert_eq!(unique.len(), WRITERS);
    assert_eq!(store.len(), WRITERS);
}

/// Same nonce written concurrently: last writer wins, one entry remains.
#[test]
fn test_concurrent_adds_same_nonce() {
    let store = Arc::new(SessionManager::new());
    let base = Instant::now();

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || {
                store.add_session(session_at(base, i as u64, "shared", "alice", false));
            })
        })
        .collect();
    for h in handles {
        h.join().expect("writer panicked");
    }

    assert_eq!(store.len(), 1);
    assert_eq!(store.nonces_for("alice"), vec!["shared"]);
    assert!(store.get_session("shared").is_some());
}

/// Readers running alongside writers and removers never see a torn state.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_during_churn() {
    init_tracing();
    let store: Arc<dyn SessionStore> = Arc::new(SessionManager::new());
    let base = Instant::now();

    let mut tasks = Vec::new();
    for i in 0..WRITERS {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let s = session_at(base, i as u64, &format!("n-{i}"), "bob", true);
            store.add_session(s.clone());
            tokio::task::yield_now().await;
            if i % 2 == 1 {
                store.remove_session(&s);
            }
        }));
    }
    for _ in 0..WRITERS {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            if let Some(s) = store.get_session("bob") {
                assert_eq!(s.peer_identity_key.as_deref(), Some("bob"));
                assert!(s.is_authenticated);
                assert!(s.session_nonce.is_some());
            }
        }));
    }
    for t in tasks {
        t.await.expect("task panicked");
    }

    // Only even writers remain; the latest of them is n-30.
    let best = store.get_session("bob").expect("even sessions remain");
    assert_eq!(best.session_nonce.as_deref(), Some("n-30"));
    assert!(store.has_session("bob"));
    assert!(!store.has_session("n-31"));
}
