//! End-to-end tests for the remote vault over a Unix socket pair.

#![cfg(unix)]

mod common;

use std::io::{Cursor, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use common::{engine_options, fast_options, fingerprint, MockEngine};
use hdvault::config::PrepareOptions;
use hdvault::errors::{ErrorKind, VaultError};
use hdvault::remote::protocol::read_frame;
use hdvault::remote::{serve, Message, RemoteHandle, RemoteVaultFactory, VaultServer};
use hdvault::revocable::Revoke;
use hdvault::vault::{generate_request, VaultValue};
use serde_json::{json, Value};

type Log = Arc<Mutex<Vec<u8>>>;

/// Copies every byte that passes through into a shared log.
struct Tap<T> {
    inner: T,
    log: Log,
}

impl<T: Read> Read for Tap<T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.log.lock().unwrap().extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

impl<T: Write> Write for Tap<T> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.log.lock().unwrap().extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

struct Harness {
    factory: RemoteVaultFactory,
    sent: Log,
    received: Log,
    /// Yields the server's open instance count once the client hangs up.
    server: JoinHandle<usize>,
}

fn spawn(options: PrepareOptions) -> Harness {
    let (client, server) = UnixStream::pair().expect("socket pair");

    let server = thread::spawn(move || {
        let reader = server.try_clone().expect("clone socket");
        let mut vault_server = VaultServer::new(options);
        serve(reader, server, &mut vault_server).expect("serve");
        vault_server.instance_count()
    });

    let sent = Log::default();
    let received = Log::default();
    let reader = Tap {
        inner: client.try_clone().expect("clone socket"),
        log: Arc::clone(&received),
    };
    let writer = Tap {
        inner: client,
        log: Arc::clone(&sent),
    };

    Harness {
        factory: RemoteVaultFactory::connect(reader, writer),
        sent,
        received,
        server,
    }
}

fn frames(log: &Log) -> Vec<Message> {
    let bytes = log.lock().unwrap().clone();
    let mut cursor = Cursor::new(bytes);
    let mut out = Vec::new();
    while let Some(message) = read_frame(&mut cursor).expect("valid frame") {
        out.push(message);
    }
    out
}

fn contains_text(value: &Value, needle: &str) -> bool {
    value.to_string().contains(needle)
}

#[test]
fn only_get_unwrapped_carries_the_mnemonic() {
    let harness = spawn(engine_options(MockEngine::new()));

    let vault = harness.factory.create(Some("pw")).unwrap();
    vault.set("#mnemonic", generate_request()).unwrap();
    vault.set("label", json!("savings")).unwrap();
    vault.save().unwrap();

    let value = vault.get("#mnemonic").unwrap().expect("entry");
    assert!(matches!(value, VaultValue::Handle(_)), "got {value:?}");
    let remote = value
        .as_handle()
        .expect("handle")
        .as_any()
        .downcast_ref::<RemoteHandle>()
        .expect("remote handle");
    assert_eq!(remote.kind, "hdkey");

    let entries = vault.entries().unwrap();
    assert_eq!(entries.len(), 2);

    let mnemonic = vault
        .get_unwrapped("#mnemonic")
        .unwrap()
        .expect("plaintext");
    let phrase = mnemonic.as_str().expect("string").to_string();
    assert_eq!(
        remote.public,
        json!({ "fingerprint": fingerprint(&phrase) })
    );

    vault.release().unwrap();
    drop(harness.factory);
    harness.server.join().unwrap();

    // The client never sent the phrase; the server sent it exactly once.
    let sent = frames(&harness.sent);
    for message in &sent {
        let json = serde_json::to_value(message).unwrap();
        assert!(!contains_text(&json, &phrase), "leaked in {json}");
    }
    let unwrap_call = sent
        .iter()
        .find_map(|message| match message {
            Message::Call { id, method, .. } if method == "getUnwrapped" => Some(*id),
            _ => None,
        })
        .expect("getUnwrapped call");

    let received = frames(&harness.received);
    assert_eq!(received.len(), sent.len());
    for message in &received {
        let json = serde_json::to_value(message).unwrap();
        let leaks = contains_text(&json, &phrase);
        assert_eq!(leaks, message.id() == unwrap_call, "frame {json}");
    }
}

#[test]
fn wrong_password_revokes_only_that_vault() {
    let harness = spawn(fast_options());

    let vault = harness.factory.create(Some("right")).unwrap();
    vault.set("label", json!("x")).unwrap();
    vault.save().unwrap();
    let id = vault.id();

    let err = harness.factory.open(Some(id), Some("wrong")).unwrap_err();
    assert!(matches!(err, VaultError::Authentication));

    // The factory and the first vault keep working.
    assert!(!harness.factory.is_revoked());
    assert_eq!(harness.factory.list().unwrap(), vec![id]);
    assert_eq!(vault.keys().unwrap(), vec!["label"]);

    let reopened = harness.factory.open(Some(id), Some("right")).unwrap();
    assert_eq!(
        reopened.get("label").unwrap().unwrap().as_plain(),
        Some(&json!("x"))
    );
}

#[test]
fn failed_opens_and_dropped_vaults_release_server_instances() {
    let harness = spawn(fast_options());

    let vault = harness.factory.create(Some("right")).unwrap();
    let id = vault.id();
    drop(vault);

    for _ in 0..20 {
        let err = harness.factory.open(Some(id), Some("wrong")).unwrap_err();
        assert!(matches!(err, VaultError::Authentication));
    }
    let reopened = harness.factory.open(Some(id), Some("right")).unwrap();
    reopened.release().unwrap();

    drop(harness.factory);
    assert_eq!(harness.server.join().unwrap(), 0);
}

#[test]
fn thrown_errors_keep_their_kind_and_revoke_the_endpoint() {
    let harness = spawn(fast_options());
    let vault = harness.factory.create(None).unwrap();

    let err = vault.keys().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert!(vault.is_revoked());
    assert!(matches!(vault.keys(), Err(VaultError::Revoked)));
    assert!(!harness.factory.is_revoked());
}

#[test]
fn sealed_remote_vault_refuses_unwrap() {
    let harness = spawn(fast_options());
    let vault = harness.factory.create(Some("pw")).unwrap();
    vault.set("#seed", json!("cafe")).unwrap();
    vault.seal().unwrap();
    assert!(vault.is_sealed().unwrap());

    let err = vault.get_unwrapped("#seed").unwrap_err();
    assert!(matches!(err, VaultError::State(_)));
}

#[test]
fn remote_meta_needs_no_password() {
    let harness = spawn(fast_options());
    let vault = harness.factory.create(None).unwrap();
    let mut meta = vault.meta().unwrap();
    meta.insert("label".into(), json!("cold"));
    vault.set_meta(&meta).unwrap();
    vault.set_password("pw").unwrap();
    vault.save().unwrap();

    let meta = harness.factory.meta(&vault.id()).unwrap().expect("meta");
    assert_eq!(meta.get("label"), Some(&json!("cold")));
    assert!(harness
        .factory
        .meta(&uuid::Uuid::new_v4())
        .unwrap()
        .is_none());
}

#[test]
fn closed_stream_revokes_everything() {
    let (client, server) = UnixStream::pair().unwrap();
    let factory = RemoteVaultFactory::connect(client.try_clone().unwrap(), client);
    drop(server);

    let err = factory.list().unwrap_err();
    assert!(matches!(err, VaultError::Protocol(_) | VaultError::Io(_)));
    assert!(factory.is_revoked());
    assert!(matches!(factory.list(), Err(VaultError::Revoked)));
}
