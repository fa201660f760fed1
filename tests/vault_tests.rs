//! Integration tests for the partitioned vault and its factory.

mod common;

use std::sync::Arc;

use common::{engine_context, fingerprint, memory_context, MockEngine, MockKey};
use hdvault::errors::VaultError;
use hdvault::revocable::{Revoke, Revoker};
use hdvault::vault::{generate_request, Vault, VaultFactory, VaultValue};
use serde_json::{json, Value};

const PASSWORD: &[u8] = b"correct horse battery staple";

// ---------------------------------------------------------------------------
// Create and re-open round-trip
// ---------------------------------------------------------------------------

#[test]
fn create_save_and_reopen() {
    let factory = VaultFactory::new(memory_context());

    let mut vault = factory.create(Some(PASSWORD)).expect("create vault");
    vault.set("label", json!("savings")).unwrap();
    vault.set("accounts", json!([0, 1, 2])).unwrap();
    vault.save().unwrap();

    let reopened = factory
        .open(Some(vault.id()), Some(PASSWORD))
        .expect("open vault");
    assert_eq!(reopened.keys().unwrap(), vec!["accounts", "label"]);
    assert_eq!(
        reopened.get("label").unwrap().unwrap().as_plain(),
        Some(&json!("savings"))
    );
    assert!(reopened.is_loaded());
}

#[test]
fn created_vault_with_password_is_listed() {
    let factory = VaultFactory::new(memory_context());
    let vault = factory.create(Some(PASSWORD)).unwrap();
    assert_eq!(factory.list().unwrap(), vec![vault.id()]);
}

#[test]
fn created_vault_without_password_is_not_persisted() {
    let factory = VaultFactory::new(memory_context());
    let vault = factory.create(None).unwrap();
    assert!(factory.list().unwrap().is_empty());
    assert!(factory.meta(&vault.id()).unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Wrong password
// ---------------------------------------------------------------------------

#[test]
fn wrong_password_fails_authentication() {
    let factory = VaultFactory::new(memory_context());
    let mut vault = factory.create(Some(PASSWORD)).unwrap();
    vault.set("label", json!("x")).unwrap();
    vault.save().unwrap();

    let result = factory.open(Some(vault.id()), Some(b"wrong-password"));
    assert!(matches!(result, Err(VaultError::Authentication)));
}

#[test]
fn failed_load_keeps_previous_entries() {
    let context = memory_context();
    let factory = VaultFactory::new(Arc::clone(&context));
    let saved = factory.create(Some(PASSWORD)).unwrap();

    let mut vault = Vault::open(context, Some(saved.id())).unwrap();
    vault.set_password(b"not the password").unwrap();
    vault.set("draft", json!(1)).unwrap();
    assert!(matches!(vault.load(), Err(VaultError::Authentication)));
    assert_eq!(vault.keys().unwrap(), vec!["draft"]);
    assert!(!vault.is_loaded());
}

#[test]
fn unknown_id_is_not_found() {
    let factory = VaultFactory::new(memory_context());
    let id = uuid::Uuid::new_v4();
    assert!(matches!(
        factory.open(Some(id), Some(PASSWORD)),
        Err(VaultError::NotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// Password requirements and idempotence
// ---------------------------------------------------------------------------

#[test]
fn entry_operations_need_a_password() {
    let factory = VaultFactory::new(memory_context());
    let mut vault = factory.create(None).unwrap();
    assert!(matches!(vault.keys(), Err(VaultError::State(_))));
    assert!(matches!(
        vault.set("label", json!("x")),
        Err(VaultError::State(_))
    ));
    assert!(matches!(vault.save(), Err(VaultError::State(_))));
}

#[test]
fn saving_twice_reloads_identically() {
    let factory = VaultFactory::new(memory_context());
    let mut vault = factory.create(Some(PASSWORD)).unwrap();
    vault.set("a", json!({"nested": [1, 2]})).unwrap();
    vault.save().unwrap();
    vault.save().unwrap();

    let mut reopened = factory.open(Some(vault.id()), Some(PASSWORD)).unwrap();
    reopened.load().unwrap();
    assert_eq!(reopened.keys().unwrap(), vec!["a"]);
    assert_eq!(
        reopened.get("a").unwrap().unwrap().as_plain(),
        Some(&json!({"nested": [1, 2]}))
    );
}

#[test]
fn seal_is_idempotent() {
    let factory = VaultFactory::new(memory_context());
    let mut vault = factory.create(Some(PASSWORD)).unwrap();
    vault.seal();
    vault.seal();
    assert!(vault.is_sealed());
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[test]
fn meta_is_readable_without_password() {
    let factory = VaultFactory::new(memory_context());
    let mut vault = factory.create(None).unwrap();
    vault
        .meta_mut()
        .insert("label".into(), json!("cold storage"));
    vault.set_password(PASSWORD).unwrap();
    vault.save().unwrap();

    let meta = factory.meta(&vault.id()).unwrap().expect("meta");
    assert_eq!(meta.get("label"), Some(&json!("cold storage")));

    let reopened = factory.open(Some(vault.id()), None).unwrap();
    assert_eq!(reopened.meta().get("label"), Some(&json!("cold storage")));
    assert!(!reopened.has_password());
}

#[test]
fn deleted_vault_disappears() {
    let factory = VaultFactory::new(memory_context());
    let vault = factory.create(Some(PASSWORD)).unwrap();
    factory.delete(&vault.id()).unwrap();
    factory.delete(&vault.id()).unwrap();
    assert!(factory.list().unwrap().is_empty());
    assert!(factory.meta(&vault.id()).unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Private entries
// ---------------------------------------------------------------------------

#[test]
fn generated_mnemonic_is_wrapped_and_survives_reload() {
    let engine = MockEngine::new();
    let factory = VaultFactory::new(engine_context(Arc::clone(&engine)));

    let mut vault = factory.create(Some(PASSWORD)).unwrap();
    vault.set("#mnemonic", generate_request()).unwrap();
    assert_eq!(engine.generated(), 1);

    let value = vault.get("#mnemonic").unwrap().expect("entry");
    let handle = value.as_handle().expect("handle");
    assert_eq!(handle.kind(), "hdkey");
    let key = handle.as_any().downcast_ref::<MockKey>().expect("mock key");

    // The plaintext is only reachable through an unwrapped view.
    let revoker = Revoker::new();
    let mnemonic = vault
        .unwrap(&revoker)
        .unwrap()
        .get("#mnemonic")
        .unwrap()
        .expect("entry")
        .get()
        .unwrap();
    let phrase = mnemonic.as_str().expect("string");
    assert_eq!(fingerprint(phrase), key.fingerprint);

    vault.save().unwrap();
    let reopened = factory.open(Some(vault.id()), Some(PASSWORD)).unwrap();
    let reloaded = reopened.get("#mnemonic").unwrap().expect("entry");
    assert_eq!(reloaded.as_handle().unwrap().public(), handle.public());
    assert_eq!(engine.generated(), 1);
}

#[test]
fn literal_mnemonic_is_handed_out_as_a_handle() {
    let phrase = "all all all all all all all all all all all all";
    let factory = VaultFactory::new(engine_context(MockEngine::new()));

    let mut vault = factory.create(Some(b"foobar")).unwrap();
    vault.set("#mnemonic", json!(phrase)).unwrap();
    vault.save().unwrap();

    let reopened = factory.open(Some(vault.id()), Some(b"foobar")).unwrap();
    let value = reopened.get("#mnemonic").unwrap().expect("entry");
    assert!(value.as_plain().is_none());
    assert_eq!(
        value.as_handle().expect("handle").public(),
        json!({ "fingerprint": fingerprint(phrase) })
    );

    let revoker = Revoker::new();
    let unwrapped = reopened
        .unwrap(&revoker)
        .unwrap()
        .get("#mnemonic")
        .unwrap()
        .expect("entry")
        .get()
        .unwrap();
    assert_eq!(unwrapped, json!(phrase));
}

#[test]
fn mnemonic_whitespace_is_normalised() {
    let factory = VaultFactory::new(engine_context(MockEngine::new()));
    let mut vault = factory.create(Some(PASSWORD)).unwrap();
    vault
        .set("#mnemonic", json!("  zoo   zoo\tzoo\nwrong  "))
        .unwrap();

    let revoker = Revoker::new();
    let stored = vault
        .unwrap(&revoker)
        .unwrap()
        .get("#mnemonic")
        .unwrap()
        .unwrap()
        .get()
        .unwrap();
    assert_eq!(stored, json!("zoo zoo zoo wrong"));
}

#[test]
fn private_entries_without_handlers_are_unsupported() {
    let factory = VaultFactory::new(memory_context());
    let mut vault = factory.create(Some(PASSWORD)).unwrap();
    vault.set("#seed", json!("deadbeef")).unwrap();

    let value = vault.get("#seed").unwrap().unwrap();
    assert!(value.is_unsupported());
    assert!(matches!(
        value.unsupported_error(),
        Some(VaultError::Unsupported(_))
    ));

    // Stored as-is and still reachable through unwrap.
    vault.save().unwrap();
    let reopened = factory.open(Some(vault.id()), Some(PASSWORD)).unwrap();
    let revoker = Revoker::new();
    let raw = reopened
        .unwrap(&revoker)
        .unwrap()
        .get("#seed")
        .unwrap()
        .unwrap()
        .get()
        .unwrap();
    assert_eq!(raw, json!("deadbeef"));
}

#[test]
fn entries_never_expose_private_plaintext() {
    let factory = VaultFactory::new(engine_context(MockEngine::new()));
    let mut vault = factory.create(Some(PASSWORD)).unwrap();
    vault.set("#mnemonic", generate_request()).unwrap();
    vault.set("label", json!("hot")).unwrap();

    for (key, value) in vault.entries().unwrap() {
        match key.as_str() {
            "#mnemonic" => assert!(matches!(value, VaultValue::Handle(_))),
            "label" => assert_eq!(value.as_plain(), Some(&json!("hot"))),
            other => panic!("unexpected key {other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Seal and revocation
// ---------------------------------------------------------------------------

#[test]
fn unwrap_is_refused_after_seal() {
    let factory = VaultFactory::new(memory_context());
    let mut vault = factory.create(Some(PASSWORD)).unwrap();
    vault.seal();
    assert!(matches!(
        vault.unwrap(&Revoker::new()),
        Err(VaultError::State(_))
    ));
    // Sealing does not block ordinary access.
    vault.set("label", json!("still writable")).unwrap();
}

#[test]
fn unwrapped_values_die_with_their_entry() {
    let factory = VaultFactory::new(engine_context(MockEngine::new()));
    let mut vault = factory.create(Some(PASSWORD)).unwrap();
    vault.set("#mnemonic", generate_request()).unwrap();

    let revoker = Revoker::new();
    let unwrapped = vault.unwrap(&revoker).unwrap().get("#mnemonic").unwrap().unwrap();
    assert!(unwrapped.get().is_ok());

    // Replacing the entry revokes the old plaintext.
    vault.set("#mnemonic", generate_request()).unwrap();
    assert!(matches!(unwrapped.get(), Err(VaultError::Revoked)));

    let second = vault.unwrap(&revoker).unwrap().get("#mnemonic").unwrap().unwrap();
    assert!(vault.delete("#mnemonic").unwrap());
    assert!(matches!(second.get(), Err(VaultError::Revoked)));
}

#[test]
fn clear_revokes_every_unwrapped_value() {
    let factory = VaultFactory::new(memory_context());
    let mut vault = factory.create(Some(PASSWORD)).unwrap();
    vault.set("#a", json!(1)).unwrap();
    vault.set("#b", json!(2)).unwrap();

    let revoker = Revoker::new();
    let view = vault.unwrap(&revoker).unwrap();
    let a = view.get("#a").unwrap().unwrap();
    let b = view.get("#b").unwrap().unwrap();
    drop(view);

    vault.clear().unwrap();
    assert!(a.is_revoked());
    assert!(b.is_revoked());
    assert!(vault.keys().unwrap().is_empty());
}

#[test]
fn caller_revoker_revokes_unwrapped_values() {
    let factory = VaultFactory::new(memory_context());
    let mut vault = factory.create(Some(PASSWORD)).unwrap();
    vault.set("#a", json!("secret")).unwrap();
    vault.set("public", json!("open")).unwrap();

    let revoker = Revoker::new();
    let view = vault.unwrap(&revoker).unwrap();
    let private = view.get("#a").unwrap().unwrap();
    let public = view.get("public").unwrap().unwrap();
    drop(view);

    revoker.revoke();
    assert!(matches!(private.get(), Err(VaultError::Revoked)));
    assert!(matches!(public.get(), Err(VaultError::Revoked)));
    // The vault itself is untouched.
    assert_eq!(vault.keys().unwrap(), vec!["#a", "public"]);
}

#[test]
fn revoked_vault_refuses_everything() {
    let factory = VaultFactory::new(memory_context());
    let mut vault = factory.create(Some(PASSWORD)).unwrap();
    vault.set("#a", json!("secret")).unwrap();
    let unwrapped = vault
        .unwrap(&Revoker::new())
        .unwrap()
        .get("#a")
        .unwrap()
        .unwrap();

    vault.revoke();
    assert!(matches!(vault.keys(), Err(VaultError::Revoked)));
    assert!(matches!(vault.get("#a"), Err(VaultError::Revoked)));
    assert!(matches!(
        vault.set_password(PASSWORD),
        Err(VaultError::Revoked)
    ));
    assert!(matches!(unwrapped.get(), Err(VaultError::Revoked)));
}

#[test]
fn registry_closes_when_a_vault_opens() {
    let context = memory_context();
    let registry = context.registry().clone();
    registry
        .register_transformer("#custom", |v: Value| Ok(v))
        .unwrap();

    let _vault = Vault::open(Arc::clone(&context), None).unwrap();
    assert!(registry.is_closed());
    assert!(matches!(
        registry.register_transformer("#other", |v: Value| Ok(v)),
        Err(VaultError::State(_))
    ));
}
