use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use credentials::{Error, Store, MAIN_KEY_SLOT};

async fn seeded_store(path: &Path) -> (Store, String) {
    let store = Store::new(path).await.unwrap();

    let (record, main_key) = store
        .add("u1", "u1", "U", "R", vec![0x41, 0x42], vec!["u1@x".into()])
        .await
        .unwrap();

    assert!(!record.locked());
    assert!(record.is_connected());

    (store, BASE64.encode(main_key))
}

#[test_log::test(tokio::test)]
async fn add_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");

    let (store, main_key) = seeded_store(&path).await;
    drop(store);

    let store = Store::new(&path).await.unwrap();
    assert_eq!(store.list().await, ["u1"]);

    let record = store.get("u1").await.unwrap();
    assert_eq!(record.name, "u1");
    assert_eq!(record.emails, ["u1@x"]);
    assert!(record.locked());
    assert!(!record.is_connected());

    let record = store.unlock("u1", MAIN_KEY_SLOT, &main_key).await.unwrap();
    assert_eq!(record.secret.mailbox_password, [0x41, 0x42]);
    assert_eq!(record.secret.api_token, "U:R");
    assert_eq!(record.split_api_token().unwrap(), ("U", "R"));
}

#[test_log::test(tokio::test)]
async fn add_twice_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = seeded_store(&dir.path().join("credentials.json")).await;

    let err = store
        .add("u1", "u1", "U", "R", vec![0x41], vec!["u1@x".into()])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::AlreadyExistsError(_)));
}

#[test_log::test(tokio::test)]
async fn unlock_with_wrong_password_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let (store, main_key) = seeded_store(&path).await;
    drop(store);

    let store = Store::new(&path).await.unwrap();

    // not base64
    let err = store.unlock("u1", MAIN_KEY_SLOT, "not base64!").await;
    assert!(matches!(err, Err(Error::UnauthorizedError)));

    // base64, wrong size
    let err = store.unlock("u1", MAIN_KEY_SLOT, "c2hvcnQ=").await;
    assert!(matches!(err, Err(Error::UnauthorizedError)));

    // right shape, wrong key
    let wrong = BASE64.encode([0x07; 32]);
    let err = store.unlock("u1", MAIN_KEY_SLOT, &wrong).await;
    assert!(matches!(err, Err(Error::UnauthorizedError)));

    // unknown slot is indistinguishable from a wrong password
    let err = store.unlock("u1", "phone", &main_key).await;
    assert!(matches!(err, Err(Error::UnauthorizedError)));

    // the right password still works afterwards
    store.unlock("u1", MAIN_KEY_SLOT, &main_key).await.unwrap();
}

#[test_log::test(tokio::test)]
async fn add_key_slot_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let (store, main_key) = seeded_store(&path).await;

    let slot_key = store.add_key_slot("u1", "phone", &main_key).await.unwrap();

    assert_eq!(
        store.list_key_slots("u1").await.unwrap(),
        ["main", "phone"]
    );

    drop(store);
    let store = Store::new(&path).await.unwrap();

    let record = store.unlock("u1", "phone", &slot_key).await.unwrap();
    assert_eq!(record.secret.mailbox_password, [0x41, 0x42]);
    assert_eq!(record.secret.api_token, "U:R");

    // both slots recover the same secret
    drop(store);
    let store = Store::new(&path).await.unwrap();
    let record = store.unlock("u1", MAIN_KEY_SLOT, &main_key).await.unwrap();
    assert_eq!(record.secret.api_token, "U:R");
}

#[test_log::test(tokio::test)]
async fn add_key_slot_requires_the_main_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let (store, main_key) = seeded_store(&path).await;

    let slot_key = store.add_key_slot("u1", "phone", &main_key).await.unwrap();

    // a slot key cannot bootstrap another slot
    let err = store.add_key_slot("u1", "tablet", &slot_key).await;
    assert!(matches!(err, Err(Error::UnauthorizedError)));

    // an existing slot cannot be recreated
    let err = store.add_key_slot("u1", "phone", &main_key).await;
    assert!(matches!(err, Err(Error::SlotAlreadyExistsError(_))));
}

#[test_log::test(tokio::test)]
async fn remove_key_slot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let (store, main_key) = seeded_store(&path).await;

    let slot_key = store.add_key_slot("u1", "phone", &main_key).await.unwrap();
    store.remove_key_slot("u1", "phone").await.unwrap();

    drop(store);
    let store = Store::new(&path).await.unwrap();

    let err = store.unlock("u1", "phone", &slot_key).await;
    assert!(matches!(err, Err(Error::UnauthorizedError)));

    store.unlock("u1", MAIN_KEY_SLOT, &main_key).await.unwrap();
}

#[test_log::test(tokio::test)]
async fn remove_main_key_slot_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (store, main_key) = seeded_store(&dir.path().join("credentials.json")).await;

    let err = store.remove_key_slot("u1", MAIN_KEY_SLOT).await;
    assert!(matches!(err, Err(Error::CantRemoveMainSlotError)));

    let err = store.remove_key_slot("u1", "phone").await;
    assert!(matches!(err, Err(Error::SlotNotFoundError(_))));

    assert_eq!(store.list_key_slots("u1").await.unwrap(), ["main"]);
    store.unlock("u1", MAIN_KEY_SLOT, &main_key).await.unwrap();
}

#[test_log::test(tokio::test)]
async fn key_slots_are_listed_main_first() {
    let dir = tempfile::tempdir().unwrap();
    let (store, main_key) = seeded_store(&dir.path().join("credentials.json")).await;

    store.add_key_slot("u1", "alpha", &main_key).await.unwrap();
    store.add_key_slot("u1", "zebra", &main_key).await.unwrap();
    store.add_key_slot("u1", "kiosk", &main_key).await.unwrap();

    assert_eq!(
        store.list_key_slots("u1").await.unwrap(),
        ["main", "alpha", "kiosk", "zebra"]
    );
}

#[test_log::test(tokio::test)]
async fn logout_keeps_the_sealed_secret() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let (store, main_key) = seeded_store(&path).await;

    let record = store.logout("u1").await.unwrap();
    assert!(!record.is_connected());
    assert!(record.secret.api_token.is_empty());
    assert!(record.secret.mailbox_password.is_empty());

    drop(store);
    let store = Store::new(&path).await.unwrap();

    let record = store.get("u1").await.unwrap();
    assert!(record.locked());

    // the sealed secret survives: unlocking still works, but the
    // record stays disconnected
    let record = store.unlock("u1", MAIN_KEY_SLOT, &main_key).await.unwrap();
    assert!(!record.is_connected());
}

#[test_log::test(tokio::test)]
async fn update_token_and_password() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let (store, main_key) = seeded_store(&path).await;
    drop(store);

    let store = Store::new(&path).await.unwrap();

    // both mutations need an unlocked record
    let err = store.update_token("u1", "U2", "R2").await;
    assert!(matches!(err, Err(Error::LockedError)));
    let err = store.update_password("u1", vec![0x43]).await;
    assert!(matches!(err, Err(Error::LockedError)));

    store.unlock("u1", MAIN_KEY_SLOT, &main_key).await.unwrap();
    store.update_token("u1", "U2", "R2").await.unwrap();
    store.update_password("u1", vec![0x43]).await.unwrap();
    store
        .update_emails("u1", vec!["u1@x".into(), "u1-alias@x".into()])
        .await
        .unwrap();

    drop(store);
    let store = Store::new(&path).await.unwrap();

    let record = store.unlock("u1", MAIN_KEY_SLOT, &main_key).await.unwrap();
    assert_eq!(record.secret.api_token, "U2:R2");
    assert_eq!(record.secret.mailbox_password, [0x43]);
    assert_eq!(record.emails, ["u1@x", "u1-alias@x"]);
}

#[test_log::test(tokio::test)]
async fn delete_removes_the_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let (store, _) = seeded_store(&path).await;

    store.delete("u1").await.unwrap();

    let err = store.get("u1").await;
    assert!(matches!(err, Err(Error::NotFoundError(_))));

    let err = store.delete("u1").await;
    assert!(matches!(err, Err(Error::NotFoundError(_))));

    drop(store);
    let store = Store::new(&path).await.unwrap();
    assert!(store.list().await.is_empty());
}

#[test_log::test(tokio::test)]
async fn missing_file_yields_an_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path().join("missing.json")).await.unwrap();

    assert!(store.list().await.is_empty());
    assert!(matches!(
        store.get("u1").await,
        Err(Error::NotFoundError(_))
    ));
}

#[cfg(unix)]
#[test_log::test(tokio::test)]
async fn file_is_owner_only_and_written_atomically() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let (_store, _) = seeded_store(&path).await;

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    // no leftover temporary file once the rename went through
    assert!(!path.with_extension("tmp").exists());
}
