use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use credentials::{
    codec,
    keychain::{process_key_from_env, Keychain, StaticHelper, CREDENTIALS_KEY_ENV_VAR},
};

#[test_log::test(tokio::test)]
async fn static_keychain_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keychain.json");
    let key = codec::generate_key();

    let helper = StaticHelper::new(&path, key).await.unwrap();
    let keychain = Keychain::new(Box::new(helper), "bridge");

    keychain.put("u1", "secret-1").await.unwrap();
    keychain.put("u2", "secret-2").await.unwrap();

    assert_eq!(keychain.list().await.unwrap(), ["u1", "u2"]);
    assert_eq!(
        keychain.get("u1").await.unwrap(),
        ("u1".to_owned(), "secret-1".to_owned())
    );

    // reopening with the same process key recovers the secrets
    let helper = StaticHelper::new(&path, key).await.unwrap();
    let keychain = Keychain::new(Box::new(helper), "bridge");
    assert_eq!(keychain.get("u2").await.unwrap().1, "secret-2");

    keychain.delete("u1").await.unwrap();
    assert_eq!(keychain.list().await.unwrap(), ["u2"]);

    // deleting an absent user is not an error
    keychain.delete("u1").await.unwrap();
}

#[test_log::test(tokio::test)]
async fn static_keychain_rejects_the_wrong_process_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keychain.json");
    let key = codec::generate_key();

    let helper = StaticHelper::new(&path, key).await.unwrap();
    let keychain = Keychain::new(Box::new(helper), "bridge");
    keychain.put("u1", "secret-1").await.unwrap();

    let wrong = codec::generate_key();
    assert!(StaticHelper::new(&path, wrong).await.is_err());
}

#[test_log::test(tokio::test)]
async fn services_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keychain.json");
    let key = codec::generate_key();

    let helper = StaticHelper::new(&path, key).await.unwrap();
    let keychain = Keychain::new(Box::new(helper), "bridge");
    keychain.put("u1", "secret-1").await.unwrap();

    let helper = StaticHelper::new(&path, key).await.unwrap();
    let other = Keychain::new(Box::new(helper), "other");
    assert!(other.list().await.unwrap().is_empty());
}

#[test]
fn process_key_comes_from_the_environment() {
    std::env::set_var(CREDENTIALS_KEY_ENV_VAR, BASE64.encode(codec::generate_key()));
    assert!(process_key_from_env().is_ok());

    std::env::set_var(CREDENTIALS_KEY_ENV_VAR, BASE64.encode(b"too short"));
    assert!(process_key_from_env().is_err());

    std::env::set_var(CREDENTIALS_KEY_ENV_VAR, "*** not base64 ***");
    assert!(process_key_from_env().is_err());

    std::env::remove_var(CREDENTIALS_KEY_ENV_VAR);
    assert!(process_key_from_env().is_err());
}
