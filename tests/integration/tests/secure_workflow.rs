//! End-to-end secure variable workflows over file-backed stores.
//!
//! Each `env.store(..)` call builds a new store instance over the same
//! credential, session, and store files, standing in for a separate `pm`
//! invocation.

use chrono::Duration;
use promptmgr_integration_tests::{TestEnv, TEST_SALT};
use promptmgr_secrets::kdf;
use promptmgr_secrets::resolve::{api_key_for_provider, VariableResolver};
use promptmgr_secrets::session::SessionStore;
use promptmgr_secrets::{
    AuthState, Cipher, FileSessionStore, ScriptedPrompter, Session, VariableUpdate,
};
use promptmgr_core::SecretString;
use std::collections::HashMap;
use std::sync::Arc;

const PASSWORD: &str = "CorrectHorse1";

#[tokio::test]
async fn test_first_run_then_session_reuse_across_instances() {
    let env = TestEnv::new();

    let (store, prompter) = env.store_with_passwords(&[PASSWORD, PASSWORD]);
    assert!(store
        .add("api_key", "OpenAI key", "sk-abc123", None)
        .await
        .unwrap());
    assert_eq!(prompter.password_prompts(), 2);

    // Credential file holds the hash, never the password.
    let stored = std::fs::read_to_string(env.credential_path()).unwrap();
    assert_ne!(stored.trim(), PASSWORD);
    assert_eq!(
        stored.trim(),
        kdf::hash_password(&SecretString::new(PASSWORD), TEST_SALT).expose_secret()
    );

    // A second "process" within the TTL needs no password.
    let (second, prompter) = env.store_with_passwords(&[]);
    assert_eq!(second.get("api_key").await.unwrap().expose(), "sk-abc123");
    assert_eq!(prompter.password_prompts(), 0);

    let raw = std::fs::read_to_string(env.store_path()).unwrap();
    assert!(!raw.contains("sk-abc123"));
    assert!(!raw.contains("OpenAI key"));
}

#[tokio::test]
async fn test_expired_session_requires_password_again() {
    let env = TestEnv::new();
    let (store, _) = env.store_with_passwords(&[PASSWORD, PASSWORD]);
    store.add("token", "t", "value", None).await.unwrap();

    env.clock.advance(Duration::minutes(59));
    let (store, prompter) = env.store_with_passwords(&[]);
    assert!(store.get("token").await.is_some());
    assert_eq!(prompter.password_prompts(), 0);

    env.clock.advance(Duration::minutes(2));
    let (store, prompter) = env.store_with_passwords(&[]);
    assert!(store.get("token").await.is_none());
    assert_eq!(prompter.password_prompts(), 1);
    assert!(!env.session_path().exists());

    let (store, _) = env.store_with_passwords(&[PASSWORD]);
    assert_eq!(store.get("token").await.unwrap().expose(), "value");
}

#[tokio::test]
async fn test_logout_then_lockout() {
    let env = TestEnv::new();
    let (store, _) = env.store_with_passwords(&[PASSWORD, PASSWORD]);
    store.add("token", "t", "value", None).await.unwrap();
    store.auth().logout().await.unwrap();
    assert!(!env.session_path().exists());

    let (store, prompter) = env.store_with_passwords(&["wrong1", "wrong2", "wrong3", PASSWORD]);
    assert!(store.get("token").await.is_none());
    assert_eq!(prompter.password_prompts(), 3);
    assert_eq!(store.auth().state().await.unwrap(), AuthState::Unauthenticated);

    let failures = store.audit_log();
    assert_eq!(failures.len(), 1);
    assert!(!failures[0].success);
    assert_eq!(failures[0].details.as_deref(), Some("Authentication failed"));
}

#[tokio::test]
async fn test_corrupted_session_file_fails_closed() {
    let env = TestEnv::new();
    let (store, _) = env.store_with_passwords(&[PASSWORD, PASSWORD]);
    store.add("token", "t", "value", None).await.unwrap();

    std::fs::write(env.session_path(), "{\"password_hash\":").unwrap();

    let prompter = Arc::new(ScriptedPrompter::new());
    let auth = env.auth(prompter);
    assert_eq!(auth.state().await.unwrap(), AuthState::Unauthenticated);
    assert!(!env.session_path().exists());
}

#[tokio::test]
async fn test_planted_session_does_not_unlock_store() {
    let env = TestEnv::new();
    let (store, _) = env.store_with_passwords(&[PASSWORD, PASSWORD]);
    store.add("token", "t", "value", None).await.unwrap();

    let chosen = kdf::hash_password(&SecretString::new("known-to-someone"), TEST_SALT);
    let planted = Session::start(chosen, chrono::Utc::now(), Duration::days(365));
    FileSessionStore::new(env.session_path())
        .save(&planted)
        .await
        .unwrap();

    let (store, prompter) = env.store_with_passwords(&[PASSWORD]);
    assert!(store.add("fresh", "f", "secret", None).await.unwrap());
    assert_eq!(prompter.password_prompts(), 1);

    // Encrypted under the real credential, not the planted hash.
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(env.store_path()).unwrap()).unwrap();
    let blob = raw["secure_variables"]["fresh"]["encrypted_value"]
        .as_str()
        .unwrap();
    let real = kdf::hash_password(&SecretString::new(PASSWORD), TEST_SALT);
    let cipher = Cipher::probe();
    assert_eq!(cipher.decrypt(blob, real.expose_secret()).as_deref(), Some("secret"));
}

#[tokio::test]
async fn test_extend_session_survives_original_expiry() {
    let env = TestEnv::new();
    let (store, _) = env.store_with_passwords(&[PASSWORD, PASSWORD]);
    store.add("token", "t", "value", None).await.unwrap();

    assert!(store.auth().extend_session(Some(30)).await.unwrap());
    env.clock.advance(Duration::minutes(80));

    let (store, prompter) = env.store_with_passwords(&[]);
    assert!(store.get("token").await.is_some());
    assert_eq!(prompter.password_prompts(), 0);
    let info = store.auth().session_info().await.unwrap();
    assert_eq!(info.time_remaining_minutes, 10);
}

#[tokio::test]
async fn test_update_and_default_clearing_persist() {
    let env = TestEnv::new();
    let (store, _) = env.store_with_passwords(&[PASSWORD, PASSWORD]);
    store
        .add("model", "Preferred model", "gpt-4", Some("gpt-3.5"))
        .await
        .unwrap();

    let (store, _) = env.store_with_passwords(&[]);
    store
        .update("model", VariableUpdate::new().value("gpt-4o").clear_default())
        .await
        .unwrap();

    let (store, _) = env.store_with_passwords(&[]);
    let listed = store.list(true).await.unwrap();
    assert_eq!(listed[0].value, "gpt-4o");
    assert_eq!(listed[0].description, "Preferred model");
    assert!(!listed[0].has_default);
}

#[tokio::test]
async fn test_export_is_still_encrypted() {
    let env = TestEnv::new();
    let (store, _) = env.store_with_passwords(&[PASSWORD, PASSWORD]);
    store.add("a", "first", "alpha", None).await.unwrap();
    store.add("b", "second", "bravo", Some("b-default")).await.unwrap();

    let dest = env.dir.path().join("backup.json");
    assert!(store.export(&dest).await.unwrap());

    let raw = std::fs::read_to_string(&dest).unwrap();
    for plaintext in ["alpha", "bravo", "first", "second", "b-default"] {
        assert!(!raw.contains(plaintext), "{plaintext} leaked into export");
    }

    let exported: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(exported["export_metadata"]["version"], "1.0");
    assert_eq!(exported["metadata"]["version"], "1.0");

    // The exported blobs open with the same credential.
    let hash = kdf::hash_password(&SecretString::new(PASSWORD), TEST_SALT);
    let blob = exported["secure_variables"]["a"]["encrypted_value"]
        .as_str()
        .unwrap();
    assert_eq!(
        Cipher::probe().decrypt(blob, hash.expose_secret()).as_deref(),
        Some("alpha")
    );
}

#[tokio::test]
async fn test_rotation_survives_new_process() {
    let env = TestEnv::new();
    let (store, _) = env.store_with_passwords(&[PASSWORD, PASSWORD]);
    store.add("a", "first", "alpha", Some("x")).await.unwrap();
    store.add("b", "second", "bravo", None).await.unwrap();

    let (store, _) =
        env.store_with_passwords(&[PASSWORD, "BatteryStaple2", "BatteryStaple2"]);
    let report = store.rotate_password().await.unwrap();
    assert_eq!(report.re_encrypted, 5);
    assert_eq!(report.skipped, 0);

    store.auth().logout().await.unwrap();

    let (store, prompter) = env.store_with_passwords(&[PASSWORD, "BatteryStaple2"]);
    assert_eq!(store.get("a").await.unwrap().expose(), "alpha");
    assert_eq!(prompter.password_prompts(), 2);
    assert_eq!(store.get("b").await.unwrap().expose(), "bravo");
}

#[tokio::test]
async fn test_resolver_chains_secure_and_plain() {
    let env = TestEnv::new();
    let (store, _) = env.store_with_passwords(&[PASSWORD, PASSWORD]);
    store
        .add("openai_api_key", "OpenAI", "sk-live", None)
        .await
        .unwrap();

    let mut plain = HashMap::new();
    plain.insert("topic".to_string(), "testing".to_string());

    let resolver = VariableResolver::new(&store).with_plain(&plain);
    assert_eq!(resolver.resolve("openai_api_key").await.unwrap().expose(), "sk-live");
    assert_eq!(resolver.resolve("topic").await.unwrap().expose(), "testing");
    assert!(resolver.resolve("unknown").await.is_none());

    let key = api_key_for_provider(&store, "openai").await.unwrap();
    assert_eq!(key.expose(), "sk-live");
}

#[cfg(unix)]
#[tokio::test]
async fn test_files_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let env = TestEnv::new();
    let (store, _) = env.store_with_passwords(&[PASSWORD, PASSWORD]);
    store.add("k", "d", "v", None).await.unwrap();

    for path in [env.credential_path(), env.session_path(), env.store_path()] {
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "{}", path.display());
    }
}
