use std::collections::HashSet;
use std::sync::Arc;

use super::*;
use crate::EntityType;
use crate::Error;
use crate::LogOperation;
use crate::MockActionLogger;
use crate::SecretError;
use crate::SecretsConfig;

fn store_with(
    backend: impl SecretBackend,
    logger: MockActionLogger,
) -> SecretStore {
    SecretStore::new(Arc::new(backend), Arc::new(logger), &SecretsConfig::default())
}

fn silent_logger() -> MockActionLogger {
    let mut logger = MockActionLogger::new();
    logger.expect_log_action().never();
    logger
}

#[tokio::test]
async fn test_secret_data_missing_with_fail_flag_is_secret_not_found() {
    let store = store_with(MemSecretBackend::new(), silent_logger());

    let result = store.secret_data("missing", true).await;

    match result {
        Err(Error::Secret(SecretError::SecretNotFound(name))) => assert_eq!(name, "missing"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_secret_data_missing_without_fail_flag_is_empty() {
    let store = store_with(MemSecretBackend::new(), silent_logger());

    assert!(store.secret_data("missing", false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_secret_logs_once_and_is_idempotent() {
    let mut logger = MockActionLogger::new();
    logger
        .expect_log_action()
        .times(1)
        .withf(|record| {
            record.entity_type == EntityType::Secret
                && record.entity_name == "vars"
                && record.operation == LogOperation::Create
        })
        .return_const(());
    let store = store_with(MemSecretBackend::new(), logger);

    assert!(store.create_secret("vars").await.unwrap());
    assert!(!store.create_secret("vars").await.unwrap());
}

#[tokio::test]
async fn test_created_secret_carries_subsystem_label() {
    let mut backend = MockSecretBackend::new();
    backend.expect_read_secret().returning(|_| Ok(None));
    backend
        .expect_create_secret()
        .times(1)
        .withf(|name, label, data| {
            name == "vars"
                && label.key == "app.kubernetes.io/secured-variables"
                && label.value == "secured"
                && data.is_empty()
        })
        .returning(|_, _, _| Ok(()));
    let mut logger = MockActionLogger::new();
    logger.expect_log_action().return_const(());
    let store = store_with(backend, logger);

    assert!(store.create_secret("vars").await.unwrap());
}

#[tokio::test]
async fn test_remove_entries_async_resolves_to_remaining_data() {
    let backend = MemSecretBackend::new();
    let store = store_with(backend.clone(), {
        let mut logger = MockActionLogger::new();
        logger.expect_log_action().return_const(());
        logger
    });
    store.create_secret("vars").await.unwrap();
    store
        .add_entries(
            "vars",
            SecretData::from([("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]),
            true,
        )
        .await
        .unwrap();

    let pending = store
        .remove_entries_async("vars", HashSet::from(["a".to_string()]))
        .unwrap();
    assert_eq!(pending.secret_name(), "vars");

    let remaining = pending.await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining.contains_key("b"));
}

#[tokio::test]
async fn test_remove_entries_async_failure_carries_status() {
    let mut backend = MockSecretBackend::new();
    backend
        .expect_remove_data_async()
        .withf(|name, keys, _| name == "vars" && keys.contains("a"))
        .returning(|_, _, completion| {
            let _ = completion.send(Err(SecretUpdateFailure {
                status: 409,
                message: "conflict".to_string(),
            }));
            Ok(())
        });
    let store = store_with(backend, silent_logger());

    let result = store
        .remove_entries_async("vars", HashSet::from(["a".to_string()]))
        .unwrap()
        .await;

    match result {
        Err(Error::Secret(SecretError::Backend { secret, status, .. })) => {
            assert_eq!(secret, "vars");
            assert_eq!(status, 409);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_dropped_completion_resolves_to_backend_error() {
    let mut backend = MockSecretBackend::new();
    backend.expect_remove_data_async().returning(|_, _, _completion| Ok(()));
    let store = store_with(backend, silent_logger());

    let result = store
        .remove_entries_async("vars", HashSet::new())
        .unwrap()
        .await;

    assert!(matches!(
        result,
        Err(Error::Secret(SecretError::Backend { status: 500, .. }))
    ));
}

#[test]
fn test_resolve_secret_name() {
    let store = store_with(MemSecretBackend::new(), silent_logger());

    assert_eq!(store.resolve_secret_name(""), "secured-variables-v2");
    assert_eq!(store.resolve_secret_name("  "), "secured-variables-v2");
    assert_eq!(store.resolve_secret_name("Default"), "secured-variables-v2");
    assert_eq!(store.resolve_secret_name("team-a"), "team-a");
    assert!(store.is_default_secret("secured-variables-v2"));
    assert!(!store.is_default_secret("team-a"));
}
