use std::collections::HashMap;

use engine_config_sync::default_common_variables;
use engine_config_sync::Error;
use engine_config_sync::ImportEntityStatus;
use engine_config_sync::LogOperation;
use engine_config_sync::SecretBackend;
use engine_config_sync::SecretLabel;
use engine_config_sync::VariableError;
use engine_config_sync::VariableKind;
use engine_config_sync::NAMESPACE_VARIABLE_NAME;

use crate::common::catalog;
use crate::common::names;
use crate::common::vars;
use crate::common::DEFAULT_SECRET;

fn label() -> SecretLabel {
    SecretLabel::new("app.kubernetes.io/secured-variables", "secured")
}

#[tokio::test]
async fn test_namespace_stays_collision_free_across_stores() {
    let c = catalog();
    c.variables
        .restore_default_variables(default_common_variables("prod", HashMap::new()))
        .await
        .unwrap();
    c.logger.clear();

    c.variables
        .add_variables_to_default_secret(vars(&[("db.password", "s3cr3t")]))
        .await
        .unwrap();
    let common = c
        .variables
        .add_common_variables(vars(&[("db.host", "pg-0")]), false)
        .await
        .unwrap();
    assert_eq!(common[0].status, ImportEntityStatus::Created);

    let err = c
        .variables
        .add_common_variable("db.password", "plain")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Variable(VariableError::NameCollision {
            existing: VariableKind::Secured,
            ..
        })
    ));

    let err = c
        .variables
        .add_variables_to_default_secret(vars(&[(NAMESPACE_VARIABLE_NAME, "x")]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Variable(VariableError::NameCollision {
            existing: VariableKind::Common,
            ..
        })
    ));

    let plain = c.variables.common_variables().await.unwrap();
    let secured = c.variables.variables_for_default_secret(true).await.unwrap();
    assert!(plain.keys().all(|name| !secured.contains(name)));
    assert_eq!(plain[NAMESPACE_VARIABLE_NAME], "prod");
    assert_eq!(
        c.logger.operations(),
        vec![
            (LogOperation::Create, "db.password".to_string()),
            (LogOperation::Create, "db.host".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_batch_delete_reports_backend_failures_per_secret() {
    let c = catalog();
    for secret in ["team-a", "team-b"] {
        c.secrets
            .create_secret(secret, &label(), vars(&[("a", "1"), ("b", "2")]))
            .await
            .unwrap();
    }
    c.secrets.fail_removals_of("team-b");

    let errors = c
        .variables
        .delete_variables_for_multiple_secrets(HashMap::from([
            ("team-a".to_string(), names(&["a"])),
            ("team-b".to_string(), names(&["a"])),
        ]))
        .await
        .unwrap();

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].secret_name, "team-b");
    assert!(errors[0].message.contains("503"));
    assert_eq!(c.logger.operations(), vec![(LogOperation::Delete, "a".to_string())]);

    let remaining = c.variables.all_secrets_variables_names().await.unwrap();
    assert_eq!(remaining["team-a"], names(&["b"]));
    assert_eq!(remaining["team-b"], names(&["a", "b"]));
}

#[tokio::test]
async fn test_restore_is_idempotent() {
    let c = catalog();
    let defaults = default_common_variables("prod", vars(&[("region", "eu")]));

    c.variables
        .restore_default_variables(defaults.clone())
        .await
        .unwrap();
    c.variables.restore_default_variables(defaults).await.unwrap();

    assert_eq!(
        c.variables.common_variables().await.unwrap(),
        vars(&[("namespace", "prod"), ("region", "eu")])
    );
    assert!(c
        .variables
        .variables_for_secret(DEFAULT_SECRET, true)
        .await
        .unwrap()
        .is_empty());
}
