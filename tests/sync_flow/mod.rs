use std::collections::HashMap;
use std::time::Duration;

use engine_config_sync::ChainRuntimeProperties;
use engine_config_sync::KvTransport;
use engine_config_sync::WatchState;
use engine_config_sync::WatchUpdate;
use serde_json::json;
use tokio::time::sleep;

use crate::common::catalog;
use crate::common::ROOT;

fn retries(n: u64) -> ChainRuntimeProperties {
    let mut map = serde_json::Map::new();
    map.insert("retries".to_string(), json!(n));
    map.into()
}

#[tokio::test(start_paused = true)]
async fn test_engine_never_sees_stamp_before_chain_config() {
    let c = catalog();
    let engine = c.sync.clone();

    let watcher = tokio::spawn(async move {
        let mut state = WatchState::new();
        loop {
            match engine.watch_deployments_update(&mut state).await.unwrap() {
                WatchUpdate::Changed(0) | WatchUpdate::Unchanged => continue,
                WatchUpdate::Changed(_) => return engine.chain_runtime_config().await.unwrap(),
            }
        }
    });

    sleep(Duration::from_secs(30)).await;
    c.sync
        .update_chain_runtime_config("chain-1", &retries(3))
        .await
        .unwrap();
    c.sync.update_deployments_timestamp().await.unwrap();

    let seen = watcher.await.unwrap();
    assert_eq!(seen, HashMap::from([("chain-1".to_string(), retries(3))]));
}

#[tokio::test(start_paused = true)]
async fn test_engine_reports_appear_and_disappear() {
    let c = catalog();
    let mut state = WatchState::new();
    assert_eq!(
        c.sync.watch_engines_state(&mut state).await.unwrap(),
        WatchUpdate::Changed(vec![])
    );

    let report = json!({"engine": {"host": "10.0.0.7", "engineDeploymentName": "engine-a"}, "deployments": {}});
    c.kv
        .put(&format!("{ROOT}/engines-state/engine-a-0"), report.to_string().into_bytes())
        .await
        .unwrap();

    let states = c.sync.watch_engines_state(&mut state).await.unwrap().changed().unwrap();
    assert_eq!(states[0].engine.engine_deployment_name.as_deref(), Some("engine-a"));
    assert_eq!(c.sync.engines_state_safe().await, states);

    c.kv
        .delete(&format!("{ROOT}/engines-state/engine-a-0"), false)
        .await
        .unwrap();

    assert_eq!(
        c.sync.watch_engines_state(&mut state).await.unwrap(),
        WatchUpdate::Changed(vec![])
    );
    assert_eq!(
        c.sync.watch_engines_state(&mut state).await.unwrap(),
        WatchUpdate::Unchanged
    );
}

#[tokio::test(start_paused = true)]
async fn test_watch_loop_recovers_after_bad_chain_payload() {
    let c = catalog();
    let path = format!("{ROOT}/runtime-configurations/chains/chain-1");
    c.kv.put(&path, b"{not json".to_vec()).await.unwrap();

    let mut state = WatchState::new();
    let mut failures = 0;
    let mut fixed = false;
    let seen = loop {
        match c.sync.watch_chains_runtime_config(&mut state).await {
            Ok(WatchUpdate::Changed(props)) => break props,
            Ok(WatchUpdate::Unchanged) => continue,
            Err(e) => {
                assert!(e.is_retryable());
                failures += 1;
                if !fixed {
                    c.sync
                        .update_chain_runtime_config("chain-1", &retries(5))
                        .await
                        .unwrap();
                    fixed = true;
                }
            }
        }
    };

    assert_eq!(failures, 1);
    assert_eq!(seen["chain-1"], retries(5));
}

#[tokio::test]
async fn test_migration_cleanup_of_legacy_roots() {
    let c = catalog();
    c.kv
        .put(&format!("{ROOT}/common-variables/tenant-1/host"), b"h".to_vec())
        .await
        .unwrap();
    c.kv
        .put(&format!("{ROOT}/chains-runtime-configurations/chain-1"), b"{}".to_vec())
        .await
        .unwrap();

    let legacy = c.sync.tenant_common_variables_legacy("tenant-1").await.unwrap();
    c.sync
        .update_common_variables(&legacy)
        .await
        .unwrap();
    c.sync.delete_legacy_variables_kv().await.unwrap();
    c.sync.delete_legacy_chains_runtime_config_kv().await.unwrap();

    assert!(c.sync.common_variables_exist().await.unwrap());
    assert_eq!(c.sync.all_common_variables().await.unwrap()["host"], "h");
    assert!(!c.sync.chains_runtime_config_exists().await.unwrap());
    assert_eq!(c.kv.len(), 1);
}
