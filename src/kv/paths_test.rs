use super::*;
use crate::KvKeysConfig;

#[test]
fn test_decode_child_key_accepts_only_direct_children() {
    let prefix = "/a/b";

    assert_eq!(decode_child_key(prefix, "/a/b/c"), Some("c"));
    assert_eq!(decode_child_key(prefix, "/a/b/c/d"), None);
    assert_eq!(decode_child_key(prefix, "/a/b/"), None);
    assert_eq!(decode_child_key(prefix, "/a/b"), None);
}

#[test]
fn test_decode_child_key_rejects_sibling_sharing_the_prefix() {
    assert_eq!(decode_child_key("/a/b", "/a/bc"), None);
    assert_eq!(decode_child_key("/a/b", "/x/b/c"), None);
}

#[test]
fn test_decode_chain_id() {
    let marker = "/runtime-configurations";

    assert_eq!(
        decode_chain_id(
            "/config/local/qip-engine-configurations/runtime-configurations/chains/chain-1",
            marker
        ),
        Some("chain-1")
    );
    // marker given without its leading slash
    assert_eq!(
        decode_chain_id("/root/runtime-configurations/chains/chain-2", "runtime-configurations"),
        Some("chain-2")
    );
}

#[test]
fn test_decode_chain_id_without_marker_is_none() {
    assert_eq!(decode_chain_id("/root/chains/chain-1", "/runtime-configurations"), None);
    // marker must match a whole segment
    assert_eq!(
        decode_chain_id("/root/runtime-configurations-old/chains/chain-1", "/runtime-configurations"),
        None
    );
}

#[test]
fn test_decode_chain_id_with_too_few_trailing_segments_is_none() {
    let marker = "/runtime-configurations";

    assert_eq!(decode_chain_id("/root/runtime-configurations", marker), None);
    assert_eq!(decode_chain_id("/root/runtime-configurations/chains", marker), None);
    assert_eq!(decode_chain_id("/root/runtime-configurations/chains/", marker), None);
}

#[test]
fn test_variable_name_is_last_segment() {
    assert_eq!(variable_name("/root/common-variables-v2/db.url"), Some("db.url"));
    assert_eq!(variable_name("plain"), Some("plain"));
    assert_eq!(variable_name("/root/common-variables-v2/"), None);
}

#[test]
fn test_paths_follow_configured_layout() {
    let paths = KvPaths::new(&KvKeysConfig::default());

    assert_eq!(paths.root(), "/config/local/qip-engine-configurations");
    assert_eq!(
        paths.deployments_update(),
        "/config/local/qip-engine-configurations/deployments-update"
    );
    assert_eq!(
        paths.chain_runtime_config("chain-1"),
        "/config/local/qip-engine-configurations/runtime-configurations/chains/chain-1"
    );
    assert_eq!(
        paths.common_variable("x"),
        "/config/local/qip-engine-configurations/common-variables-v2/x"
    );
    assert_eq!(
        paths.tenant_common_variables("tenant-a"),
        "/config/local/qip-engine-configurations/common-variables/tenant-a"
    );
    assert_eq!(
        paths.legacy_chains_runtime_config(),
        "/config/local/qip-engine-configurations/chains-runtime-configurations"
    );
    assert_eq!(paths.runtime_marker(), "runtime-configurations");
    assert_eq!(
        paths.chains_runtime_config_listing(),
        format!("{}/", paths.chains_runtime_config())
    );
}

#[test]
fn test_chain_key_round_trips_through_decoder() {
    let paths = KvPaths::new(&KvKeysConfig::default());
    let key = paths.chain_runtime_config("chain-42");

    assert_eq!(decode_chain_id(&key, paths.runtime_marker()), Some("chain-42"));
}

#[test]
fn test_txn_key_strips_leading_slash() {
    assert_eq!(txn_key("/config/local/x"), "config/local/x");
    assert_eq!(txn_key("config/local/x"), "config/local/x");
}
