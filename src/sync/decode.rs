//! Payload decoders for the watched resources.
//!
//! Batch decoders attempt every entry before failing so the error names all
//! offending keys and keeps whatever decoded.

use std::collections::HashMap;

use tracing::debug;
use tracing::warn;

use crate::constants::CHAINS_RUNTIME_CONFIG_RESOURCE;
use crate::constants::DEPLOYMENTS_UPDATE_RESOURCE;
use crate::constants::ENGINES_STATE_RESOURCE;
use crate::decode_chain_id;
use crate::decode_child_key;
use crate::variable_name;
use crate::ChainRuntimeProperties;
use crate::DecodeFailure;
use crate::EngineState;
use crate::EntryDecodeFailure;
use crate::KeyEntry;
use crate::KvError;
use crate::PartialDecode;
use crate::Result;

/// Zero entries or a null value is timestamp 0
pub(crate) fn decode_deployments_update(
    path: &str,
    entries: &[KeyEntry],
) -> Result<u64> {
    match entries {
        [] => Ok(0),
        [entry] => match entry.value_str() {
            None => Ok(0),
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                DecodeFailure {
                    resource: DEPLOYMENTS_UPDATE_RESOURCE,
                    failures: vec![EntryDecodeFailure {
                        key: entry.key.clone(),
                        reason: format!("{raw:?} is not a timestamp: {e}"),
                    }],
                    partial: PartialDecode::Nothing,
                }
                .into()
            }),
        },
        _ => Err(KvError::ProtocolViolation {
            path: path.to_string(),
            reason: format!("scalar key holds {} entries", entries.len()),
        }
        .into()),
    }
}

pub(crate) fn decode_engines_state(
    prefix: &str,
    entries: &[KeyEntry],
) -> Result<Vec<EngineState>> {
    let mut states = Vec::new();
    let mut failures = Vec::new();

    for entry in entries {
        if decode_child_key(prefix, &entry.key).is_none() {
            continue;
        }
        let Some(raw) = &entry.value else {
            continue;
        };
        match serde_json::from_slice::<EngineState>(raw) {
            Ok(state) => states.push(state),
            Err(e) => {
                warn!(key = %entry.key, "Failed to deserialize engine state: {}", e);
                failures.push(EntryDecodeFailure {
                    key: entry.key.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if failures.is_empty() {
        return Ok(states);
    }
    Err(DecodeFailure {
        resource: ENGINES_STATE_RESOURCE,
        failures,
        partial: PartialDecode::EnginesState(states),
    }
    .into())
}

/// Keys without a chain id two segments after `runtime_marker` are skipped
pub(crate) fn decode_chains_runtime_config(
    runtime_marker: &str,
    entries: &[KeyEntry],
) -> Result<HashMap<String, ChainRuntimeProperties>> {
    let mut properties = HashMap::new();
    let mut failures = Vec::new();

    for entry in entries {
        let Some(chain_id) = decode_chain_id(&entry.key, runtime_marker) else {
            debug!(key = %entry.key, "Skip unknown KV during parse chains runtime config");
            continue;
        };

        let decoded = match &entry.value {
            Some(raw) => serde_json::from_slice::<ChainRuntimeProperties>(raw).map_err(|e| e.to_string()),
            None => Err("no value stored".to_string()),
        };
        match decoded {
            Ok(props) => {
                properties.insert(chain_id.to_string(), props);
            }
            Err(reason) => {
                warn!(
                    chain_id,
                    "Failed to deserialize runtime properties update for chain: {}", reason
                );
                failures.push(EntryDecodeFailure {
                    key: entry.key.clone(),
                    reason,
                });
            }
        }
    }

    if failures.is_empty() {
        return Ok(properties);
    }
    Err(DecodeFailure {
        resource: CHAINS_RUNTIME_CONFIG_RESOURCE,
        failures,
        partial: PartialDecode::ChainsRuntimeConfig(properties),
    }
    .into())
}

/// Name is the last key segment; a null value reads as `""`.
///
/// With `prefix`, only its direct children are taken.
pub(crate) fn decode_common_variables(
    prefix: Option<&str>,
    entries: &[KeyEntry],
) -> HashMap<String, String> {
    entries
        .iter()
        .filter(|entry| prefix.map_or(true, |p| decode_child_key(p, &entry.key).is_some()))
        .filter_map(|entry| {
            variable_name(&entry.key).map(|name| (name.to_string(), entry.value_str().unwrap_or_default()))
        })
        .collect()
}
