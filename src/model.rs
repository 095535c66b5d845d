//! Payloads exchanged with execution engines through the KV store.
//!
//! The sync layer only needs these to decode successfully; everything it
//! does not interpret is kept verbatim so that a round trip through the
//! catalog never drops fields written by a newer engine.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// State report published by one engine instance under the engines-state root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub engine: EngineInfo,

    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInfo {
    pub host: String,

    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub engine_deployment_name: Option<String>,
}

/// Runtime properties of one deployed chain, opaque to the sync layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainRuntimeProperties(pub Map<String, Value>);

impl ChainRuntimeProperties {
    pub fn get(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.0.get(key)
    }
}

impl From<Map<String, Value>> for ChainRuntimeProperties {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One element of the libraries-update list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryUpdate {
    pub specification_id: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(flatten)]
    pub details: Map<String, Value>,
}
