//! Consul-style HTTP KV API.
//!
//! Keys travel without their leading `/` (the store's convention) and get it
//! back on the way out, so callers only ever see absolute paths. Values are
//! base64 in JSON responses; the query index comes from `X-Consul-Index`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::error;

use super::txn_key;
use super::KeyEntry;
use super::KvResponse;
use super::KvTransport;
use super::TxnOp;
use crate::constants::CONSUL_INDEX_HEADER;
use crate::constants::CONSUL_TOKEN_HEADER;
use crate::utils::time::wait_param;
use crate::Error;
use crate::KvConfig;
use crate::KvError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercase
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(
        &self,
        name: &str,
    ) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).trim().to_string()
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    async fn send(
        &self,
        request: HttpRequest,
    ) -> Result<HttpResponse>;
}

/// [`HttpClient`] backed by `reqwest`, sending the ACL token when configured
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    token: Option<String>,
}

impl ReqwestHttpClient {
    pub fn new(config: &KvConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(
        &self,
        request: HttpRequest,
    ) -> Result<HttpResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        }
        .timeout(request.timeout);

        if let Some(token) = &self.token {
            builder = builder.header(CONSUL_TOKEN_HEADER, token);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse { status, headers, body })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulKvPair {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    modify_index: u64,
}

#[derive(Debug, Serialize)]
struct TxnRequestOp {
    #[serde(rename = "KV")]
    kv: TxnKvOp,
}

/// Multi-key reads use `get-tree`: a plain `get` aborts the whole
/// transaction on the first missing key.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TxnKvOp {
    verb: &'static str,
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TxnReadResponse {
    #[serde(default)]
    results: Option<Vec<TxnResult>>,
}

#[derive(Debug, Deserialize)]
struct TxnResult {
    #[serde(rename = "KV", default)]
    kv: Option<ConsulKvPair>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TxnErrorResponse {
    #[serde(default)]
    errors: Vec<TxnOpError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TxnOpError {
    #[serde(default)]
    op_index: usize,
    #[serde(default)]
    what: String,
}

/// [`KvTransport`] speaking the Consul KV and transaction HTTP API
pub struct ConsulTransport {
    client: Arc<dyn HttpClient>,
    address: String,
    request_timeout: Duration,
    txn_max_ops: usize,
}

impl ConsulTransport {
    pub fn new(
        config: &KvConfig,
        client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            client,
            address: config.address.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
            txn_max_ops: config.txn_max_ops.max(1),
        }
    }

    fn kv_url(
        &self,
        path: &str,
        recursive: bool,
        blocking: Option<(u64, Duration)>,
    ) -> String {
        let mut params = Vec::new();
        if recursive {
            params.push("recurse=true".to_string());
        }
        if let Some((index, wait)) = blocking {
            params.push(format!("index={index}"));
            params.push(format!("wait={}", wait_param(wait)));
        }

        let mut url = format!("{}/v1/kv/{}", self.address, txn_key(path));
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    async fn read(
        &self,
        path: &str,
        recursive: bool,
        blocking: Option<(u64, Duration)>,
    ) -> Result<KvResponse> {
        // the store may hold a blocking query up to wait + wait/16
        let timeout = match blocking {
            Some((_, wait)) => wait + wait / 16 + self.request_timeout,
            None => self.request_timeout,
        };
        let response = self
            .client
            .send(HttpRequest {
                method: HttpMethod::Get,
                url: self.kv_url(path, recursive, blocking),
                body: None,
                timeout,
            })
            .await?;

        match response.status {
            200 => Ok(KvResponse {
                index: query_index(path, &response)?,
                entries: decode_entries(path, &response.body)?,
            }),
            404 if blocking.is_some() => Ok(KvResponse {
                index: query_index(path, &response)?,
                entries: Vec::new(),
            }),
            404 => Err(KvError::NotFound { path: path.to_string() }.into()),
            status => Err(http_error(path, status, &response)),
        }
    }

    async fn send_txn_chunk(
        &self,
        ops: &[TxnOp],
        offset: usize,
    ) -> Result<()> {
        let body = ops
            .iter()
            .map(|op| match op {
                TxnOp::Set { path, value } => TxnRequestOp::kv("set", path, Some(BASE64.encode(value))),
                TxnOp::Delete { path } => TxnRequestOp::kv("delete", path, None),
            })
            .collect();

        self.send_txn(body, offset).await.map(|_| ())
    }

    /// Reads one chunk of exact keys from a single store snapshot
    async fn read_txn_chunk(
        &self,
        paths: &[String],
        offset: usize,
    ) -> Result<Vec<KeyEntry>> {
        let body = paths
            .iter()
            .map(|path| TxnRequestOp::kv("get-tree", path, None))
            .collect();
        let response = self.send_txn(body, offset).await?;

        let read: TxnReadResponse = serde_json::from_slice(&response.body).map_err(|e| KvError::ProtocolViolation {
            path: "/v1/txn".to_string(),
            reason: format!("malformed transaction result: {e}"),
        })?;

        read.results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|result| result.kv)
            .map(into_entry)
            // get-tree also matches longer keys sharing the prefix
            .filter(|entry| entry.as_ref().map_or(true, |e| paths.contains(&e.key)))
            .collect()
    }

    async fn send_txn(
        &self,
        body: Vec<TxnRequestOp>,
        offset: usize,
    ) -> Result<HttpResponse> {
        let response = self
            .client
            .send(HttpRequest {
                method: HttpMethod::Put,
                url: format!("{}/v1/txn", self.address),
                body: Some(serde_json::to_vec(&body)?),
                timeout: self.request_timeout,
            })
            .await?;

        match response.status {
            200 => Ok(response),
            409 => {
                let rejected: TxnErrorResponse = serde_json::from_slice(&response.body).unwrap_or_default();
                let mut errors: Vec<String> = rejected
                    .errors
                    .into_iter()
                    .map(|e| format!("op {}: {}", offset + e.op_index, e.what))
                    .collect();
                if errors.is_empty() {
                    errors.push(response.body_text());
                }
                Err(KvError::TransactionRejected { errors }.into())
            }
            status => Err(http_error("/v1/txn", status, &response)),
        }
    }
}

impl TxnRequestOp {
    fn kv(
        verb: &'static str,
        path: &str,
        value: Option<String>,
    ) -> Self {
        TxnRequestOp {
            kv: TxnKvOp {
                verb,
                key: txn_key(path).to_string(),
                value,
            },
        }
    }
}

fn query_index(
    path: &str,
    response: &HttpResponse,
) -> Result<u64> {
    response
        .header(CONSUL_INDEX_HEADER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| {
            KvError::ProtocolViolation {
                path: path.to_string(),
                reason: format!("missing or invalid {CONSUL_INDEX_HEADER} header"),
            }
            .into()
        })
}

fn decode_entries(
    path: &str,
    body: &[u8],
) -> Result<Vec<KeyEntry>> {
    let pairs: Vec<ConsulKvPair> = serde_json::from_slice(body).map_err(|e| KvError::ProtocolViolation {
        path: path.to_string(),
        reason: format!("malformed KV listing: {e}"),
    })?;

    pairs.into_iter().map(into_entry).collect()
}

fn into_entry(pair: ConsulKvPair) -> Result<KeyEntry> {
    let value = match pair.value {
        Some(encoded) => Some(BASE64.decode(encoded.as_bytes()).map_err(|e| KvError::ProtocolViolation {
            path: pair.key.clone(),
            reason: format!("value is not base64: {e}"),
        })?),
        None => None,
    };
    Ok(KeyEntry::new(format!("/{}", pair.key), value, pair.modify_index))
}

fn http_error(
    path: &str,
    status: u16,
    response: &HttpResponse,
) -> Error {
    KvError::Http {
        path: path.to_string(),
        status,
        message: response.body_text(),
    }
    .into()
}

#[async_trait]
impl KvTransport for ConsulTransport {
    async fn get(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<KvResponse> {
        self.read(path, recursive, None).await
    }

    async fn wait_for_changes(
        &self,
        path: &str,
        recursive: bool,
        since_index: u64,
        wait: Duration,
    ) -> Result<KvResponse> {
        self.read(path, recursive, Some((since_index, wait))).await
    }

    async fn put(
        &self,
        path: &str,
        value: Vec<u8>,
    ) -> Result<()> {
        let response = self
            .client
            .send(HttpRequest {
                method: HttpMethod::Put,
                url: self.kv_url(path, false, None),
                body: Some(value),
                timeout: self.request_timeout,
            })
            .await?;

        match response.status {
            200 if response.body_text() != "false" => Ok(()),
            200 => Err(KvError::Http {
                path: path.to_string(),
                status: 200,
                message: "write was not applied".to_string(),
            }
            .into()),
            status => Err(http_error(path, status, &response)),
        }
    }

    async fn delete(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<()> {
        let response = self
            .client
            .send(HttpRequest {
                method: HttpMethod::Delete,
                url: self.kv_url(path, recursive, None),
                body: None,
                timeout: self.request_timeout,
            })
            .await?;

        match response.status {
            200 => Ok(()),
            status => Err(http_error(path, status, &response)),
        }
    }

    async fn transact(
        &self,
        ops: Vec<TxnOp>,
    ) -> Result<()> {
        let chunks: Vec<&[TxnOp]> = ops.chunks(self.txn_max_ops).collect();
        let total = chunks.len();

        for (n, chunk) in chunks.into_iter().enumerate() {
            debug!(chunk = n, ops = chunk.len(), "sending KV transaction");
            if let Err(e) = self.send_txn_chunk(chunk, n * self.txn_max_ops).await {
                if n > 0 {
                    error!(
                        committed_chunks = n,
                        total_chunks = total,
                        "KV transaction batch failed after partial commit: {}",
                        e
                    );
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn get_many(
        &self,
        paths: Vec<String>,
    ) -> Result<Vec<KeyEntry>> {
        let mut entries = Vec::new();
        for (n, chunk) in paths.chunks(self.txn_max_ops).enumerate() {
            debug!(chunk = n, keys = chunk.len(), "reading keys in KV transaction");
            entries.extend(self.read_txn_chunk(chunk, n * self.txn_max_ops).await?);
        }
        Ok(entries)
    }
}
