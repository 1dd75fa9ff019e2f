//! `HTTP_REQUEST` — calls an arbitrary external HTTP endpoint.
//!
//! Config:
//! ```json
//! { "method": "GET", "url": "...", "headers": {}, "body": null, "timeoutMs": 10000 }
//! ```
//! `method` and `headers`/`body` default to `GET` and empty/null respectively.
//! Transport failures (connect refused, DNS, timeout) are `Retryable`; a
//! non-2xx response is also `Retryable` since most of these come from
//! transient upstream trouble, and the handler runtime's retry/backoff loop
//! (spec §4.5) is the mechanism meant to absorb that.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::traits::{ExecutionContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

pub struct HttpRequestNode {
    client: Client,
}

impl HttpRequestNode {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpRequestNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutableNode for HttpRequestNode {
    async fn execute(&self, config: &Value, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let url = config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::BadConfig("HTTP_REQUEST requires a string 'url'".into()))?;

        let method = config
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_ascii_uppercase();

        let timeout = config
            .get("timeoutMs")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(30));

        let method: reqwest::Method = method
            .parse()
            .map_err(|_| NodeError::BadConfig(format!("unsupported HTTP method '{method}'")))?;

        let mut builder = self.client.request(method, url).timeout(timeout);

        if let Some(headers) = config.get("headers").and_then(Value::as_object) {
            let mut map = HashMap::new();
            for (k, v) in headers {
                if let Some(s) = v.as_str() {
                    map.insert(k.clone(), s.to_string());
                }
            }
            for (k, v) in map {
                builder = builder.header(k, v);
            }
        }

        if let Some(body) = config.get("body") {
            if !body.is_null() {
                builder = builder.json(body);
            }
        }

        ctx.logger.log(
            crate::traits::LogLevel::Debug,
            &format!("HTTP_REQUEST dispatching to {url}"),
            json!({ "nodeId": ctx.node_id }),
        );

        let response = tokio::select! {
            res = builder.send() => res.map_err(|e| NodeError::Retryable(format!("request failed: {e}")))?,
            _ = ctx.cancel.cancelled() => return Err(NodeError::Cancelled { reason: "cancelled".into() }),
        };

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .unwrap_or_else(|_| json!(null));

        if !status.is_success() {
            return Err(NodeError::Retryable(format!(
                "upstream returned HTTP {status}"
            )));
        }

        Ok(NodeOutput::value(json!({
            "status": status.as_u16(),
            "body": body,
        })))
    }
}
