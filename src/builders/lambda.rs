//! Invocable function artifacts and their wire ABI.
//!
//! A lambda accepts `{"Action": "Invoke", "body": <JSON of InvokePayload>}`
//! and returns an [`InvokeResult`]. Request bodies travel base64-encoded in
//! both directions.

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The request handed to an invocable function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokePayload {
    pub method: String,
    pub host: String,
    pub path: String,
    pub headers: FxHashMap<String, String>,
    pub encoding: String,
    pub body: String,
}

impl InvokePayload {
    pub fn new(
        method: &str,
        host: &str,
        path: &str,
        headers: FxHashMap<String, String>,
        body: &[u8],
    ) -> Self {
        Self {
            method: method.to_string(),
            host: host.to_string(),
            path: path.to_string(),
            headers,
            encoding: "base64".to_string(),
            body: BASE64.encode(body),
        }
    }
}

/// The response produced by an invocable function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeResult {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(default)]
    pub headers: FxHashMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

/// Decode an invoke result's body per its declared encoding.
pub fn decode_result_body(result: &InvokeResult) -> Result<Vec<u8>> {
    match result.encoding.as_deref() {
        Some("base64") => BASE64
            .decode(&result.body)
            .context("invalid base64 in function response body"),
        _ => Ok(result.body.clone().into_bytes()),
    }
}

/// A function artifact: raw-JSON in, raw-JSON out.
pub struct Lambda {
    pub handler: String,
    #[allow(clippy::type_complexity)]
    pub invoke: Box<dyn Fn(&serde_json::Value) -> Result<serde_json::Value> + Send + Sync>,
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lambda").field("handler", &self.handler).finish()
    }
}

/// Invoke a lambda with the platform ABI and parse its result.
pub fn invoke(lambda: &Lambda, payload: &InvokePayload) -> Result<InvokeResult> {
    let request = serde_json::json!({
        "Action": "Invoke",
        "body": serde_json::to_string(payload).context("failed to encode invoke payload")?,
    });

    let value = (lambda.invoke)(&request)?;
    let result: InvokeResult = serde_json::from_value(value)
        .context("function returned a malformed invoke result")?;
    if result.status_code == 0 {
        bail!("function returned no status code");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_lambda() -> Lambda {
        Lambda {
            handler: "index.handler".to_string(),
            invoke: Box::new(|request| {
                assert_eq!(request["Action"], "Invoke");
                let payload: InvokePayload =
                    serde_json::from_str(request["body"].as_str().unwrap()).unwrap();
                Ok(serde_json::json!({
                    "statusCode": 202,
                    "headers": {"x": "y"},
                    "body": BASE64.encode(format!("echo:{}", payload.path)),
                    "encoding": "base64",
                }))
            }),
        }
    }

    #[test]
    fn test_payload_base64_body() {
        let payload = InvokePayload::new("POST", "localhost", "/fn", FxHashMap::default(), b"hello");
        assert_eq!(payload.encoding, "base64");
        assert_eq!(payload.body, BASE64.encode("hello"));
    }

    #[test]
    fn test_invoke_round_trip() {
        let lambda = echo_lambda();
        let payload = InvokePayload::new("GET", "localhost", "/fn", FxHashMap::default(), b"");

        let result = invoke(&lambda, &payload).unwrap();
        assert_eq!(result.status_code, 202);
        assert_eq!(result.headers.get("x").map(String::as_str), Some("y"));
        assert_eq!(decode_result_body(&result).unwrap(), b"echo:/fn");
    }

    #[test]
    fn test_invoke_rejects_malformed_result() {
        let lambda = Lambda {
            handler: "bad".to_string(),
            invoke: Box::new(|_| Ok(serde_json::json!({"nope": true}))),
        };
        let payload = InvokePayload::new("GET", "localhost", "/", FxHashMap::default(), b"");
        assert!(invoke(&lambda, &payload).is_err());
    }

    #[test]
    fn test_decode_plain_body() {
        let result = InvokeResult {
            status_code: 200,
            headers: FxHashMap::default(),
            body: "plain".to_string(),
            encoding: None,
        };
        assert_eq!(decode_result_body(&result).unwrap(), b"plain");
    }
}
