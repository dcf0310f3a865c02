//! Reverse proxying to absolute-URL destinations.

use super::dispatcher::RequestInfo;
use super::respond::{Accept, respond_error};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use rustc_hash::FxHashMap;
use std::sync::LazyLock;
use tiny_http::{Request, Response, StatusCode};

static CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .redirect(Policy::none())
        .build()
        .expect("failed to build proxy client")
});

/// Hop-by-hop headers that must not be forwarded either way.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Forward a request to an upstream URL, relaying the response.
///
/// A reset upstream connection terminates only this response; other
/// errors are logged and surfaced as 502.
pub fn forward(
    request: Request,
    info: &RequestInfo,
    target: &str,
    req_id: &str,
    accept: Accept,
) -> Result<()> {
    let url = merge_query(target, info.query.as_deref());
    crate::debug!("proxy"; "{} {} -> {}", info.method, info.path, url);

    let method = reqwest::Method::from_bytes(info.method.as_bytes())
        .context("invalid request method")?;
    let mut upstream = CLIENT.request(method, url.as_str());

    for (name, value) in &info.headers {
        if HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        upstream = upstream.header(name.as_str(), value.as_str());
    }

    let client_ip = info
        .remote_addr
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let host = info.host().to_string();
    upstream = upstream
        .header("connection", "close")
        .header("x-forwarded-host", host.as_str())
        .header("x-forwarded-proto", "http")
        .header("x-forwarded-for", client_ip.as_str())
        .header("x-real-ip", client_ip.as_str())
        .header("x-now-trace", "dev1")
        .header("x-now-deployment-url", host.as_str())
        .header("x-now-id", req_id)
        .header("x-now-log-id", req_id)
        .header("x-zeit-co-forwarded-for", client_ip.as_str());

    if !info.body.is_empty() {
        upstream = upstream.body(info.body.clone());
    }

    let response = match upstream.send() {
        Ok(response) => response,
        Err(e) if is_connection_reset(&e) => {
            crate::debug!("proxy"; "upstream connection reset: {}", info.path);
            return Ok(());
        }
        Err(e) => {
            crate::log!("proxy"; "error forwarding {}: {}", info.path, e);
            return respond_error(
                request,
                502,
                "BAD_GATEWAY",
                "an error occurred while proxying the request",
                req_id,
                accept,
                info.is_head(),
            );
        }
    };

    let status = response.status().as_u16();
    let mut relayed = Vec::new();
    for (name, value) in response.headers() {
        let name = name.as_str();
        if HOP_BY_HOP.contains(&name) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            relayed.push(super::headers::header(name, value));
        }
    }
    relayed.push(super::headers::header("x-now-id", req_id));

    let body = response.bytes().context("failed to read upstream body")?;
    let mut out = Response::from_data(body.to_vec()).with_status_code(StatusCode(status));
    for header in relayed {
        out = out.with_header(header);
    }
    request.respond(out)?;
    Ok(())
}

/// Append the original query string to the target URL.
fn merge_query(target: &str, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => {
            let sep = if target.contains('?') { '&' } else { '?' };
            format!("{target}{sep}{query}")
        }
        _ => target.to_string(),
    }
}

/// Walk the error chain looking for an ECONNRESET.
fn is_connection_reset(error: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::ConnectionReset
        {
            return true;
        }
        source = current.source();
    }
    false
}

/// Extra query parameters from route rewrites, merged for upstream calls.
pub fn merge_uri_args(query: Option<&str>, uri_args: &FxHashMap<String, String>) -> Option<String> {
    if uri_args.is_empty() {
        return query.map(str::to_string);
    }

    let mut parts: Vec<String> = uri_args
        .iter()
        .map(|(k, v)| {
            if v.is_empty() {
                k.clone()
            } else {
                format!("{k}={v}")
            }
        })
        .collect();
    parts.sort();
    if let Some(query) = query
        && !query.is_empty()
    {
        parts.insert(0, query.to_string());
    }
    Some(parts.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_query() {
        assert_eq!(merge_query("http://u/x", None), "http://u/x");
        assert_eq!(merge_query("http://u/x", Some("a=1")), "http://u/x?a=1");
        assert_eq!(
            merge_query("http://u/x?b=2", Some("a=1")),
            "http://u/x?b=2&a=1"
        );
    }

    #[test]
    fn test_merge_uri_args() {
        let mut args = FxHashMap::default();
        assert_eq!(merge_uri_args(Some("a=1"), &args), Some("a=1".to_string()));

        args.insert("id".to_string(), "42".to_string());
        let merged = merge_uri_args(Some("a=1"), &args).unwrap();
        assert!(merged.starts_with("a=1&"));
        assert!(merged.contains("id=42"));

        let only_args = merge_uri_args(None, &args).unwrap();
        assert_eq!(only_args, "id=42");
    }
}
