//! Function invocation dispatch.
//!
//! Builds the invoke payload from the request, calls the function through
//! the platform ABI, and relays its result.

use super::dispatcher::RequestInfo;
use super::respond::{Accept, respond_error, send};
use crate::builders::{InvokePayload, Lambda, decode_result_body, invoke};
use super::proxy::merge_uri_args;
use crate::utils::mime;
use anyhow::Result;
use rustc_hash::FxHashMap;
use tiny_http::Request;

/// Invoke a lambda asset and relay its response.
pub fn respond_lambda(
    request: Request,
    lambda: &Lambda,
    info: &RequestInfo,
    uri_args: &FxHashMap<String, String>,
    route_headers: &FxHashMap<String, String>,
    req_id: &str,
    accept: Accept,
) -> Result<()> {
    // Local emulation cannot virtualize sockets
    if info
        .header("upgrade")
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
    {
        return respond_error(
            request,
            426,
            "UPGRADE_NOT_SUPPORTED",
            "websocket upgrade is not supported by the local function emulator",
            req_id,
            accept,
            info.is_head(),
        );
    }

    let path = match merge_uri_args(info.query.as_deref(), uri_args) {
        Some(query) => format!("{}?{}", info.path, query),
        None => info.path.clone(),
    };

    let mut headers = FxHashMap::default();
    for (name, value) in &info.headers {
        headers.insert(name.to_ascii_lowercase(), value.clone());
    }

    let payload = InvokePayload::new(&info.method, info.host(), &path, headers, &info.body);

    let result = match invoke(lambda, &payload) {
        Ok(result) => result,
        Err(e) => {
            crate::log!("error"; "invoking {}: {:#}", info.path, e);
            return respond_error(
                request,
                502,
                "NO_STATUS_CODE_FROM_LAMBDA",
                "an error occurred with your deployment",
                req_id,
                accept,
                info.is_head(),
            );
        }
    };

    let body = match decode_result_body(&result) {
        Ok(body) => body,
        Err(e) => {
            crate::log!("error"; "decoding function response for {}: {:#}", info.path, e);
            return respond_error(
                request,
                502,
                "NO_STATUS_CODE_FROM_LAMBDA",
                "an error occurred with your deployment",
                req_id,
                accept,
                info.is_head(),
            );
        }
    };

    let mut extra = route_headers.clone();
    let mut content_type = mime::types::OCTET_STREAM.to_string();
    for (name, value) in &result.headers {
        if name.eq_ignore_ascii_case("content-type") {
            content_type = value.clone();
        } else {
            extra.insert(name.clone(), value.clone());
        }
    }

    send(
        request,
        result.status_code,
        &content_type,
        body,
        req_id,
        &extra,
        info.is_head(),
    )
}
