//! Per-request dispatch pipeline.
//!
//! A request flows: id assignment → URL cleanup → registry refresh +
//! blocking-build gate → route walk → proxy / redirect / asset dispatch →
//! directory listing → 404. Request-scoped faults never escape this module.

use super::DevServer;
use super::respond::{self, Accept, negotiate, respond_error, respond_redirect};
use super::{headers, invoke, listing, proxy};
use crate::builders::Asset;
use crate::router::{self, RouteRule};
use crate::utils::mime;
use crate::utils::path::{collapse_slashes, decode_path, split_query};
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use tiny_http::Request;

/// Everything read off the wire before dispatch begins.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: String,
    /// Cleaned request path, leading slash included.
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestInfo {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn host(&self) -> &str {
        self.header("host").unwrap_or("localhost")
    }

    pub fn is_head(&self) -> bool {
        self.method == "HEAD"
    }

    /// `Pragma: no-cache` or `Cache-Control: no-cache` forces a rebuild.
    pub fn no_cache(&self) -> bool {
        self.header("pragma").is_some_and(|v| v.contains("no-cache"))
            || self
                .header("cache-control")
                .is_some_and(|v| v.contains("no-cache"))
    }
}

/// Entry point from the request loop.
pub fn handle(server: &Arc<DevServer>, request: Request) {
    let req_id = headers::request_id(&server.pod_id);
    if let Err(e) = dispatch(server, request, &req_id) {
        crate::log!("serve"; "request error: {:#}", e);
    }
}

fn dispatch(server: &Arc<DevServer>, mut request: Request, req_id: &str) -> Result<()> {
    // Early exit if shutdown requested
    if server.is_stopping() || crate::core::is_shutdown() {
        return respond_error(
            request,
            404,
            "SHUTTING_DOWN",
            "the dev server is shutting down",
            req_id,
            Accept::Plain,
            false,
        );
    }

    let method = request.method().to_string().to_ascii_uppercase();
    let raw_url = request.url().to_string();
    let header_pairs: Vec<(String, String)> = request
        .headers()
        .iter()
        .map(|h| (h.field.as_str().as_str().to_string(), h.value.to_string()))
        .collect();
    let remote_addr = request.remote_addr().copied();

    let mut body = Vec::new();
    let has_body = header_pairs
        .iter()
        .any(|(n, v)| n.eq_ignore_ascii_case("content-length") && v.trim() != "0");
    if has_body {
        request
            .as_reader()
            .read_to_end(&mut body)
            .context("failed to read request body")?;
    }

    let (raw_path, query) = split_query(&raw_url);
    let clean_path = collapse_slashes(raw_path);
    if clean_path != raw_path && method == "GET" {
        // double-slash cleanup redirects GET only; other methods are
        // rewritten in place
        let accept = negotiate(
            header_pairs
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case("accept"))
                .map(|(_, v)| v.as_str()),
        );
        let location = match query {
            Some(query) if !query.is_empty() => format!("{clean_path}?{query}"),
            _ => clean_path,
        };
        return respond_redirect(
            request,
            301,
            &location,
            req_id,
            accept,
            false,
            &FxHashMap::default(),
        );
    }

    let info = RequestInfo {
        method,
        path: clean_path,
        query: query.map(ToString::to_string),
        headers: header_pairs,
        body,
        remote_addr,
    };

    // The registry must be current and initial builds complete before routing
    server.reconcile().context("match reconciliation failed")?;
    server.scheduler.wait_blocking();

    route_and_dispatch(server, request, &info, &server.config.routes, 0, req_id)
}

/// Walk a route list and dispatch the destination. Re-entered at most once
/// for per-build sub-routes (`call_level` 0 → 1).
fn route_and_dispatch(
    server: &Arc<DevServer>,
    request: Request,
    info: &RequestInfo,
    routes: &[RouteRule],
    call_level: u8,
    req_id: &str,
) -> Result<()> {
    let accept = negotiate(info.header("accept"));
    let head = info.is_head();

    let probe = |path: &str| server.probe_asset(path);
    let route = router::resolve(routes, &info.method, &info.path, &probe);

    if router::is_external(&route.dest) {
        let mut proxied = info.clone();
        proxied.query = proxy::merge_uri_args(info.query.as_deref(), &route.uri_args);
        return proxy::forward(request, &proxied, &route.dest, req_id, accept);
    }

    if let Some(status @ (301 | 302 | 303)) = route.status
        && let Some(location) = route
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("location"))
            .map(|(_, value)| value.clone())
    {
        let mut extra = route.headers.clone();
        extra.retain(|name, _| !name.eq_ignore_ascii_case("location"));
        return respond_redirect(request, status, &location, req_id, accept, head, &extra);
    }

    // Asset key: decoded, root-relative; directories resolve to index.html
    let decoded = decode_path(&route.dest);
    let trimmed = decoded.trim_start_matches('/');
    let dir_key = trimmed.trim_end_matches('/').to_string();
    let asset_key = if trimmed.is_empty() || trimmed.ends_with('/') {
        format!("{trimmed}index.html")
    } else {
        trimmed.to_string()
    };

    let mut found = server.find_asset_match(&asset_key);
    if info.no_cache() || found.is_none() {
        let target = found.clone().or_else(|| server.find_servable(&asset_key));
        if let Some(build_match) = target {
            let ctx = server.build_context();
            let request_key = build_match
                .builder
                .has_should_serve()
                .then(|| asset_key.clone());
            server
                .scheduler
                .build(&ctx, &build_match, request_key.as_deref());
            found = server.find_asset_match(&asset_key);
        }
    }

    let Some(build_match) = found else {
        if let Some(page) = listing::render(server, &dir_key) {
            return respond::send(
                request,
                200,
                mime::types::HTML,
                page.into_bytes(),
                req_id,
                &route.headers,
                head,
            );
        }
        return respond_error(
            request,
            404,
            "FILE_NOT_FOUND",
            "the page could not be found",
            req_id,
            accept,
            head,
        );
    };

    if call_level == 0 {
        let sub_routes = build_match.routes_for_asset(&asset_key);
        if !sub_routes.is_empty() {
            return route_and_dispatch(server, request, info, &sub_routes, 1, req_id);
        }
    }

    let Some(asset) = build_match.get_asset(&asset_key) else {
        // torn down between lookup and fetch; treat as missing
        return respond_error(
            request,
            404,
            "FILE_NOT_FOUND",
            "the page could not be found",
            req_id,
            accept,
            head,
        );
    };

    match asset {
        Asset::FileFsRef { fs_path, .. } => {
            if !fs_path.is_file() {
                return respond_error(
                    request,
                    404,
                    "FILE_NOT_FOUND",
                    "the page could not be found",
                    req_id,
                    accept,
                    head,
                );
            }
            respond::respond_file(request, &fs_path, route.status, req_id, &route.headers, head)
        }
        Asset::FileBlob { data, content_type } => respond::respond_blob(
            request,
            data,
            content_type.as_deref(),
            route.status,
            req_id,
            &route.headers,
            head,
        ),
        Asset::Lambda(lambda) => invoke::respond_lambda(
            request,
            &lambda,
            info,
            &route.uri_args,
            &route.headers,
            req_id,
            accept,
        ),
    }
}
