//! HTTP response rendering.
//!
//! Every response carries the platform headers from [`super::headers`].
//! Error and redirect bodies are negotiated against `Accept`: JSON gets a
//! structured body, HTML gets a templated page, anything else plaintext.

use super::headers::{base_headers, header};
use crate::utils::mime;
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::fs;
use std::path::Path;
use tiny_http::{Request, Response, StatusCode};

/// Negotiated response flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    Json,
    Html,
    Plain,
}

/// Pick a response flavor from an `Accept` header value.
pub fn negotiate(accept: Option<&str>) -> Accept {
    match accept {
        Some(value) if value.contains("application/json") => Accept::Json,
        Some(value) if value.contains("text/html") => Accept::Html,
        _ => Accept::Plain,
    }
}

/// Send a response with platform headers plus per-route extras.
pub fn send(
    request: Request,
    status: u16,
    content_type: &str,
    body: Vec<u8>,
    req_id: &str,
    extra: &FxHashMap<String, String>,
    head: bool,
) -> Result<()> {
    let mut headers = base_headers(req_id);
    headers.push(header("content-type", content_type));
    for (name, value) in extra {
        headers.push(header(name, value));
    }

    if head {
        let mut response = Response::empty(StatusCode(status));
        for h in headers {
            response = response.with_header(h);
        }
        request.respond(response)?;
        return Ok(());
    }

    let mut response = Response::from_data(body).with_status_code(StatusCode(status));
    for h in headers {
        response = response.with_header(h);
    }
    request.respond(response)?;
    Ok(())
}

/// Serve a static file, content type from extension.
pub fn respond_file(
    request: Request,
    fs_path: &Path,
    status: Option<u16>,
    req_id: &str,
    extra: &FxHashMap<String, String>,
    head: bool,
) -> Result<()> {
    let content_type = mime::from_path(fs_path);
    let body = if head {
        Vec::new()
    } else {
        fs::read(fs_path).with_context(|| format!("failed to read {}", fs_path.display()))?
    };
    send(
        request,
        status.unwrap_or(200),
        content_type,
        body,
        req_id,
        extra,
        head,
    )
}

/// Serve an in-memory blob.
pub fn respond_blob(
    request: Request,
    data: Vec<u8>,
    content_type: Option<&str>,
    status: Option<u16>,
    req_id: &str,
    extra: &FxHashMap<String, String>,
    head: bool,
) -> Result<()> {
    send(
        request,
        status.unwrap_or(200),
        content_type.unwrap_or(mime::types::OCTET_STREAM),
        data,
        req_id,
        extra,
        head,
    )
}

/// Content-negotiated redirect.
pub fn respond_redirect(
    request: Request,
    status: u16,
    location: &str,
    req_id: &str,
    accept: Accept,
    head: bool,
    extra: &FxHashMap<String, String>,
) -> Result<()> {
    let mut extra = extra.clone();
    extra.insert("location".to_string(), location.to_string());

    let (content_type, body) = match accept {
        Accept::Json => (
            mime::types::JSON,
            serde_json::json!({ "redirect": location, "status": status }).to_string(),
        ),
        Accept::Html => (
            mime::types::HTML,
            redirect_page(location),
        ),
        Accept::Plain => (
            mime::types::PLAIN,
            format!("Redirecting to {location} ({status})\n"),
        ),
    };
    send(
        request,
        status,
        content_type,
        body.into_bytes(),
        req_id,
        &extra,
        head,
    )
}

/// Content-negotiated error page.
pub fn respond_error(
    request: Request,
    status: u16,
    code: &str,
    message: &str,
    req_id: &str,
    accept: Accept,
    head: bool,
) -> Result<()> {
    let (content_type, body) = match accept {
        Accept::Json => (
            mime::types::JSON,
            serde_json::json!({
                "error": { "code": status, "message": message },
            })
            .to_string(),
        ),
        Accept::Html => (mime::types::HTML, error_page(status, code, message)),
        Accept::Plain => (mime::types::PLAIN, format!("{status}: {message}\n")),
    };
    send(
        request,
        status,
        content_type,
        body.into_bytes(),
        req_id,
        &FxHashMap::default(),
        head,
    )
}

fn page_shell(title: &str, heading: &str, detail: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
  body {{ font-family: -apple-system, sans-serif; margin: 10% auto; max-width: 36em; color: #333; }}
  h1 {{ font-size: 1.4em; font-weight: 500; }}
  p {{ color: #666; }}
  code {{ background: #f4f4f4; padding: 2px 6px; border-radius: 3px; }}
</style>
</head>
<body>
<h1>{heading}</h1>
<p>{detail}</p>
</body>
</html>
"#
    )
}

fn redirect_page(location: &str) -> String {
    let escaped = escape_html(location);
    page_shell(
        "Redirecting",
        "Redirecting",
        &format!(r#"You are being redirected to <code>{escaped}</code>."#),
    )
}

fn error_page(status: u16, code: &str, message: &str) -> String {
    let message = escape_html(message);
    match status {
        404 => page_shell(
            "404: Not Found",
            "404: This page could not be found",
            &format!("<code>{}</code>: {message}", escape_html(code)),
        ),
        502 => page_shell(
            "502: Bad Gateway",
            "502: An error occurred with your function",
            &format!("<code>{}</code>: {message}", escape_html(code)),
        ),
        _ => page_shell(
            &format!("{status}: Error"),
            &format!("{status}: An unexpected error occurred"),
            &format!("<code>{}</code>: {message}", escape_html(code)),
        ),
    }
}

/// Minimal HTML escaping for page interpolation.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
