//! Request routing.
//!
//! Walks an ordered route list, matching each rule's `src` regex against
//! the request path. Matches rewrite the working path, accumulate headers
//! and status, and either stop (terminal rule) or continue (`continue`).
//! `check: true` rules only match when a built asset exists for the
//! rewritten destination, which is what makes fallback routes work.

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::utils::path::{parse_query, split_query};

/// One routing rule. Evaluation order is list order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteRule {
    /// Full-match anchored regex evaluated against the request path.
    pub src: String,
    /// Rewrite target; captures are substituted (`$1`, `$name`).
    #[serde(default)]
    pub dest: Option<String>,
    /// HTTP methods this rule applies to (all when absent).
    #[serde(default)]
    pub methods: Option<Vec<String>>,
    /// Response headers to set; values support capture substitution.
    #[serde(default)]
    pub headers: Option<FxHashMap<String, String>>,
    /// Response status override (redirect when 301/302/303 with `location`).
    #[serde(default)]
    pub status: Option<u16>,
    /// Merge this rule's effects and keep evaluating.
    #[serde(rename = "continue", default)]
    pub continue_: Option<bool>,
    /// Only match when a built asset exists for the destination.
    #[serde(default)]
    pub check: Option<bool>,
}

/// Outcome of a route walk.
#[derive(Debug, Clone)]
pub struct RouteResult {
    /// True iff any rule matched.
    pub found: bool,
    /// Final destination: a local path or an absolute URL.
    pub dest: String,
    pub status: Option<u16>,
    pub headers: FxHashMap<String, String>,
    /// Query parameters introduced by `dest` rewrites, merged into the
    /// final request URL by the caller.
    pub uri_args: FxHashMap<String, String>,
}

/// Compile a rule's `src` into a full-match anchored regex.
pub fn compile_src(src: &str) -> Result<regex::Regex, regex::Error> {
    let mut pattern = String::with_capacity(src.len() + 2);
    if !src.starts_with('^') {
        pattern.push('^');
    }
    pattern.push_str(src);
    if !src.ends_with('$') {
        pattern.push('$');
    }
    regex::Regex::new(&pattern)
}

/// Whether a destination leaves the local server.
pub fn is_external(dest: &str) -> bool {
    dest.starts_with("http://") || dest.starts_with("https://")
}

/// Walk the route list for `method` + `path`.
///
/// `probe` answers "does a built asset exist for this path?" and gates
/// `check: true` rules.
pub fn resolve(
    routes: &[RouteRule],
    method: &str,
    path: &str,
    probe: &dyn Fn(&str) -> bool,
) -> RouteResult {
    let mut result = RouteResult {
        found: false,
        dest: path.to_string(),
        status: None,
        headers: FxHashMap::default(),
        uri_args: FxHashMap::default(),
    };

    for rule in routes {
        if let Some(methods) = &rule.methods
            && !methods.iter().any(|m| m.eq_ignore_ascii_case(method))
        {
            continue;
        }

        let regex = match compile_src(&rule.src) {
            Ok(regex) => regex,
            Err(e) => {
                crate::debug!("route"; "skipping invalid pattern {}: {}", rule.src, e);
                continue;
            }
        };
        let Some(caps) = regex.captures(&result.dest) else {
            continue;
        };

        let dest = match &rule.dest {
            Some(template) => {
                let mut expanded = String::new();
                caps.expand(template, &mut expanded);
                expanded
            }
            None => result.dest.clone(),
        };
        let (dest_path, query) = split_query(&dest);

        if rule.check.unwrap_or(false) && !is_external(dest_path) && !probe(dest_path) {
            continue;
        }

        if let Some(query) = query {
            result.uri_args.extend(parse_query(query));
        }
        if let Some(headers) = &rule.headers {
            for (name, template) in headers {
                let mut expanded = String::new();
                caps.expand(template, &mut expanded);
                result.headers.insert(name.clone(), expanded);
            }
        }
        if let Some(status) = rule.status {
            result.status = Some(status);
        }

        result.found = true;
        result.dest = dest_path.to_string();

        if !rule.continue_.unwrap_or(false) {
            break;
        }
    }

    result
}
