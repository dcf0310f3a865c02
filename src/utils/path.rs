//! URL path manipulation.

use std::borrow::Cow;
use std::path::Path;

/// Collapse runs of consecutive slashes into one (`//a///b` → `/a/b`).
///
/// Idempotent: applying it twice equals applying it once.
pub fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out
}

/// Split a request URL into path and optional raw query string.
pub fn split_query(url: &str) -> (&str, Option<&str>) {
    match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    }
}

/// Percent-decode a URL path for filesystem/asset lookup.
pub fn decode_path(path: &str) -> String {
    use percent_encoding::percent_decode_str;
    percent_decode_str(path)
        .decode_utf8()
        .map(Cow::into_owned)
        .unwrap_or_else(|_| path.to_string())
}

/// Project-root-relative path with forward slashes, or `None` if the
/// path lies outside the root.
pub fn to_rel(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in rel.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(component.as_os_str().to_str()?);
    }
    Some(out)
}

/// Parse a query string into decoded key/value pairs, preserving order.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            (decode_path(k), decode_path(v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_collapse_slashes() {
        assert_eq!(collapse_slashes("//a//b"), "/a/b");
        assert_eq!(collapse_slashes("/a/b"), "/a/b");
        assert_eq!(collapse_slashes("///"), "/");
        assert_eq!(collapse_slashes(""), "");
    }

    #[test]
    fn test_collapse_slashes_idempotent() {
        let once = collapse_slashes("//a///b////c");
        assert_eq!(collapse_slashes(&once), once);
    }

    #[test]
    fn test_split_query() {
        assert_eq!(split_query("/a?x=1"), ("/a", Some("x=1")));
        assert_eq!(split_query("/a"), ("/a", None));
        assert_eq!(split_query("/a?"), ("/a", Some("")));
    }

    #[test]
    fn test_decode_path() {
        assert_eq!(decode_path("/a%20b"), "/a b");
        assert_eq!(decode_path("/plain"), "/plain");
    }

    #[test]
    fn test_to_rel() {
        let root = PathBuf::from("/project");
        assert_eq!(
            to_rel(&root, &PathBuf::from("/project/api/fn.js")),
            Some("api/fn.js".to_string())
        );
        assert_eq!(to_rel(&root, &PathBuf::from("/other/fn.js")), None);
    }

    #[test]
    fn test_parse_query() {
        let args = parse_query("a=1&b=two&flag");
        assert_eq!(
            args,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }
}
