//! Directory listings.
//!
//! Listings enumerate the match registry rather than the raw file index,
//! so they reflect routable entrypoints only.

use super::DevServer;
use super::respond::escape_html;

/// Render a listing page for a directory-ish request path, or `None`
/// when no entrypoint lives under it.
pub fn render(server: &DevServer, dir_key: &str) -> Option<String> {
    let prefix = if dir_key.is_empty() || dir_key.ends_with('/') {
        dir_key.to_string()
    } else {
        format!("{dir_key}/")
    };

    let entrypoints = server.matches.entrypoints_with_prefix(&prefix);
    if entrypoints.is_empty() {
        return None;
    }

    // Collapse to immediate children: files stay, deeper paths become dirs.
    let mut dirs: Vec<String> = Vec::new();
    let mut files: Vec<String> = Vec::new();
    for entrypoint in entrypoints {
        let rest = &entrypoint[prefix.len()..];
        match rest.split_once('/') {
            Some((dir, _)) => {
                let dir = dir.to_string();
                if !dirs.contains(&dir) {
                    dirs.push(dir);
                }
            }
            None => files.push(rest.to_string()),
        }
    }
    dirs.sort();
    files.sort();

    let mut rows = String::new();
    for dir in &dirs {
        let escaped = escape_html(dir);
        rows.push_str(&format!(
            "<li><a href=\"/{prefix}{escaped}/\">{escaped}/</a></li>\n"
        ));
    }
    for file in &files {
        let escaped = escape_html(file);
        rows.push_str(&format!(
            "<li><a href=\"/{prefix}{escaped}\">{escaped}</a></li>\n"
        ));
    }

    let title: &str = if prefix.is_empty() { "/" } else { prefix.as_str() };
    Some(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Index of {title}</title>
<style>
  body {{ font-family: -apple-system, sans-serif; margin: 5% auto; max-width: 36em; color: #333; }}
  h1 {{ font-size: 1.2em; font-weight: 500; }}
  ul {{ list-style: none; padding: 0; }}
  li {{ padding: 2px 0; }}
  a {{ text-decoration: none; color: #0070f3; }}
</style>
</head>
<body>
<h1>Index of {title}</h1>
<ul>
{rows}</ul>
</body>
</html>
"#,
        title = escape_html(title),
    ))
}
