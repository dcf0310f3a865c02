//! Platform response headers and request-id generation.

use rand::Rng;
use tiny_http::Header;

/// Characters allowed in pod ids and the hex tail of request ids.
const POD_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Five-character pod identifier, chosen once per server instance.
pub fn generate_pod_id() -> String {
    let mut rng = rand::rng();
    (0..5)
        .map(|_| POD_ALPHABET[rng.random_range(0..POD_ALPHABET.len())] as char)
        .collect()
}

/// Correlation id: `dev1:{podId}-{epochMs}-{12 hex chars}`.
pub fn request_id(pod_id: &str) -> String {
    let mut rng = rand::rng();
    let tail: String = (0..6)
        .map(|_| format!("{:02x}", rng.random_range(0..=255u8)))
        .collect();
    format!("dev1:{}-{}-{}", pod_id, crate::core::epoch_ms(), tail)
}

/// Headers present on every response the dev server writes itself.
pub fn base_headers(req_id: &str) -> Vec<Header> {
    vec![
        header("cache-control", "public, max-age=0, must-revalidate"),
        header("server", "now"),
        header("x-now-trace", "dev1"),
        header("x-now-id", req_id),
        header("x-now-cache", "MISS"),
    ]
}

pub fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("invalid header")
}
