//! Listener binding.

use anyhow::{Result, anyhow};
use std::path::PathBuf;
use tiny_http::Server;

/// Where to listen: a numeric port (retried on collision) or a named
/// socket (fatal on collision).
#[derive(Debug, Clone)]
pub enum ListenSpec {
    Port(u16),
    Unix(PathBuf),
}

/// Bind the listener.
///
/// A numeric port in use is retried with increment until a bind succeeds;
/// named-socket failures are fatal.
pub fn bind(spec: &ListenSpec) -> Result<(Server, String)> {
    match spec {
        ListenSpec::Port(base_port) => {
            let mut port = *base_port;
            loop {
                match Server::http(("127.0.0.1", port)) {
                    Ok(server) => {
                        if port != *base_port {
                            crate::log!("serve"; "port {} in use, using {} instead", base_port, port);
                        }
                        // port 0 asks the OS for an ephemeral port
                        let bound = match server.server_addr().to_ip() {
                            Some(addr) => addr.port(),
                            None => port,
                        };
                        return Ok((server, format!("127.0.0.1:{bound}")));
                    }
                    Err(e) => {
                        port = port.checked_add(1).ok_or_else(|| {
                            anyhow!("no free port at or above {}: {}", base_port, e)
                        })?;
                    }
                }
            }
        }
        #[cfg(unix)]
        ListenSpec::Unix(path) => {
            let server = Server::http_unix(path)
                .map_err(|e| anyhow!("failed to bind socket {}: {}", path.display(), e))?;
            Ok((server, path.display().to_string()))
        }
        #[cfg(not(unix))]
        ListenSpec::Unix(path) => {
            anyhow::bail!("named sockets are not supported here: {}", path.display())
        }
    }
}
