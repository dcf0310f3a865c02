//! Command-line interface definitions.

use clap::{ColorChoice, Parser};
use std::path::PathBuf;

/// Local development server for Now deployments
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Project directory to serve (default: current directory)
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub dir: Option<PathBuf>,

    /// Listen specification: a port number or `unix:/path/to.sock`
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Port number to listen on (shorthand for --listen <port>)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Control colored output (auto, always, never)
    #[arg(long, default_value = "auto")]
    pub color: ColorChoice,

    /// Enable verbose output for debugging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the listen specification from `--listen` / `--port`.
    ///
    /// `--listen` wins when both are given. Default port is 3000.
    pub fn listen_spec(&self) -> crate::serve::ListenSpec {
        use crate::serve::ListenSpec;

        if let Some(listen) = &self.listen {
            if let Some(path) = listen.strip_prefix("unix:") {
                return ListenSpec::Unix(PathBuf::from(path));
            }
            if let Ok(port) = listen.parse::<u16>() {
                return ListenSpec::Port(port);
            }
        }
        ListenSpec::Port(self.port.unwrap_or(3000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serve::ListenSpec;

    #[test]
    fn test_listen_spec_default() {
        let cli = Cli::parse_from(["nowdev"]);
        assert!(matches!(cli.listen_spec(), ListenSpec::Port(3000)));
    }

    #[test]
    fn test_listen_spec_port_flag() {
        let cli = Cli::parse_from(["nowdev", "--port", "8080"]);
        assert!(matches!(cli.listen_spec(), ListenSpec::Port(8080)));
    }

    #[test]
    fn test_listen_spec_unix() {
        let cli = Cli::parse_from(["nowdev", "--listen", "unix:/tmp/dev.sock"]);
        match cli.listen_spec() {
            ListenSpec::Unix(path) => assert_eq!(path, PathBuf::from("/tmp/dev.sock")),
            other => panic!("expected unix spec, got {other:?}"),
        }
    }

    #[test]
    fn test_listen_wins_over_port() {
        let cli = Cli::parse_from(["nowdev", "--listen", "4000", "--port", "8080"]);
        assert!(matches!(cli.listen_spec(), ListenSpec::Port(4000)));
    }
}
