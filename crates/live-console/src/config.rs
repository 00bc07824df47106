use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::session::DEFAULT_MAX_SESSIONS;

pub const DEFAULT_SSH_HOST: &str = "127.0.0.1";
pub const DEFAULT_SSH_PORT: u16 = 50101;
pub const DEFAULT_KEY_DIR: &str = "keys";
pub const DEFAULT_HTTP_LISTEN: &str = "127.0.0.1:8123";
pub const DEFAULT_NAME: &str = "live-console";

const LONG_ABOUT: &str = r#"live-console opens an interactive console into a running process.

Operators connect over SSH or through the browser panel; every connection
gets its own isolated session with a private namespace and a shared `host`
handle for inspecting and changing process state.

EXAMPLES:
    # Serve SSH on 127.0.0.1:50101 and the browser panel on 127.0.0.1:8123
    live-console serve

    # SSH only, host keys from /etc/live-console
    live-console serve --no-http --key-dir /etc/live-console

    # Connect
    ssh -p 50101 localhost"#;

#[derive(Parser)]
#[command(name = "live-console")]
#[command(author, version)]
#[command(about = "Interactive console into a running process over SSH and the browser")]
#[command(long_about = LONG_ABOUT)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve console sessions until interrupted
    Serve(ServeArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address the SSH server binds to
    #[arg(long, env = "LIVE_CONSOLE_SSH_HOST", default_value = DEFAULT_SSH_HOST)]
    pub ssh_host: String,

    /// Port the SSH server binds to
    #[arg(long, env = "LIVE_CONSOLE_SSH_PORT", default_value_t = DEFAULT_SSH_PORT)]
    pub ssh_port: u16,

    /// Directory holding ssh_host_<algorithm>_key files
    #[arg(long, env = "LIVE_CONSOLE_KEY_DIR", default_value = DEFAULT_KEY_DIR)]
    pub key_dir: PathBuf,

    /// Address of the HTTP server carrying the browser console
    #[arg(long, env = "LIVE_CONSOLE_HTTP_LISTEN", default_value = DEFAULT_HTTP_LISTEN)]
    pub http_listen: String,

    /// Maximum number of concurrently live sessions
    #[arg(long, env = "LIVE_CONSOLE_MAX_SESSIONS", default_value_t = DEFAULT_MAX_SESSIONS)]
    pub max_sessions: usize,

    /// Name reported by `host.name`
    #[arg(long, env = "LIVE_CONSOLE_NAME", default_value = DEFAULT_NAME)]
    pub name: String,

    /// Do not start the SSH transport
    #[arg(long)]
    pub no_ssh: bool,

    /// Do not start the browser transport
    #[arg(long)]
    pub no_http: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub name: String,
    pub ssh_host: String,
    pub ssh_port: u16,
    pub key_dir: PathBuf,
    pub http_listen: String,
    pub max_sessions: usize,
    pub ssh_enabled: bool,
    pub http_enabled: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            ssh_host: DEFAULT_SSH_HOST.to_string(),
            ssh_port: DEFAULT_SSH_PORT,
            key_dir: PathBuf::from(DEFAULT_KEY_DIR),
            http_listen: DEFAULT_HTTP_LISTEN.to_string(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            ssh_enabled: true,
            http_enabled: true,
        }
    }
}

impl From<ServeArgs> for ConsoleConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            name: args.name,
            ssh_host: args.ssh_host,
            ssh_port: args.ssh_port,
            key_dir: args.key_dir,
            http_listen: args.http_listen,
            max_sessions: args.max_sessions,
            ssh_enabled: !args.no_ssh,
            http_enabled: !args.no_http,
        }
    }
}

impl ConsoleConfig {
    /// `host:port` for the SSH listener; IPv6 hosts are bracketed.
    pub fn ssh_addr(&self) -> String {
        if self.ssh_host.contains(':') && !self.ssh_host.starts_with('[') {
            format!("[{}]:{}", self.ssh_host, self.ssh_port)
        } else {
            format!("{}:{}", self.ssh_host, self.ssh_port)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_ssh_host(mut self, host: impl Into<String>) -> Self {
        self.ssh_host = host.into();
        self
    }

    pub fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    pub fn with_key_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.key_dir = dir.into();
        self
    }

    pub fn with_http_listen(mut self, addr: impl Into<String>) -> Self {
        self.http_listen = addr.into();
        self
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn with_ssh(mut self, enabled: bool) -> Self {
        self.ssh_enabled = enabled;
        self
    }

    pub fn with_http(mut self, enabled: bool) -> Self {
        self.http_enabled = enabled;
        self
    }
}
