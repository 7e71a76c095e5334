//! Configuration for the Switchboard MCP server.
//!
//! Settings come from three layers: built-in defaults, an optional YAML
//! config file, and CLI flags / `SWITCHBOARD_*` environment variables. The
//! CLI wins where it differs from the built-in default, the file fills the
//! rest.

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::transport::Framing;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Command-line arguments for the Switchboard server.
#[derive(Parser, Debug, Clone)]
#[command(name = "switchboard-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MCP server exposing tools, resources, and prompts over stdio or HTTP")]
pub struct Args {
    /// Workspace root directory
    #[arg(short, long, env = "SWITCHBOARD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Transport mode: stdio or http
    #[arg(short, long, default_value = "stdio", env = "SWITCHBOARD_TRANSPORT")]
    pub transport: Transport,

    /// HTTP listen host
    #[arg(long, default_value = DEFAULT_HOST, env = "SWITCHBOARD_HOST")]
    pub host: String,

    /// HTTP listen port
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "SWITCHBOARD_PORT")]
    pub port: u16,

    /// Request timeout in seconds (http transport)
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "SWITCHBOARD_TIMEOUT")]
    pub timeout: u64,

    /// Stdio framing: newline-delimited or length-prefixed
    #[arg(long, default_value = "newline-delimited", env = "SWITCHBOARD_FRAMING")]
    pub framing: Framing,

    /// Gzip frames (length-prefixed stdio) or HTTP responses
    #[arg(long, env = "SWITCHBOARD_COMPRESS")]
    pub compress: bool,

    /// Enable debug logging
    #[arg(short, long, env = "SWITCHBOARD_DEBUG")]
    pub debug: bool,

    /// Re-scan discovery paths on file changes
    #[arg(long, env = "SWITCHBOARD_WATCH")]
    pub watch: bool,

    /// Skip registering the built-in components
    #[arg(long, env = "SWITCHBOARD_NO_BUILTINS")]
    pub no_builtins: bool,

    /// Directories to scan for component classes (comma separated)
    #[arg(long, env = "SWITCHBOARD_DISCOVER", value_delimiter = ',')]
    pub discover: Vec<PathBuf>,

    /// Config file path (defaults to the platform config directory)
    #[arg(short, long, env = "SWITCHBOARD_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Transport mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Stdio,
    Http,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace root directory
    pub workspace: PathBuf,
    /// Transport mode
    pub transport: Transport,
    /// HTTP listen host
    pub host: String,
    /// HTTP listen port
    pub port: u16,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Stdio framing
    pub framing: Framing,
    /// Frame/response compression
    pub compress: bool,
    /// Debug mode
    pub debug: bool,
    /// Discovery watcher enabled
    pub watch: bool,
    /// Built-in components disabled
    pub no_builtins: bool,
    /// Discovery paths
    pub discover: Vec<PathBuf>,
}

/// The YAML file layer. Every key is optional; absent keys fall through to
/// the built-in defaults.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    workspace: Option<PathBuf>,
    transport: Option<Transport>,
    host: Option<String>,
    port: Option<u16>,
    timeout_secs: Option<u64>,
    framing: Option<Framing>,
    compress: Option<bool>,
    debug: Option<bool>,
    watch: Option<bool>,
    no_builtins: Option<bool>,
    discover: Option<Vec<PathBuf>>,
}

impl FileConfig {
    fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

impl Config {
    /// Resolve the effective configuration from parsed arguments and the
    /// optional config file.
    pub fn load(args: Args) -> Result<Self> {
        let file = match Self::file_path(&args) {
            Some(path) if path.exists() => FileConfig::read(&path)?,
            _ => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    fn file_path(args: &Args) -> Option<PathBuf> {
        match &args.config {
            Some(path) => Some(path.clone()),
            None => dirs::config_dir().map(|dir| dir.join("switchboard-mcp").join("config.yaml")),
        }
    }

    fn merge(args: Args, file: FileConfig) -> Result<Self> {
        let workspace = match args.workspace.or(file.workspace) {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };

        Ok(Self {
            workspace,
            transport: if args.transport != Transport::default() {
                args.transport
            } else {
                file.transport.unwrap_or_default()
            },
            host: if args.host != DEFAULT_HOST {
                args.host
            } else {
                file.host.unwrap_or_else(|| DEFAULT_HOST.to_string())
            },
            port: if args.port != DEFAULT_PORT {
                args.port
            } else {
                file.port.unwrap_or(DEFAULT_PORT)
            },
            timeout_secs: if args.timeout != DEFAULT_TIMEOUT_SECS {
                args.timeout
            } else {
                file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
            },
            framing: if args.framing != Framing::default() {
                args.framing
            } else {
                file.framing.unwrap_or_default()
            },
            compress: args.compress || file.compress.unwrap_or(false),
            debug: args.debug || file.debug.unwrap_or(false),
            watch: args.watch || file.watch.unwrap_or(false),
            no_builtins: args.no_builtins || file.no_builtins.unwrap_or(false),
            discover: if args.discover.is_empty() {
                file.discover.unwrap_or_default()
            } else {
                args.discover
            },
        })
    }

    /// Dotted-path lookup over the serialized configuration, e.g.
    /// `get("port")`. `None` for unknown keys.
    pub fn get(&self, key: &str) -> Option<Value> {
        let root = serde_json::to_value(self).ok()?;
        let mut current = &root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current.clone())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().expect("Failed to get current directory"),
            transport: Transport::Stdio,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            framing: Framing::NewlineDelimited,
            compress: false,
            debug: false,
            watch: false,
            no_builtins: false,
            discover: Vec::new(),
        }
    }
}
