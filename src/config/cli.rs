use clap::Parser;
use std::path::PathBuf;

use super::types::{DEFAULT_HOST, DEFAULT_LISTEN_BACKLOG, DEFAULT_PORT, DEFAULT_ROOT};

/// Single-threaded, edge-triggered HTTP/1.1 origin server.
#[derive(Parser, Debug, Clone)]
#[command(name = "litefs", version, about)]
pub struct Args {
    /// Address to bind.
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on.
    #[arg(short = 'P', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Document root for static content.
    #[arg(long, default_value = DEFAULT_ROOT)]
    pub webroot: String,

    /// Optional `config.yaml` with per-route overrides; CLI flags win on conflicts.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Raises the logging threshold to trace.
    #[arg(long)]
    pub debug: bool,

    /// Path served when no route matches and no configured not-found page exists.
    #[arg(long)]
    pub not_found: Option<String>,

    /// Default filename served for directory requests (e.g. index.html).
    #[arg(long, default_value = "index.html")]
    pub default_page: String,

    /// Directory under the webroot whose scripts are dispatched to the CGI loader.
    #[arg(long, default_value = "/cgi-bin")]
    pub cgi_dir: Option<String>,

    /// Append log lines to this file instead of stderr.
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// TCP listen backlog.
    #[arg(long, default_value_t = DEFAULT_LISTEN_BACKLOG)]
    pub listen: u32,
}
