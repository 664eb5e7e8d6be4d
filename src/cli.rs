use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "portfolio")]
#[command(version)]
#[command(about = "Chat relay for the portfolio site: forwards /api/chat to the hosted language API")]
pub struct Args {
    /// Address to bind the HTTP listener to [default: 127.0.0.1]
    #[arg(long)]
    pub bind: Option<String>,

    /// Port for the HTTP listener [default: 8888]
    #[arg(long)]
    pub port: Option<u16>,

    /// Upstream model name (e.g. gemini-2.0-flash)
    #[arg(long)]
    pub model: Option<String>,

    /// Base URL of the upstream language API
    #[arg(long)]
    pub upstream_url: Option<String>,

    /// Timeout for the outbound call, in seconds [default: 30]
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Time allowed for a client to send its whole request, in seconds [default: 15]
    #[arg(long)]
    pub read_timeout_secs: Option<u64>,

    /// Optional TOML config file; CLI flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// tracing filter directive (falls back to RUST_LOG, then "info")
    #[arg(long)]
    pub log_filter: Option<String>,
}
