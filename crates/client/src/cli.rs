//! Command-line arguments for the `shellgate` binary

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "shellgate",
    about = "Terminal sessions to SSH hosts through a ShellGate gateway",
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "SHELLGATE_DATA_DIR",
        value_name = "DIR",
        help = "Directory holding config.toml and logs (default ~/.shellgate)"
    )]
    pub data_dir: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "SHELLGATE_SERVER_URL",
        value_name = "URL",
        help = "Gateway base URL, overrides server_url in config.toml"
    )]
    pub server_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List configured hosts
    Hosts,
    /// Print the WebSocket endpoint derived from the gateway URL
    Endpoint,
    /// Open a terminal session per host and attach the local tty
    Connect(ConnectArgs),
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Host names or ids from config.toml
    #[arg(required = true, value_name = "HOST")]
    pub hosts: Vec<String>,
}
