//! ShellGate CLI
//!
//! Lists configured hosts, shows the gateway endpoint, and attaches the local
//! terminal to one or more remote shells.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use shellgate::cli::{Cli, Command};
use shellgate::config::{ClientConfig, EndpointProvider, ServerUrl};
use shellgate::logging::init_logging;
use shellgate::paths::DataDir;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    data_dir
        .ensure_dirs()
        .with_context(|| format!("failed to create {}", data_dir.path().display()))?;
    let logging = init_logging(&data_dir)?;

    let config = ClientConfig::load(&data_dir.config_path())?;
    let endpoint = ServerUrl::new(cli.server_url.clone().or_else(|| config.server_url.clone()));

    info!(
        component = "cli",
        event = "cli.started",
        run_id = %logging.run_id,
        data_dir = %data_dir.path().display(),
        hosts = config.hosts.len(),
        "ShellGate client starting"
    );

    match cli.command {
        Command::Hosts => {
            if config.hosts.is_empty() {
                println!("No hosts in {}", data_dir.config_path().display());
            }
            for host in &config.hosts {
                println!(
                    "{:>4}  {:<20} {}@{}:{}  ({})",
                    host.id,
                    host.name,
                    host.username,
                    host.address,
                    host.port,
                    host.auth.kind()
                );
            }
        }
        Command::Endpoint => {
            let endpoint = endpoint.endpoint()?;
            println!("{endpoint}");
        }
        Command::Connect(args) => {
            let hosts = args
                .hosts
                .iter()
                .map(|key| {
                    config
                        .find_host(key)
                        .cloned()
                        .with_context(|| format!("unknown host {key:?}"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            shellgate::interactive::run(hosts, Arc::new(endpoint)).await?;
        }
    }

    Ok(())
}
