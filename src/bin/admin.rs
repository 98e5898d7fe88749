//! Query Orchestrator Admin CLI
//!
//! Local operability tool that inspects a running orchestrator's Provider
//! Registry health and Response Cache occupancy over HTTP. Never on the
//! request path — this talks to `GET /admin/status`, nothing else.

use aperture_orchestrator::api::admin::AdminStatus;
use aperture_orchestrator::registry::Health;
use clap::{Parser, Subcommand};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "aperture-admin")]
#[command(about = "Query Orchestrator Admin CLI - inspect registry health and cache occupancy")]
#[command(version = "1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of a running orchestrator server.
    #[arg(long, env = "ORCHESTRATOR_URL", default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every registered provider chain and its live health.
    Registry,
    /// Print Response Cache occupancy (entry count, in-flight coalesces).
    Cache,
    /// Print both, plus the server's own health check.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "info" })
        .init();

    let client = reqwest::Client::builder().timeout(std::time::Duration::from_secs(5)).build()?;

    match cli.command {
        Commands::Registry => {
            let status = fetch_status(&client, &cli.url).await?;
            print_registry(&status);
        }
        Commands::Cache => {
            let status = fetch_status(&client, &cli.url).await?;
            print_cache(&status);
        }
        Commands::Status => {
            match client.get(format!("{}/health", cli.url)).send().await {
                Ok(resp) if resp.status().is_success() => info!("server reports healthy"),
                Ok(resp) => error!(status = %resp.status(), "server health check returned non-2xx"),
                Err(e) => error!(error = %e, "could not reach server health endpoint"),
            }
            let status = fetch_status(&client, &cli.url).await?;
            print_registry(&status);
            print_cache(&status);
        }
    }

    Ok(())
}

async fn fetch_status(client: &reqwest::Client, base_url: &str) -> anyhow::Result<AdminStatus> {
    let resp = client
        .get(format!("{}/admin/status", base_url))
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("failed to reach {}/admin/status: {}", base_url, e))?;

    if !resp.status().is_success() {
        anyhow::bail!("admin status request failed with {}", resp.status());
    }

    resp.json::<AdminStatus>().await.map_err(|e| anyhow::anyhow!("malformed admin status response: {}", e))
}

fn print_registry(status: &AdminStatus) {
    println!("Provider Registry:");
    for chain in &status.chains {
        println!("  {:?}", chain.kind);
        if chain.providers.is_empty() {
            println!("    (no providers registered)");
            continue;
        }
        for provider in &chain.providers {
            let marker = match provider.health {
                Health::Healthy => "ok",
                Health::Degraded => "degraded",
                Health::Down => "down",
            };
            println!(
                "    {:<24} keyed={:<5} cost={:<9} health={}",
                provider.id, provider.keyed, provider.cost_class, marker
            );
        }
    }
}

fn print_cache(status: &AdminStatus) {
    println!("Response Cache:");
    println!("  entries:    {}", status.cache_entries);
    println!("  in-flight:  {}", status.cache_in_flight);
}
