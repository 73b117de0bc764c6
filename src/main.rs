//! Bridge task CLI
//!
//! Operational companion to the bridge core: derive bridge identities from a
//! configuration file, build attestable queries, and fetch attested
//! responses from a gateway.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use subgraph_bridge::config::Config;
use subgraph_bridge::gateway::GatewayClient;
use subgraph_bridge::query::build_query;
use subgraph_bridge::{request_cid, BridgeConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "bridge.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive the identity hash of a bridge configuration
    BridgeId {
        /// Path to a bridge configuration TOML file
        #[arg(short, long)]
        bridge: PathBuf,
    },

    /// Compute the request CID of a query string
    RequestCid {
        /// The query string
        query: String,
    },

    /// Build the concrete query for a block hash
    BuildQuery {
        #[arg(short, long)]
        bridge: PathBuf,

        /// 0x-prefixed 32-byte block hash
        #[arg(long)]
        block_hash: String,

        /// First query variable value
        #[arg(long, default_value = "")]
        var0: String,

        /// Second query variable value
        #[arg(long, default_value = "")]
        var1: String,
    },

    /// Build a query, POST it to the gateway, and print the attested response
    FetchAttestation {
        #[arg(short, long)]
        bridge: PathBuf,

        #[arg(long)]
        block_hash: String,

        #[arg(long, default_value = "")]
        var0: String,

        #[arg(long, default_value = "")]
        var1: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.command {
        Command::BridgeId { bridge } => {
            let config = load_bridge_config(&bridge)?;
            info!("Template hash: {}", config.template_hash());
            println!("{}", config.bridge_id());
        }
        Command::RequestCid { query } => {
            println!("{}", request_cid(&query));
        }
        Command::BuildQuery {
            bridge,
            block_hash,
            var0,
            var1,
        } => {
            let config = load_bridge_config(&bridge)?;
            let query = build_query(
                &config.query_template,
                &config.splice,
                &block_hash,
                [var0.as_str(), var1.as_str()],
            )?;
            info!("Request CID: {}", request_cid(&query));
            println!("{}", query);
        }
        Command::FetchAttestation {
            bridge,
            block_hash,
            var0,
            var1,
        } => {
            let bridge_config = load_bridge_config(&bridge)?;
            let config = Config::load(&args.config).unwrap_or_else(|e| {
                warn!(
                    "Failed to load config file {}: {}. Using environment variables.",
                    args.config, e
                );
                Config::from_env().expect("Failed to load configuration from environment variables")
            });

            let query = build_query(
                &bridge_config.query_template,
                &bridge_config.splice,
                &block_hash,
                [var0.as_str(), var1.as_str()],
            )?;
            let cid = request_cid(&query);
            info!("Bridge query: {}", query);

            let client = GatewayClient::new(
                &config.gateway_endpoint,
                config.request_timeout_secs,
                config.max_retries,
            )?;
            let result = client.fetch_attested_response(&query).await?;

            if result.attestation.request_cid != cid {
                warn!(
                    "Attestation request CID {} does not match local {}",
                    result.attestation.request_cid, cid
                );
            }
            if result.attestation.subgraph_deployment_id != bridge_config.subgraph_deployment_id {
                warn!(
                    "Attestation is for deployment {}, bridge expects {}",
                    result.attestation.subgraph_deployment_id,
                    bridge_config.subgraph_deployment_id
                );
            }

            println!("{}", result.response);
            println!("{}", serde_json::to_string_pretty(&result.attestation)?);
        }
    }

    Ok(())
}

fn load_bridge_config(path: &PathBuf) -> Result<BridgeConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("cannot read bridge configuration {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("cannot parse bridge configuration {}", path.display()))
}
