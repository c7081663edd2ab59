//! CLI for the Arachne deployment toolkit.
//!
//! `spider` crawls the contract graph from a roots file and persists the
//! discovered alias/proxy maps; `aliases` dumps a persisted alias store.

use alloy_primitives::Address;
use arachne_core::{ArachneResult, BuildArtifact, RelationConfigMap};
use arachne_deploy::{AliasStore, Cache, DeploymentManager};
use arachne_provider::{ArtifactSource, HttpArtifactSource, RpcProvider};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "arachne", version, about = "Contract-graph spider and deployment manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl the contract graph from root aliases and persist the result.
    Spider {
        #[arg(short, long, env = "ARACHNE_RPC_URL")]
        rpc_url: String,

        #[arg(short, long)]
        network: String,

        #[arg(short, long)]
        deployment: String,

        /// Relation config JSON (contract type / template -> rules).
        #[arg(short, long)]
        config: PathBuf,

        /// Roots JSON (alias -> address).
        #[arg(long)]
        roots: PathBuf,

        /// Persist the cache under this directory.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Base URL of a remote artifact source.
        #[arg(long, env = "ARACHNE_ARTIFACT_URL")]
        artifact_url: Option<String>,

        /// Crawl and report without persisting anything to disk.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the persisted alias store for a deployment.
    Aliases {
        #[arg(long)]
        cache_dir: PathBuf,

        #[arg(short, long)]
        network: String,

        #[arg(short, long)]
        deployment: String,
    },
}

/// Fallback artifact source when no remote endpoint is configured:
/// everything is soft-missing and the crawler uses generic handles.
struct NoArtifacts;

#[async_trait::async_trait]
impl ArtifactSource for NoArtifacts {
    async fn artifact_for(
        &self,
        _network: &str,
        _address: Address,
    ) -> ArachneResult<Option<BuildArtifact>> {
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Spider {
            rpc_url,
            network,
            deployment,
            config,
            roots,
            cache_dir,
            artifact_url,
            dry_run,
            json,
        } => {
            let config: RelationConfigMap =
                serde_json::from_str(&std::fs::read_to_string(&config)?)?;
            let roots: BTreeMap<String, Address> =
                serde_json::from_str(&std::fs::read_to_string(&roots)?)?;

            tracing::info!(network, deployment, roots = roots.len(), "starting crawl");

            let provider = Arc::new(RpcProvider::connect(&rpc_url).await?);
            let artifacts: Arc<dyn ArtifactSource> = match artifact_url {
                Some(url) => Arc::new(HttpArtifactSource::new(&url)?),
                None => Arc::new(NoArtifacts),
            };
            let cache = match (&cache_dir, dry_run) {
                (Some(dir), false) => Cache::with_disk(dir, &network, &deployment),
                (Some(_), true) => {
                    tracing::info!("dry run: skipping disk persistence");
                    Cache::new()
                }
                (None, _) => Cache::new(),
            };

            let mut manager =
                DeploymentManager::new(network, deployment, config, provider, artifacts, cache)?;

            // Seed the crawl with the requested roots, then recrawl through
            // the manager so the result is persisted.
            for (alias, address) in &roots {
                manager.existing(alias, *address).await?;
            }
            manager.spider().await?;

            if json {
                let aliases: BTreeMap<&str, String> = manager
                    .aliases()
                    .iter()
                    .map(|(a, addr)| (a.as_str(), format!("{addr:#x}")))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "aliases": aliases,
                        "proxies": manager.proxies(),
                    }))?
                );
            } else {
                println!("aliases:");
                for (alias, address) in manager.aliases().iter() {
                    println!("  {alias:32} {address:#x}");
                }
                println!("proxies:");
                for (proxy, delegate) in manager.proxies() {
                    println!("  {proxy:32} -> {delegate}");
                }
            }
        }

        Commands::Aliases {
            cache_dir,
            network,
            deployment,
        } => {
            let cache = Cache::with_disk(&cache_dir, &network, &deployment);
            let store = AliasStore::load_aliases(&cache)?;
            if store.is_empty() {
                println!("no aliases persisted for {network}/{deployment}");
            } else {
                for (alias, address) in store.iter() {
                    println!("{alias:32} {address:#x}");
                }
            }
        }
    }

    Ok(())
}
