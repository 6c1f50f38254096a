//! Katana APR - Yearn vault reward aggregation service
//!
//! Run with: cargo run -- serve
//!
//! Pipeline:
//! - yDaemon vault list
//! - Merkl opportunities per reward program (forwarded, fixed rate, Morpho, Steer)
//! - Multicall3 strategy -> pool resolution
//! - per-vault aggregation into a TTL cache served over HTTP and the Kong webhook

use clap::{ArgGroup, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::style;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aggregate;
mod cache;
mod config;
mod diagnose;
mod error;
mod pipeline;
mod rewards;
mod server;
mod sources;
mod types;

use cache::AprCache;
use config::Config;
use diagnose::{classify_vault, summarize};
use pipeline::{AprPipeline, SnapshotBuilder};
use rewards::matcher::parse_address;
use rewards::{AprDebugLogger, RewardProgram, TokenAllowlist};
use server::AppState;
use sources::yearn_api::vault_by_address;
use sources::{MerklApi, OpportunitySource, VaultSource, YearnApi};

// ============================================
// CLI
// ============================================

#[derive(Parser, Debug)]
#[command(name = "katana-apr", version, about = "APR aggregation for Yearn vaults on Katana")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Compute the APR cache once and print it as JSON
    Snapshot {
        #[arg(long)]
        pretty: bool,
    },
    /// Explain why vaults do or do not earn forwarded rewards
    DebugVault(DebugVaultArgs),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["vault", "all"])))]
struct DebugVaultArgs {
    /// Single vault address
    #[arg(long, value_parser = parse_vault_arg)]
    vault: Option<String>,

    /// Inspect the first --limit vaults
    #[arg(long)]
    all: bool,

    #[arg(long, default_value_t = 25, value_parser = clap::value_parser!(u64).range(1..))]
    limit: u64,
}

fn parse_vault_arg(s: &str) -> std::result::Result<String, String> {
    parse_address(s)
        .map(|_| s.trim().to_string())
        .ok_or_else(|| format!("invalid vault address: {}", s))
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🎯 KATANA APR - Yearn Vault Rewards Service").cyan().bold()
    );
    println!(
        "{}",
        style("    yDaemon | Merkl | Multicall3 | Kong Webhook").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

// ============================================
// COMMANDS
// ============================================

async fn run_server(config: Config, debug: Arc<AprDebugLogger>) -> Result<()> {
    print_banner();

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }

    config.print_summary();
    println!();

    let pipeline = AprPipeline::from_config(&config, debug)?;
    info!(
        "📦 Reward programs: {}",
        pipeline
            .programs()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let cache = AprCache::new(Arc::new(pipeline), config.cache_ttl());

    // warm in the background
    let warm = cache.clone();
    tokio::spawn(async move {
        match warm.get().await {
            Ok(read) => info!("✅ Cache warmed: {} vaults", read.data.len()),
            Err(e) => error!("❌ Initial cache build failed: {}", e),
        }
    });

    let state = AppState::new(cache, &config);
    server::serve(state, config.port).await
}

async fn run_snapshot(config: Config, debug: Arc<AprDebugLogger>, pretty: bool) -> Result<()> {
    config.validate()?;

    let start = Instant::now();
    let pipeline = AprPipeline::from_config(&config, debug)?;
    let cache = pipeline.build().await?;
    info!("⚡ Snapshot of {} vaults in {:?}", cache.len(), start.elapsed());

    let out = if pretty {
        serde_json::to_string_pretty(&cache)?
    } else {
        serde_json::to_string(&cache)?
    };
    println!("{}", out);
    Ok(())
}

async fn run_debug_vault(config: Config, debug: Arc<AprDebugLogger>, args: DebugVaultArgs) -> Result<()> {
    let yearn = YearnApi::new(&config.ydaemon_base_uri, config.chain_id, config.http_timeout(), debug.clone())?;
    let merkl = MerklApi::new(&config.merkl_base_uri, config.chain_id, config.http_timeout(), debug)?;

    let (vaults, opportunities) = tokio::try_join!(
        yearn.fetch_vaults(),
        merkl.fetch_opportunities(RewardProgram::Forwarded.query())
    )?;

    let selected: Vec<_> = match args.vault.as_deref() {
        Some(address) => vault_by_address(&vaults, address).into_iter().collect(),
        None if args.all => vaults.iter().take(args.limit as usize).collect(),
        None => Vec::new(),
    };

    let report = if selected.is_empty() {
        let message = if args.vault.is_some() {
            "No vault matched the provided address in yDaemon response"
        } else {
            "No vaults selected"
        };
        json!({
            "chainId": config.chain_id,
            "selectedVaults": 0,
            "message": message,
        })
    } else {
        let allowlist = TokenAllowlist::new(&config.reward_tokens);
        let results: Vec<_> = selected
            .iter()
            .map(|v| classify_vault(v, &opportunities, &allowlist))
            .collect();

        json!({
            "chainId": config.chain_id,
            "yearnVaultCount": vaults.len(),
            "merklOpportunityCount": opportunities.len(),
            "selectedVaults": selected.len(),
            "summary": summarize(&results),
            "results": results,
        })
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// ============================================
// MAIN
// ============================================

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // stderr keeps snapshot output on stdout clean
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("katana_apr=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    let debug = Arc::new(AprDebugLogger::new(config.debug.clone()));
    if debug.is_enabled() {
        info!("🔍 APR debug logging enabled");
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config, debug).await,
        Command::Snapshot { pretty } => run_snapshot(config, debug, pretty).await,
        Command::DebugVault(args) => run_debug_vault(config, debug, args)
            .await
            .map_err(|e| eyre!("debug-vault failed: {}", e)),
    }
}
