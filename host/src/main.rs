//! rewards-host - build and inspect season reward trees

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rewards_core::{hash_to_hex, verify_merkle_proof, Address};
use rewards_host::{generate_season, JsonProgressStore, RewardsConfig, TreeSnapshot};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "rewards.toml";

/// Build and inspect season reward Merkle trees
#[derive(Parser, Debug)]
#[command(name = "rewards-host")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration (defaults to ./rewards.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Aggregate a season's rewards and write its tree data file
    Generate {
        /// User-progress export (JSON array of user documents)
        #[arg(short, long)]
        progress: PathBuf,

        /// Season to build
        #[arg(short, long)]
        season: u64,

        /// Output directory (overrides `output_dir` from the config)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// Print a user's claim tuples from a tree data file
    Proof {
        /// Tree data file
        #[arg(short, long)]
        tree: PathBuf,

        /// Claimant address
        #[arg(short, long)]
        address: String,
    },

    /// Rebuild a tree data file from its leaves and check every proof
    Verify {
        /// Tree data file
        #[arg(short, long)]
        tree: PathBuf,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<RewardsConfig> {
    match path {
        Some(path) => RewardsConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            RewardsConfig::from_file(Path::new(DEFAULT_CONFIG)).context("failed to load rewards.toml")
        }
        None => {
            warn!("no configuration found, using defaults (empty token registry)");
            Ok(RewardsConfig::default())
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Generate {
            progress,
            season,
            out_dir,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let store = JsonProgressStore::load(&progress)
                .with_context(|| format!("failed to read progress export {}", progress.display()))?;
            let out_dir = out_dir.unwrap_or_else(|| config.output_dir.clone());

            let (snapshot, path) = generate_season(&store, &config.registry(), season, &out_dir)
                .with_context(|| format!("merkle tree generation for season {season} failed"))?;

            info!(path = %path.display(), "generation complete");
            println!("Season:  {}", snapshot.season_id);
            println!("Leaves:  {}", snapshot.leaves.len());
            println!("Users:   {}", snapshot.user_proofs.len());
            println!("Root:    {}", hash_to_hex(&snapshot.root));
            println!("Written: {}", path.display());
        }

        Commands::Proof { tree, address } => {
            let address: Address = address.parse().context("invalid claimant address")?;
            let snapshot = TreeSnapshot::load(&tree)
                .with_context(|| format!("failed to load {}", tree.display()))?;
            let claims = snapshot.claims_for(&address)?;

            println!("Root: {}", hash_to_hex(&snapshot.root));
            for claim in &claims {
                let leaf = claim.leaf_for(&address);
                let valid = verify_merkle_proof(&leaf, &claim.proof, &snapshot.root);
                println!();
                println!("season: {}", claim.season_id);
                println!("token:  {}", claim.token);
                println!("points: {}", claim.points);
                println!("leaf:   {}", hash_to_hex(&leaf));
                println!("valid:  {valid}");
                for sibling in &claim.proof {
                    println!("  {}", hash_to_hex(sibling));
                }
            }
        }

        Commands::Verify { tree } => {
            let snapshot = TreeSnapshot::load(&tree)
                .with_context(|| format!("failed to load {}", tree.display()))?;
            snapshot
                .verify()
                .with_context(|| format!("{} failed verification", tree.display()))?;
            println!(
                "OK: season {} root {} ({} leaves, {} users)",
                snapshot.season_id,
                hash_to_hex(&snapshot.root),
                snapshot.leaves.len(),
                snapshot.user_proofs.len()
            );
        }
    }

    Ok(())
}
