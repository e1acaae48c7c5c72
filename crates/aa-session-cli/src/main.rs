//! AA Session CLI
//!
//! Command-line tool for inspecting smart account session configuration
//! and derived addresses.

use aa_session_core::{
    account::{counterfactual_address, VariantParams},
    AccountVariant, ChainId, StackConfig,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "aa-session")]
#[command(about = "Smart Account Session CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the counterfactual address for an owner and variant
    Derive {
        /// Owner EOA address
        #[arg(short, long)]
        owner: String,

        /// Account variant (light, kernel, safe)
        #[arg(short, long, default_value = "safe")]
        variant: String,

        /// Target chain id
        #[arg(short, long, default_value_t = 84532)]
        chain: u64,
    },

    /// List supported account variants and their entry-point pairing
    Variants,

    /// Resolve and validate the environment configuration
    Config,
}

fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Derive {
            owner,
            variant,
            chain,
        } => derive(&owner, &variant, chain)?,
        Commands::Variants => list_variants(),
        Commands::Config => show_config()?,
    }

    Ok(())
}

fn derive(owner: &str, variant: &str, chain: u64) -> Result<()> {
    let variant: AccountVariant = variant.parse()?;
    let params = VariantParams::for_variant(variant);
    let entry_point = variant.entry_point_version();
    let address = counterfactual_address(owner, &params, entry_point)?;

    println!("Owner:        {}", owner);
    println!("Variant:      {}", variant);
    println!("EntryPoint:   {} ({})", entry_point, entry_point.address());
    println!("Chain:        {}", ChainId(chain));
    println!("Address:      {}", address);

    Ok(())
}

fn list_variants() {
    println!("Supported smart account variants:");
    for variant in AccountVariant::all() {
        println!(
            "  {:<8} EntryPoint {} ({})",
            variant.as_str(),
            variant.entry_point_version(),
            VariantParams::for_variant(variant).factory(),
        );
    }
}

fn show_config() -> Result<()> {
    let config = StackConfig::from_env()?;
    let context = config.chain_context()?;

    println!("Chain:        {}", context.chain_id);
    println!("EntryPoint:   {}", context.entry_point);
    println!("Variant:      {}", config.variant);
    println!("Bundler:      {}", config.bundler_url);
    println!("Paymaster:    {}", config.paymaster_url);
    println!("RPC:          {}", context.rpc_urls.join(", "));
    if let Some(explorer) = &context.explorer_url {
        println!("Explorer:     {}", explorer);
    }

    // Validate that the clients can be constructed from this config
    config.paymaster()?;
    config.bundler()?;
    config.rpc()?;
    println!("Configuration OK");

    Ok(())
}
