mod runs;
mod sync;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "catsync-cli")]
#[command(about = "Catalog sync command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a catalog sync in the foreground and print its summary.
    Sync {
        /// Sync a single storefront (by slug) instead of all enabled ones.
        #[arg(long)]
        storefront: Option<String>,
        /// Fetch at most this many offers per storefront.
        #[arg(long)]
        max_offers: Option<usize>,
    },
    /// List recent sync runs.
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = std::sync::Arc::new(catsync_core::load_app_config_from_env()?);
    let pool_config = catsync_db::PoolConfig::from_app_config(&config);
    let pool = catsync_db::connect_pool(&config.database_url, pool_config).await?;
    catsync_db::run_migrations(&pool).await?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Sync {
            storefront,
            max_offers,
        } => sync::run(pool, config, storefront, max_offers).await,
        Commands::Runs { limit } => runs::list(&pool, limit).await,
    }
}
