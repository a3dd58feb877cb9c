use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use ragsync::commands::{self, SourceFilter};
use ragsync::config::{Config, default_config_dir};

#[derive(Parser)]
#[command(
    name = "ragsync",
    version,
    about = "Incremental content sync into per-tenant vector indexes"
)]
struct Cli {
    /// Use an alternate configuration directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fully index one tenant's sources
    Init {
        /// Tenant to initialize
        #[arg(long)]
        tenant: String,

        /// Restrict the run to one source
        #[arg(long, value_enum, default_value_t = SourceArg::All)]
        source: SourceArg,

        /// API key authorizing the manual trigger
        #[arg(long)]
        api_key: String,
    },
    /// Incrementally update every tenant
    Update {
        /// Restrict the run to one source
        #[arg(long, value_enum, default_value_t = SourceArg::All)]
        source: SourceArg,

        /// Authorization value handed to the scheduler, `Bearer <secret>`
        #[arg(long)]
        cron_auth: String,
    },
    /// Show the effective configuration
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    All,
    Github,
    Notion,
}

impl From<SourceArg> for SourceFilter {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::All => Self::All,
            SourceArg::Github => Self::Github,
            SourceArg::Notion => Self::Notion,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => default_config_dir()?,
    };
    let config = Config::load(&config_dir)?;

    match cli.command {
        Commands::Init {
            tenant,
            source,
            api_key,
        } => {
            commands::init(&config, &tenant, source.into(), &api_key).await?;
        }
        Commands::Update { source, cron_auth } => {
            commands::update(&config, source.into(), &cron_auth).await?;
        }
        Commands::Config => {
            commands::show_config(&config);
        }
    }

    Ok(())
}
