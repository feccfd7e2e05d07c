mod config;
mod serve_cmd;
#[cfg(test)]
mod test_util;

use clap::{Parser, Subcommand};

use wayfarer_db::pool;

use config::{CliOverrides, WayfarerConfig};

#[derive(Parser)]
#[command(name = "wayfarer", about = "Travel plan lifecycle service")]
struct Cli {
    /// Database URL (overrides WAYFARER_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a wayfarer config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/wayfarer")]
        db_url: String,
        /// Plan generator to use: "mock" or "openrouter"
        #[arg(long, default_value = "mock")]
        provider: config::AiProvider,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the wayfarer database and apply migrations
    DbInit,
    /// Serve the plan HTTP API
    Serve {
        /// Address to bind (overrides WAYFARER_BIND)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides WAYFARER_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
}

/// Execute the `wayfarer init` command: write the config file.
fn cmd_init(db_url: &str, provider: config::AiProvider, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        ai: config::AiSection {
            provider: Some(provider),
            ..Default::default()
        },
        plans: config::PlansSection::default(),
        server: config::ServerSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  ai.provider = {provider:?}");
    if provider == config::AiProvider::OpenRouter {
        println!();
        println!(
            "Set ai.api_key in the config file or export {} before serving.",
            config::AI_API_KEY_ENV
        );
    }
    println!();
    println!("Next: run `wayfarer db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `wayfarer db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = WayfarerConfig::resolve(CliOverrides {
        database_url: cli_db_url,
        ..Default::default()
    })?;

    println!("Initializing wayfarer database...");

    let db_name = resolved.db_config.database_name().unwrap_or("?").to_string();
    if pool::ensure_database_exists(&resolved.db_config).await? {
        println!("Created database {db_name}.");
    } else {
        println!("Database {db_name} already exists.");
    }
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let summary = pool::schema_summary(&db_pool).await?;
    println!("Database ready.");
    println!("  notes: {}", summary.notes);
    println!("  user profiles: {}", summary.profiles);
    println!("  plans: {}", summary.total_plans());
    for (status, count) in &summary.plans {
        println!("    {status}: {count}");
    }

    db_pool.close().await;

    println!("wayfarer db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            provider,
            force,
        } => cmd_init(&db_url, provider, force)?,
        Commands::DbInit => cmd_db_init(cli.database_url.as_deref()).await?,
        Commands::Serve { bind, port } => {
            let resolved = WayfarerConfig::resolve(CliOverrides {
                database_url: cli.database_url.as_deref(),
                bind: bind.as_deref(),
                port,
            })?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            pool::run_migrations(&db_pool).await?;
            serve_cmd::run_serve(db_pool, &resolved).await?;
        }
    }

    Ok(())
}
