mod cli;

use earsiv::{
    config,
    invoicing::InvoiceService,
    server::{self, auth},
    settings,
};
use earsiv_db::pool::{get_conn, init_pool, DbPool};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};

fn open_database(config: &config::Config) -> Result<DbPool> {
    let db_path = config.database.path.to_string_lossy().to_string();
    tracing::debug!("Opening database at {}", db_path);
    let pool = init_pool(&db_path)
        .with_context(|| format!("Failed to open database at {db_path}"))?;
    let conn = get_conn(&pool)?;
    settings::seed(&conn, &config.defaults)?;
    drop(conn);
    Ok(pool)
}

async fn serve(host: Option<String>, port: Option<u16>, config_path: Option<&std::path::Path>) -> Result<()> {
    let mut config = config::load(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting earsiv {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    server::start_server(config).await
}

async fn sync_once(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load(config_path)?;
    let pool = open_database(&config)?;
    let service = InvoiceService::new(pool, &config);

    let report = service.sync_orders().await?;
    println!("{}", report);
    Ok(())
}

fn print_settings(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load(config_path)?;
    let pool = open_database(&config)?;
    let conn = get_conn(&pool)?;
    let values = earsiv_db::queries::settings::all_settings(&conn)?;

    for (key, value) in settings::masked(&values) {
        println!("{key} = {value}");
    }
    Ok(())
}

fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "earsiv=trace,earsiv_db=debug,earsiv_common=debug,tower_http=debug".to_string()
        } else {
            "earsiv=info,earsiv_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(host, port, cli.config.as_deref()))
        }
        Commands::Sync => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(sync_once(cli.config.as_deref()))
        }
        Commands::Settings => print_settings(cli.config.as_deref()),
        Commands::Version => {
            println!("earsiv {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::HashPassword { password } => hash_password(&password),
        Commands::GenerateSecret => {
            println!("{}", auth::generate_secret());
            Ok(())
        }
    }
}

fn hash_password(password: &str) -> Result<()> {
    let hash = auth::hash_password(password)?;
    println!("{}", hash);
    Ok(())
}
