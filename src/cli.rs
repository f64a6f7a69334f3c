use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "earsiv")]
#[command(author, version, about = "Etsy orders to Luca e-Arşiv invoices")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web back office and the background poller
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one sync cycle and print the result
    Sync,

    /// Print stored settings with credentials masked
    Settings,

    /// Display version information
    Version,

    /// Generate a bcrypt password hash for ADMIN_PASSWORD_HASH
    HashPassword {
        /// Password to hash
        password: String,
    },

    /// Generate a random secret for APP_SECRET
    GenerateSecret,
}
