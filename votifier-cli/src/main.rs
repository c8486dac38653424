//! votifier-cli - Command-line interface for votifier
//!
//! Manages receiver key pairs and sends test votes.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "votifier-cli")]
#[command(about = "Key management and test client for the votifier vote receiver")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Generate and save a new RSA key pair
    Keygen {
        /// Key directory
        #[arg(short, long, env = "VOTIFIER_KEY_DIR", default_value = "./votifier/rsa")]
        dir: PathBuf,

        /// Modulus size in bits
        #[arg(short, long, default_value_t = votifier_protocol::DEFAULT_KEY_BITS)]
        bits: usize,

        /// Overwrite an existing key pair
        #[arg(long)]
        force: bool,
    },

    /// Print the public key to give to vote listing sites
    PublicKey {
        /// Key directory
        #[arg(short, long, env = "VOTIFIER_KEY_DIR", default_value = "./votifier/rsa")]
        dir: PathBuf,
    },

    /// Send one vote to a receiver
    Send {
        /// Receiver address
        #[arg(short, long, default_value = "127.0.0.1:8192")]
        server: SocketAddr,

        /// Receiver public key (base64, or @public.key to read from file)
        #[arg(short = 'k', long)]
        public_key: String,

        /// Name of the voting service
        #[arg(long, default_value = "votifier-cli")]
        service: String,

        /// Username that voted
        #[arg(short, long)]
        username: String,

        /// Address of the voter
        #[arg(short, long, default_value = "127.0.0.1")]
        address: String,

        /// Vote timestamp (defaults to the current Unix time)
        #[arg(short, long)]
        timestamp: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match commands::execute(cli.command).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
