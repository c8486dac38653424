//! Command execution.

use crate::Commands;
use colored::Colorize;
use rsa::RsaPublicKey;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use votifier_client::{ClientConfig, VoteClient};
use votifier_protocol::Vote;
use votifier_server::{KeyPair, KeyStore};

type CommandResult = Result<String, Box<dyn std::error::Error>>;

/// Executes a command and returns the formatted output.
pub async fn execute(cmd: Commands) -> CommandResult {
    match cmd {
        Commands::Keygen { dir, bits, force } => keygen(&dir, bits, force),

        Commands::PublicKey { dir } => {
            let pair = KeyStore::new(dir).load()?;
            format_public_key(&pair)
        }

        Commands::Send {
            server,
            public_key,
            service,
            username,
            address,
            timestamp,
        } => {
            let public_key = parse_key_arg(&public_key)?;
            let timestamp = timestamp.unwrap_or_else(unix_now);
            let vote = Vote::new(service, username, address, timestamp);

            let client = VoteClient::new(ClientConfig::new(server), public_key);
            let receipt = client.send(&vote).await?;
            Ok(format!(
                "{} {} to {} (server version {})",
                "Sent".green(),
                vote,
                server.to_string().cyan(),
                receipt.server_version
            ))
        }
    }
}

fn keygen(dir: &Path, bits: usize, force: bool) -> CommandResult {
    let store = KeyStore::new(dir);
    if !force
        && (store.public_key_path().exists() || store.private_key_path().exists())
    {
        return Err(format!(
            "key files already exist in {} (use --force to replace them)",
            dir.display()
        )
        .into());
    }

    let pair = KeyPair::generate(bits)?;
    store.persist(&pair)?;

    Ok(format!(
        "{} {}-bit key pair in {}\n{}",
        "Generated".green(),
        pair.bits(),
        dir.display().to_string().cyan(),
        format_public_key(&pair)?
    ))
}

fn format_public_key(pair: &KeyPair) -> CommandResult {
    Ok(format!(
        "{}\n{}\n{} {}",
        "Public key:".bold(),
        pair.public_key_base64()?,
        "Fingerprint (SHA-256):".bold(),
        pair.fingerprint()?
    ))
}

/// Parses a public key argument (either inline base64 or @public.key).
fn parse_key_arg(arg: &str) -> Result<RsaPublicKey, Box<dyn std::error::Error>> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => arg.to_string(),
    };
    Ok(votifier_protocol::key::decode_public_key(&text)?)
}

fn unix_now() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}
