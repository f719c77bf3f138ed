//! Operator CLI for a ledger database.
//!
//! Opens a session from a connection and a session config, then fetches
//! headers, paths and receipts, or verifies transaction and data proofs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sdk::ledger_types::{hash_to_hex, BlockHeader, TxEnvelope};
use sdk::{ConnectionConfig, Ledger, Session, SessionConfig};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "ledgerctl")]
#[command(about = "Query a ledger database and verify its proofs")]
struct Cli {
    /// Connection config (replicas, trusted nodes, proof scheme)
    #[arg(long, env = "LEDGER_CONNECTION", default_value = "connection.json")]
    connection: PathBuf,

    /// Session config (user id, signing key, timeouts)
    #[arg(long, env = "LEDGER_SESSION", default_value = "session.json")]
    session: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a block header
    Header {
        #[arg(long)]
        block: u64,
    },
    /// Print the latest block header
    LastHeader,
    /// Fetch and verify the skip-list path between two blocks
    Path {
        #[arg(long)]
        start: u64,
        #[arg(long)]
        end: u64,
    },
    /// Print the receipt of a transaction
    Receipt {
        #[arg(long)]
        tx_id: String,
    },
    /// Prove a committed transaction against a trusted block header
    VerifyTx {
        #[arg(long)]
        tx_id: String,
        /// JSON file with the submitted envelope
        #[arg(long)]
        envelope: PathBuf,
        /// JSON file with a block header already trusted
        #[arg(long)]
        anchor: PathBuf,
    },
    /// Prove the value of a key as of a block
    DataProof {
        #[arg(long)]
        block: u64,
        #[arg(long)]
        db: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
        /// Prove the key was deleted
        #[arg(long)]
        deleted: bool,
        /// JSON file with the trusted header of `block`; fetched when absent
        #[arg(long)]
        header: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let connection = ConnectionConfig::load(&cli.connection)
        .with_context(|| format!("loading {}", cli.connection.display()))?;
    let config = SessionConfig::load(&cli.session)
        .with_context(|| format!("loading {}", cli.session.display()))?;
    let session = Session::connect(&connection, &config)?;
    let ledger = session.ledger();

    match cli.command {
        Commands::Header { block } => {
            print_json(&ledger.block_header(block).await?)?;
        }
        Commands::LastHeader => {
            print_json(&ledger.last_block_header().await?)?;
        }
        Commands::Path { start, end } => {
            verify_path(&session, &ledger, start, end).await?;
        }
        Commands::Receipt { tx_id } => {
            print_json(&ledger.tx_receipt(&tx_id).await?)?;
        }
        Commands::VerifyTx {
            tx_id,
            envelope,
            anchor,
        } => {
            verify_tx(&ledger, &tx_id, &envelope, &anchor).await?;
        }
        Commands::DataProof {
            block,
            db,
            key,
            value,
            deleted,
            header,
        } => {
            let header = match header {
                Some(path) => {
                    let header: BlockHeader = read_json(&path)?;
                    if header.number() != block {
                        anyhow::bail!("header file holds block {}, not {}", header.number(), block);
                    }
                    header
                }
                None => {
                    warn!("No trusted header given, using block {} as served", block);
                    ledger.block_header(block).await?
                }
            };

            let valid = ledger
                .verify_value(&header, &db, &key, value.as_bytes(), deleted)
                .await?;
            report(valid, &format!("{db}/{key} as of block {block}"));
        }
    }

    Ok(())
}

async fn verify_path(session: &Session, ledger: &Ledger, start: u64, end: u64) -> Result<()> {
    let path = ledger.ledger_path(start, end).await?;
    let scheme = session.scheme();

    println!("Path from block {} to block {}:", end, start);
    for header in &path.headers {
        println!("  {:>8}  {}", header.number(), hash_to_hex(&header.hash(&scheme)?));
    }
    report(path.verify(&scheme)?, &format!("path {start}..={end}"));
    Ok(())
}

async fn verify_tx(ledger: &Ledger, tx_id: &str, envelope: &Path, anchor: &Path) -> Result<()> {
    let envelope: TxEnvelope = read_json(envelope)?;
    let anchor: BlockHeader = read_json(anchor)?;
    if envelope.tx_id() != tx_id {
        anyhow::bail!("envelope is for transaction {}, not {}", envelope.tx_id(), tx_id);
    }

    let receipt = ledger.tx_receipt(tx_id).await?;
    info!(
        "Transaction {} is at index {} of block {}",
        tx_id,
        receipt.tx_index,
        receipt.block_number()
    );

    let proof = ledger
        .full_tx_proof_and_verify(&receipt, &anchor, &envelope)
        .await?;

    println!("Block: {}", receipt.block_number());
    println!("Index: {}", receipt.tx_index);
    println!("Merkle path length: {}", proof.tx_proof.intermediate_hashes.len());
    if let Some(path) = &proof.path_to_genesis {
        println!("Genesis path length: {}", path.len());
    }
    if let Some(path) = &proof.path_from_anchor {
        println!("Anchor path length: {}", path.len());
    }
    report(proof.verified, &format!("transaction {tx_id}"));
    Ok(())
}

fn report(valid: bool, subject: &str) {
    if valid {
        println!("\n{subject}: VERIFIED");
    } else {
        println!("\n{subject}: FAILED");
        std::process::exit(1);
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
