//! custodial-tx: command-line front end for the signing pipeline.
//!
//! # Architecture Overview
//!
//! ```text
//!   partial actions ──▶ TransactionBuilder ──▶ RemoteSigner ──▶ Packer ──▶ Broadcaster ──▶ node
//!                           │      ▲                                            │
//!                           ▼      │                                            ▼
//!                        chain client (get_info, get_abi)               push_transaction
//!
//!   identity ──▶ AccountResolver ──▶ CredentialCache (hit)
//!                        │
//!                        ├──▶ RetryingLookup (get_accounts_by_authorizers, all read endpoints)
//!                        └──▶ AccountCreator (no account for key)
//! ```

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use custodial_tx::accounts::HttpAccountCreator;
use custodial_tx::cache::{CredentialCache, FileStore, KeyValueStore, MemoryStore};
use custodial_tx::chain::packer::unpack_transaction;
use custodial_tx::chain::{Action, ChainApi, ChainClient, PushResult};
use custodial_tx::config::{load_config, PipelineConfig};
use custodial_tx::observability::{logging, metrics};
use custodial_tx::signer::HttpSigner;
use custodial_tx::{Pipeline, SessionUser, SignOptions};

#[derive(Parser)]
#[command(name = "custodial-tx")]
#[command(about = "Build, custodially sign and broadcast Antelope transactions", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in through the signer bridge and resolve the account
    Login,
    /// Resolve the account name of an identity
    Resolve {
        /// Identity to resolve (defaults to the logged-in one)
        #[arg(long)]
        identity: Option<String>,
    },
    /// Sign a JSON list of actions and broadcast it
    Push {
        /// File holding a JSON array of actions
        #[arg(long)]
        actions: PathBuf,
        /// Return the signed transaction without submitting it
        #[arg(long)]
        no_broadcast: bool,
        /// Reason shown to the user by the signer
        #[arg(long)]
        reason: Option<String>,
    },
    /// Decode a packed transaction given as hex
    Unpack {
        #[arg(value_name = "HEX")]
        packed: String,
    },
    /// Forget the logged-in identity and every cached account
    Logout,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    logging::init_logging(&config.observability);

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    // Pure decoding needs no node, cache or signer
    if let Commands::Unpack { packed } = &cli.command {
        let bytes = hex::decode(packed.trim())?;
        let tx = unpack_transaction(&bytes)?;
        println!("{}", serde_json::to_string_pretty(&tx)?);
        return Ok(());
    }

    let pipeline = build_pipeline(config).await?;

    let outcome = match cli.command {
        Commands::Login => pipeline.login().await.map(Output::Session),
        Commands::Resolve { identity } => {
            let identity = identity.or_else(|| pipeline.logged_identity()).unwrap_or_default();
            pipeline.resolve_account(&identity).await.map(Output::Account)
        }
        Commands::Push {
            actions,
            no_broadcast,
            reason,
        } => {
            let content = std::fs::read_to_string(&actions)?;
            let actions: Vec<Action> = serde_json::from_str(&content)?;

            let options = SignOptions {
                broadcast: !no_broadcast,
                reason,
                ..SignOptions::default()
            };
            let cancel = options.cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            pipeline
                .sign_and_maybe_broadcast(actions, options)
                .await
                .map(Output::Pushed)
        }
        Commands::Logout => pipeline.logout().map(|()| Output::Done),
        Commands::Unpack { .. } => Ok(Output::Done),
    };

    match outcome {
        Ok(output) => print_output(&output)?,
        Err(e) => {
            tracing::debug!(kind = %e.kind(), error = %e, "Command failed");
            eprintln!("error [{}]: {}", e.kind(), e.user_message());
            std::process::exit(1);
        }
    }
    Ok(())
}

/// What a successful command prints.
enum Output {
    Session(SessionUser),
    Account(String),
    Pushed(PushResult),
    Done,
}

async fn build_pipeline(mut config: PipelineConfig) -> Result<Pipeline, Box<dyn std::error::Error>> {
    let client = ChainClient::connect(config.chain.clone()).await?;
    if config.chain.chain_id.is_empty() {
        let info = client.get_info().await?;
        tracing::info!(chain_id = %info.chain_id, "Using chain id reported by node");
        config.chain.chain_id = info.chain_id.0;
    }

    let store: Arc<dyn KeyValueStore> = if config.cache.path.is_empty() {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FileStore::open(&config.cache.path)?)
    };
    let cache = Arc::new(CredentialCache::open(store, &config.cache.key_prefix)?);
    let creator = Arc::new(HttpAccountCreator::new(&config.account_creation));
    let signer_config = config.signer.clone();

    let pipeline = Pipeline::new(config, Arc::new(client), cache, creator);
    if !signer_config.bridge_url.is_empty() {
        pipeline.establish_signer(Arc::new(HttpSigner::new(&signer_config)));
    }
    Ok(pipeline)
}

fn print_output(output: &Output) -> Result<(), Box<dyn std::error::Error>> {
    write_output(&mut std::io::stdout().lock(), output)
}

fn write_output(out: &mut impl Write, output: &Output) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Output::Session(user) => writeln!(out, "{}", serde_json::to_string_pretty(user)?)?,
        Output::Account(name) => writeln!(out, "{}", name)?,
        Output::Pushed(result) => writeln!(out, "{}", serde_json::to_string_pretty(result)?)?,
        Output::Done => {}
    }
    Ok(())
}
