//! MDIP CLI - command-line wallet for the MDIP identity protocol.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mdip::{HttpGatekeeper, Keymaster, WalletStore};
use std::path::PathBuf;

/// MDIP command-line wallet
#[derive(Parser)]
#[command(name = "mdip")]
#[command(about = "MDIP - self-sovereign identity wallet", long_about = None)]
struct Cli {
    /// Path to wallet file (default: platform data dir)
    #[arg(short, long, global = true)]
    wallet: Option<PathBuf>,

    /// Gatekeeper URL
    #[arg(short, long, global = true, default_value = "http://localhost:4224")]
    gatekeeper: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the wallet
    Show,
    /// Create a new identity
    CreateId {
        /// Name for the new identity
        name: String,
        /// Registry to anchor to
        #[arg(short, long)]
        registry: Option<String>,
    },
    /// List identities
    List,
    /// Switch the current identity
    Use {
        /// Name of the identity
        name: String,
    },
    /// Remove an identity from the wallet
    RemoveId {
        /// Name of the identity
        name: String,
    },
    /// Rotate the current identity's key
    RotateKeys,
    /// Resolve a DID (or a wallet name) to its document
    ResolveDid {
        /// DID or name to resolve
        did: String,
    },
    /// Encrypt a message to a DID
    Encrypt {
        /// The message
        msg: String,
        /// Receiver DID or name
        did: String,
    },
    /// Decrypt an envelope DID
    Decrypt {
        /// The envelope DID
        did: String,
    },
    /// Anchor an encrypted wallet backup; prints the backup DID
    BackupWallet,
    /// Restore the wallet from a backup DID
    RecoverWallet {
        /// The backup DID
        did: String,
    },
    /// Replace the wallet with a fresh one
    NewWallet {
        /// Recreate from an existing mnemonic instead
        mnemonic: Option<String>,
    },
    /// Show the wallet's mnemonic phrase
    ShowMnemonic,
    /// Anchor an encrypted vault for the current identity
    BackupId,
    /// Recover an identity from its DID's vault
    RecoverId {
        /// The identity's DID
        did: String,
    },
}

fn wallet_path(cli_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_path {
        return Ok(path);
    }

    let proj_dirs = directories::ProjectDirs::from("org", "mdip", "mdip")
        .context("Could not determine data directory")?;

    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;

    Ok(data_dir.join("wallet.json"))
}

fn open(cli: &Cli) -> Result<Keymaster<HttpGatekeeper>> {
    let path = wallet_path(cli.wallet.clone())?;
    let gatekeeper = HttpGatekeeper::new(&cli.gatekeeper)?;
    Ok(Keymaster::new(WalletStore::new(path), gatekeeper)?)
}

fn cmd_show(keymaster: &Keymaster<HttpGatekeeper>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(keymaster.wallet())?);
    Ok(())
}

async fn cmd_create_id(
    keymaster: &mut Keymaster<HttpGatekeeper>,
    name: String,
    registry: Option<String>,
) -> Result<()> {
    let did = keymaster.create_id(&name, registry.as_deref()).await?;
    println!("{}", did);
    Ok(())
}

fn cmd_list(keymaster: &Keymaster<HttpGatekeeper>) -> Result<()> {
    for (name, current) in keymaster.list_ids() {
        if current {
            println!("{}  <<< current", name);
        } else {
            println!("{}", name);
        }
    }
    Ok(())
}

async fn cmd_resolve(keymaster: &Keymaster<HttpGatekeeper>, did: String) -> Result<()> {
    let doc = keymaster.resolve_did(&did).await?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

async fn cmd_encrypt(
    keymaster: &mut Keymaster<HttpGatekeeper>,
    msg: String,
    did: String,
) -> Result<()> {
    let envelope = keymaster.encrypt_message(&msg, &did).await?;
    println!("{}", envelope);
    Ok(())
}

async fn cmd_decrypt(keymaster: &Keymaster<HttpGatekeeper>, did: String) -> Result<()> {
    let plaintext = keymaster.decrypt_message(&did).await?;
    println!("{}", plaintext);
    Ok(())
}

async fn cmd_backup_wallet(keymaster: &mut Keymaster<HttpGatekeeper>) -> Result<()> {
    let did = keymaster.backup_wallet().await?;
    println!("{}", did);
    Ok(())
}

fn cmd_new_wallet(
    keymaster: &mut Keymaster<HttpGatekeeper>,
    mnemonic: Option<String>,
) -> Result<()> {
    let phrase = keymaster.new_wallet(mnemonic.as_deref())?;
    println!("{}", phrase);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut keymaster = open(&cli)?;

    match cli.command {
        Commands::Show => cmd_show(&keymaster),
        Commands::CreateId { name, registry } => {
            cmd_create_id(&mut keymaster, name, registry).await
        }
        Commands::List => cmd_list(&keymaster),
        Commands::Use { name } => {
            keymaster.use_id(&name)?;
            println!("OK");
            Ok(())
        }
        Commands::RemoveId { name } => {
            keymaster.remove_id(&name)?;
            println!("OK");
            Ok(())
        }
        Commands::RotateKeys => {
            keymaster.rotate_keys().await?;
            println!("OK");
            Ok(())
        }
        Commands::ResolveDid { did } => cmd_resolve(&keymaster, did).await,
        Commands::Encrypt { msg, did } => cmd_encrypt(&mut keymaster, msg, did).await,
        Commands::Decrypt { did } => cmd_decrypt(&keymaster, did).await,
        Commands::BackupWallet => cmd_backup_wallet(&mut keymaster).await,
        Commands::RecoverWallet { did } => {
            keymaster.recover_wallet(&did).await?;
            println!("OK");
            Ok(())
        }
        Commands::NewWallet { mnemonic } => cmd_new_wallet(&mut keymaster, mnemonic),
        Commands::ShowMnemonic => {
            println!("{}", keymaster.decrypt_mnemonic()?);
            Ok(())
        }
        Commands::BackupId => {
            let vault = keymaster.backup_id().await?;
            println!("{}", vault);
            Ok(())
        }
        Commands::RecoverId { did } => {
            let name = keymaster.recover_id(&did).await?;
            println!("Recovered {}", name);
            Ok(())
        }
    }
}
