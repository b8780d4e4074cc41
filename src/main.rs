use anyhow::Result;
use bit_vaults::areas::storage::LocalFs;
use bit_vaults::areas::vault_manager::VaultManager;
use bit_vaults::artifacts::protocol::ProtocolConfig;
use bit_vaults::config::Config;
use bit_vaults::transport::client::GitClient;
use bit_vaults::transport::local::LocalTransport;
use bit_vaults::transport::server::{AllowAll, GitServer};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bit-vaults",
    version,
    about = "Encrypted, versioned secret vaults",
    long_about = "Every vault is a git repository: each write becomes a commit, \
    any earlier version can be restored, and vaults can be cloned and pulled \
    over git's smart-HTTP protocol.",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

OPTIONS:
    {all-args}
",
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "BIT_VAULTS_ROOT",
        default_value = ".bit-vaults",
        help = "Directory holding the vaults"
    )]
    root: PathBuf,
    #[arg(long, global = true, help = "TOML configuration file")]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Log more (-v info, -vv debug)")]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(name = "create", about = "Create an empty vault")]
    Create {
        #[arg(index = 1)]
        name: String,
    },
    #[command(name = "list", about = "List vaults")]
    List,
    #[command(name = "rename", about = "Rename a vault")]
    Rename {
        #[arg(index = 1)]
        name: String,
        #[arg(index = 2)]
        new_name: String,
    },
    #[command(
        name = "destroy",
        about = "Delete a vault and all of its history",
        long_about = "This command stops the vault, erases its storage and removes it from the registry. \
        It cannot be undone."
    )]
    Destroy {
        #[arg(index = 1)]
        name: String,
    },
    #[command(name = "write", about = "Create or replace a secret")]
    Write {
        #[arg(index = 1)]
        vault: String,
        #[arg(index = 2)]
        secret: String,
        #[arg(index = 3)]
        value: String,
    },
    #[command(name = "cat", about = "Print a secret")]
    Cat {
        #[arg(index = 1)]
        vault: String,
        #[arg(index = 2)]
        secret: String,
    },
    #[command(name = "rm", about = "Delete a secret or a directory of secrets")]
    Rm {
        #[arg(index = 1)]
        vault: String,
        #[arg(index = 2)]
        secret: String,
    },
    #[command(name = "ls", about = "List the secrets of a vault")]
    Ls {
        #[arg(index = 1)]
        vault: String,
    },
    #[command(name = "log", about = "Show the history of a vault")]
    Log {
        #[arg(index = 1)]
        vault: String,
        #[arg(index = 2, help = "Reference to start from, HEAD by default")]
        reference: Option<String>,
        #[arg(short = 'n', long, help = "Show at most this many commits")]
        depth: Option<usize>,
        #[arg(long, help = "One line per commit")]
        oneline: bool,
    },
    #[command(
        name = "version",
        about = "Move a vault to an earlier or later commit",
        long_about = "This command replaces the vault's secrets with those of the given commit \
        and moves the branch to it. Commits after it are no longer part of the history."
    )]
    Version {
        #[arg(index = 1)]
        vault: String,
        #[arg(index = 2, help = "Commit id, HEAD or latest")]
        target: String,
    },
    #[command(name = "clone", about = "Clone a vault over the smart-HTTP protocol")]
    Clone {
        #[arg(index = 1)]
        source: String,
        #[arg(index = 2)]
        name: String,
    },
    #[command(name = "pull", about = "Update a cloned vault from its remote")]
    Pull {
        #[arg(index = 1)]
        vault: String,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn local_client(manager: &Arc<VaultManager>) -> GitClient {
    let protocol = ProtocolConfig::from_config(manager.config());
    let server = GitServer::new(manager.clone(), Arc::new(AllowAll), protocol.clone());

    GitClient::new(Arc::new(LocalTransport::new(server)), protocol, "local")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Arc::new(Config::load(cli.config.as_deref())?);
    tokio::fs::create_dir_all(&cli.root).await?;
    let manager = Arc::new(VaultManager::load(Arc::new(LocalFs::new(&cli.root)), config).await?);

    match cli.command {
        Commands::Create { name } => {
            let vault = manager.create_vault(&name).await?;
            println!("{name} {}", vault.id());
        }
        Commands::List => {
            for metadata in manager.list_vaults().await {
                match metadata.remote {
                    Some(remote) => println!("{} {} (from {remote})", metadata.name, metadata.id),
                    None => println!("{} {}", metadata.name, metadata.id),
                }
            }
        }
        Commands::Rename { name, new_name } => manager.rename_vault(&name, &new_name).await?,
        Commands::Destroy { name } => manager.destroy_vault(&name).await?,
        Commands::Write {
            vault,
            secret,
            value,
        } => {
            let vault = manager.open_vault(&vault).await?;
            let commit = vault
                .write(|tree| async move { tree.write_secret(&secret, value).await })
                .await?;
            match commit {
                Some(oid) => println!("{oid}"),
                None => println!("nothing changed"),
            }
        }
        Commands::Cat { vault, secret } => {
            let vault = manager.open_vault(&vault).await?;
            let content = vault
                .read(|view| async move { view.get_secret(&secret).await })
                .await?;
            println!("{}", String::from_utf8_lossy(&content));
        }
        Commands::Rm { vault, secret } => {
            let vault = manager.open_vault(&vault).await?;
            if let Some(oid) = vault
                .write(|tree| async move { tree.delete_secret(&secret).await })
                .await?
            {
                println!("{oid}");
            }
        }
        Commands::Ls { vault } => {
            let vault = manager.open_vault(&vault).await?;
            let secrets = vault
                .read(|view| async move { view.list_secrets().await })
                .await?;
            for secret in secrets {
                println!("{secret}");
            }
        }
        Commands::Log {
            vault,
            reference,
            depth,
            oneline,
        } => {
            let vault = manager.open_vault(&vault).await?;
            let entries = vault.log(reference.as_deref(), depth).await?;
            for (index, entry) in entries.iter().enumerate() {
                if oneline {
                    println!("{}", entry.display_oneline());
                } else {
                    if index > 0 {
                        println!();
                    }
                    println!("{}", entry.display_medium());
                }
            }
            if let Some((oid, reason)) = &entries.error {
                eprintln!("history stops at unreadable commit {oid}: {reason}");
            }
        }
        Commands::Version { vault, target } => {
            let vault = manager.open_vault(&vault).await?;
            let oid = vault.version(&target).await?;
            println!("{oid}");
        }
        Commands::Clone { source, name } => {
            let client = local_client(&manager);
            let vault = manager.clone_vault(&client, &source, &name).await?;
            println!("{name} {}", vault.id());
        }
        Commands::Pull { vault } => {
            let client = local_client(&manager);
            match manager.pull_vault(&client, &vault).await? {
                Some(oid) => println!("{oid}"),
                None => println!("already up to date"),
            }
        }
    }

    Ok(())
}
