#![allow(dead_code)]

use assert_cmd::Command;
use bit_vaults::areas::storage::{FileSystem, MemoryFs};
use bit_vaults::areas::vault::Vault;
use bit_vaults::areas::vault_manager::VaultManager;
use bit_vaults::artifacts::protocol::ProtocolConfig;
use bit_vaults::config::Config;
use bit_vaults::transport::client::GitClient;
use bit_vaults::transport::local::LocalTransport;
use bit_vaults::transport::server::{AccessControl, AllowAll, GitServer};
use std::path::Path;
use std::sync::Arc;

pub fn config() -> Arc<Config> {
    Arc::new(Config {
        author_name: "Test Author".to_string(),
        author_email: "author@example.com".to_string(),
        ..Config::default()
    })
}

pub async fn new_manager() -> Arc<VaultManager> {
    let fs: Arc<dyn FileSystem> = Arc::new(MemoryFs::new());
    Arc::new(
        VaultManager::load(fs, config())
            .await
            .expect("Failed to load vault manager"),
    )
}

pub fn server(manager: &Arc<VaultManager>, access: Arc<dyn AccessControl>) -> GitServer {
    GitServer::new(
        manager.clone(),
        access,
        ProtocolConfig::from_config(manager.config()),
    )
}

pub fn client(manager: &Arc<VaultManager>) -> GitClient {
    GitClient::new(
        Arc::new(LocalTransport::new(server(manager, Arc::new(AllowAll)))),
        ProtocolConfig::from_config(manager.config()),
        "tester",
    )
}

/// Write `(path, content)` pairs in a single commit
pub async fn write_secrets(vault: &Vault, secrets: &[(&str, &str)]) {
    let secrets = secrets
        .iter()
        .map(|(path, content)| (path.to_string(), content.to_string()))
        .collect::<Vec<_>>();

    vault
        .write(|tree| async move {
            for (path, content) in secrets {
                tree.write_secret(&path, content).await?;
            }
            Ok(())
        })
        .await
        .expect("Failed to write secrets");
}

pub async fn list_secrets(vault: &Vault) -> Vec<String> {
    vault
        .read(|view| async move { view.list_secrets().await })
        .await
        .expect("Failed to list secrets")
}

pub fn run_cli(root: &Path, args: &[&str]) -> Command {
    let mut command = Command::cargo_bin("bit-vaults").expect("Failed to find binary");
    command
        .env("BIT_VAULTS_ROOT", root)
        .env("GIT_AUTHOR_NAME", "Test Author")
        .env("GIT_AUTHOR_EMAIL", "author@example.com")
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .args(args);
    command
}
