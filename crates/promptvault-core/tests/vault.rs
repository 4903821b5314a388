use promptvault_core::config::{read_config, write_config, KeyfileMode};
use promptvault_core::logging;
use promptvault_core::{
    BlockContent, OrphanPolicy, Prompt, PromptRepository, Vault, VaultConfig,
};
use tempfile::tempdir;

#[tokio::test]
async fn test_configured_vault_persists_prompts_across_restart() {
    let dir = tempdir().expect("tempdir should succeed");
    let config_path = dir.path().join("config").join("config.toml");
    let mut config = VaultConfig::ephemeral()
        .with_keyfile(dir.path().join("keys"), KeyfileMode::Plain)
        .with_orphan_policy(OrphanPolicy::SoftDelete);
    config.store.path = dir
        .path()
        .join("data")
        .join("prompts.db")
        .to_string_lossy()
        .to_string();
    write_config(&config_path, &config).expect("write config should succeed");

    let prompt = Prompt::new("Release notes")
        .with_block_appended(BlockContent::Heading("Changes".to_string()))
        .with_block_appended(BlockContent::Variable("version".to_string()));
    {
        let loaded = read_config(&config_path).expect("read config should succeed");
        assert_eq!(loaded, config);
        // Another test in this binary may have installed the subscriber first.
        let _ = logging::init_from_config(&loaded.logging);
        let vault = Vault::open(&loaded, None).expect("vault should open");
        assert_eq!(vault.repository().orphan_policy(), OrphanPolicy::SoftDelete);
        vault
            .repository()
            .save_prompt(prompt.clone())
            .await
            .expect("save should succeed");
        vault.check_integrity().expect("integrity should hold");
    }

    let loaded = read_config(&config_path).expect("read config should succeed");
    let vault = Vault::open(&loaded, None).expect("vault should reopen");
    let fetched = vault
        .repository()
        .fetch_prompt(prompt.id())
        .await
        .expect("fetch should succeed")
        .expect("prompt should exist");
    assert_eq!(fetched, prompt);
    assert!(dir.path().join("keys").read_dir().unwrap().count() >= 1);
}

#[tokio::test]
async fn test_ephemeral_vaults_do_not_share_state() {
    let first = Vault::open(&VaultConfig::ephemeral(), None).expect("vault should open");
    let second = Vault::open(&VaultConfig::ephemeral(), None).expect("vault should open");
    let prompt = Prompt::new("Scratch");
    first.repository().save_prompt(prompt.clone()).await.unwrap();

    assert!(first.repository().fetch_prompt(prompt.id()).await.unwrap().is_some());
    assert!(second.repository().fetch_prompt(prompt.id()).await.unwrap().is_none());
}
