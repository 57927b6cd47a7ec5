//! Kept in its own test binary: it changes the working directory and the
//! process environment.

use hostroute_core::ConfigManager;
use secrecy::ExposeSecret;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_from_reads_dotenv_in_working_directory() {
    let preset_key = std::env::var("API_KEY").ok();
    let preset_top_k = std::env::var("HOSTROUTE_TOP_K").ok();

    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(".env"),
        "API_KEY=from-dotenv\nHOSTROUTE_TOP_K=7\n",
    )
    .unwrap();
    let config_path = temp_dir.path().join("hostroute.toml");
    fs::write(&config_path, "[registry]\nbase_url = \"http://registry.local\"\n").unwrap();

    std::env::set_current_dir(temp_dir.path()).unwrap();
    let config = ConfigManager::load_from(&config_path).unwrap().into_config();

    let api_key = config.registry.api_key.as_ref().map(|k| k.expose_secret().to_string());
    assert!(api_key.is_some());
    if preset_key.is_none() {
        assert_eq!(api_key.as_deref(), Some("from-dotenv"));
    }
    if preset_top_k.is_none() {
        assert_eq!(config.dispatch.default_top_k, 7);
    }
}
