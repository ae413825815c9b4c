mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Environment variable that overrides `[tmdb].api_key`.
pub const API_KEY_ENV: &str = "TMDB_API_KEY";

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./cinesync.toml", "~/.config/cinesync/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    let mut config = Config::default();
    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            config.tmdb.api_key = key.trim().to_string();
        }
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let sync = &config.sync;

    if sync.page_size == 0 {
        anyhow::bail!("sync.page_size cannot be 0");
    }

    if sync.max_concurrent_details == 0 {
        anyhow::bail!("sync.max_concurrent_details cannot be 0");
    }

    if sync.batch_pages == 0 {
        anyhow::bail!("sync.batch_pages cannot be 0");
    }

    if config.tmdb.requests_per_second == 0 {
        anyhow::bail!("tmdb.requests_per_second cannot be 0");
    }

    if config.tmdb.timeout_secs == 0 {
        tracing::warn!("tmdb.timeout_secs is 0, every request will time out immediately");
    }

    if sync.reveal_threshold > sync.target_count {
        tracing::warn!(
            reveal_threshold = sync.reveal_threshold,
            target_count = sync.target_count,
            "Reveal threshold is above the target count, the staged reveal will never fire"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_defaults_from_empty_file() {
        std::env::remove_var(API_KEY_ENV);
        let file = write_config("");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.tmdb.language, "en-US");
        assert_eq!(config.tmdb.timeout_secs, 10);
        assert_eq!(config.sync.page_size, 20);
        assert_eq!(config.sync.target_count, 700);
        assert_eq!(config.sync.max_concurrent_details, 25);
        assert_eq!(config.sync.browse_pages, 100);
        assert_eq!(config.sync.search_pages, 50);
        assert!(config.sync.autoload);
        assert_eq!(config.database.path, std::path::PathBuf::from("cinesync.db"));
    }

    #[test]
    #[serial]
    fn test_partial_sections() {
        std::env::remove_var(API_KEY_ENV);
        let file = write_config(
            r#"
[tmdb]
api_key = "abc123"

[sync]
target_count = 200
autoload = false
"#,
        );
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.tmdb.api_key, "abc123");
        assert_eq!(config.tmdb.requests_per_second, 40);
        assert_eq!(config.sync.target_count, 200);
        assert!(!config.sync.autoload);
        assert_eq!(config.sync.stagger_ms, 150);
    }

    #[test]
    #[serial]
    fn test_env_overrides_api_key() {
        std::env::set_var(API_KEY_ENV, "from-env");
        let file = write_config("[tmdb]\napi_key = \"from-file\"\n");
        let config = load_config(file.path()).unwrap();
        std::env::remove_var(API_KEY_ENV);

        assert_eq!(config.tmdb.api_key, "from-env");
    }

    #[test]
    #[serial]
    fn test_rejects_zero_page_size() {
        let file = write_config("[sync]\npage_size = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    #[serial]
    fn test_rejects_zero_concurrency() {
        let file = write_config("[sync]\nmax_concurrent_details = 0\n");
        assert!(load_config(file.path()).is_err());

        let file = write_config("[sync]\nbatch_pages = 0\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let file = write_config("[sync\npage_size = ");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/cinesync.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
