//! Configuration management for the ledger

use std::fs;
use std::path::Path;

use log::info;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "POW_LEDGER_CONFIG";

/// Config file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "ledger.toml";

/// A SHA-256 digest has 64 hex digits
pub const MAX_DIFFICULTY: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Mining parameters for a single chain instance
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChainConfig {
    /// Leading zero hex digits required in a sealed block's hash
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,

    /// Reserved sender identity of reward transactions
    #[serde(default = "default_reward_sender")]
    pub reward_sender: String,

    #[serde(default = "default_reward_amount")]
    pub reward_amount: f32,

    /// Upper bound on nonces tried per round; unbounded when absent
    #[serde(default)]
    pub max_iterations: Option<u64>,

    /// Threads used for the nonce search
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            reward_sender: default_reward_sender(),
            reward_amount: default_reward_amount(),
            max_iterations: None,
            workers: default_workers(),
        }
    }
}

impl ChainConfig {
    /// Parses and validates a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: ChainConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Loads the config from `$POW_LEDGER_CONFIG`, then `ledger.toml`,
    /// falling back to defaults when neither is present
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            info!("Loading config from {}", path);
            return Self::from_file(path);
        }

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            info!("Loading config from {}", DEFAULT_CONFIG_FILE);
            return Self::from_file(DEFAULT_CONFIG_FILE);
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Rejects values the miner cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::Invalid(format!(
                "difficulty must be at most {}, got {}",
                MAX_DIFFICULTY, self.difficulty
            )));
        }

        if self.reward_sender.is_empty() {
            return Err(ConfigError::Invalid(
                "reward_sender must not be empty".to_string(),
            ));
        }

        if !self.reward_amount.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "reward_amount must be finite, got {}",
                self.reward_amount
            )));
        }

        if self.workers == 0 {
            return Err(ConfigError::Invalid(
                "workers must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_difficulty() -> usize {
    3
}

fn default_reward_sender() -> String {
    "THE BLOCKCHAIN".to_string()
}

fn default_reward_amount() -> f32 {
    1.0
}

fn default_workers() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use parking_lot::Mutex;

    // Serializes tests that touch the process environment or working directory
    static ENV_LOCK: Mutex<()> = parking_lot::const_mutex(());

    #[test]
    fn test_defaults() {
        let config = ChainConfig::default();

        assert_eq!(config.difficulty, 3);
        assert_eq!(config.reward_sender, "THE BLOCKCHAIN");
        assert_eq!(config.reward_amount, 1.0);
        assert_eq!(config.max_iterations, None);
        assert_eq!(config.workers, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ChainConfig::from_toml_str("difficulty = 2\nworkers = 4\n").unwrap();

        assert_eq!(config.difficulty, 2);
        assert_eq!(config.workers, 4);
        assert_eq!(config.reward_sender, "THE BLOCKCHAIN");
        assert_eq!(config.reward_amount, 1.0);
    }

    #[test]
    fn test_full_toml() {
        let source = r#"
            difficulty = 1
            reward_sender = "MINT"
            reward_amount = 12.5
            max_iterations = 1000
            workers = 2
        "#;

        let config = ChainConfig::from_toml_str(source).unwrap();
        assert_eq!(
            config,
            ChainConfig {
                difficulty: 1,
                reward_sender: "MINT".to_string(),
                reward_amount: 12.5,
                max_iterations: Some(1000),
                workers: 2,
            }
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            ChainConfig::from_toml_str("difficulty = 65"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ChainConfig::from_toml_str("workers = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ChainConfig::from_toml_str("reward_sender = \"\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ChainConfig::from_toml_str("difficulty = \"high\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "difficulty = 2").unwrap();
        writeln!(file, "reward_amount = 3.0").unwrap();

        let config = ChainConfig::from_file(file.path()).unwrap();
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.reward_amount, 3.0);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();

        let result = ChainConfig::from_file(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_fallback_order() {
        let _env = ENV_LOCK.lock();
        let original_dir = std::env::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        std::env::remove_var(CONFIG_ENV_VAR);

        // Nothing on disk, nothing in the environment
        assert_eq!(ChainConfig::load().unwrap(), ChainConfig::default());

        // ledger.toml in the working directory
        fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "difficulty = 2\n").unwrap();
        assert_eq!(ChainConfig::load().unwrap().difficulty, 2);

        // The environment variable wins over ledger.toml
        let explicit = dir.path().join("explicit.toml");
        fs::write(&explicit, "difficulty = 1\nworkers = 2\n").unwrap();
        std::env::set_var(CONFIG_ENV_VAR, &explicit);
        let config = ChainConfig::load().unwrap();
        assert_eq!(config.difficulty, 1);
        assert_eq!(config.workers, 2);

        // A named file that is missing is an error, not a silent fallback
        std::env::set_var(CONFIG_ENV_VAR, dir.path().join("missing.toml"));
        let missing = ChainConfig::load();

        std::env::remove_var(CONFIG_ENV_VAR);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
