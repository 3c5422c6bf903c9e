//! Config command - View and manage entaudit configuration
//!
//! Provides the `entaudit config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors
//! 4. Prints the configuration file path

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use entaudit_core::config::{Config, TrackingMode};
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "audit.tracking")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    /// Execute the config command
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(format, config_path).await,
            ConfigCommand::Set { key, value } => {
                self.execute_set(key, value, format, config_path).await
            }
            ConfigCommand::Validate => self.execute_validate(format, config_path).await,
            ConfigCommand::Path => self.execute_path(format, config_path).await,
        }
    }

    async fn execute_show(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let config = Config::load_or_default(config_path);

        info!(config_path = %config_path.display(), "Showing configuration");

        if matches!(format, OutputFormat::Json) {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    async fn execute_set(
        &self,
        key: &str,
        value: &str,
        format: OutputFormat,
        config_path: &Path,
    ) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let mut config = Config::load_or_default(config_path);

        info!(key = %key, value = %value, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if matches!(format, OutputFormat::Json) {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{}': {}", key, e));
                formatter.info("");
                formatter.info("Supported keys:");
                formatter.info("  audit.enabled                      - true|false");
                formatter.info("  audit.tracking                     - default|all|all_except");
                formatter.info("  audit.use_database_value_compare   - true|false");
                formatter.info("  logging.level                      - trace|debug|info|warn|error");
                formatter.info("  logging.json                       - true|false");
            }
            return Ok(());
        }

        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            if matches!(format, OutputFormat::Json) {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "errors": messages,
                }));
            } else {
                formatter.error(&format!(
                    "Invalid value for '{}': {}",
                    key,
                    messages.join("; ")
                ));
            }
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
        }
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        std::fs::write(config_path, yaml).context("Failed to write configuration file")?;

        if matches!(format, OutputFormat::Json) {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {} = {}", key, value));
            formatter.info(&format!("Saved to {}", config_path.display()));
        }

        Ok(())
    }

    async fn execute_validate(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));

        let config = match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                let message = if config_path.exists() {
                    format!("Failed to parse configuration: {}", e)
                } else {
                    "Configuration file not found. Using defaults.".to_string()
                };
                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [message],
                    }));
                } else if config_path.exists() {
                    formatter.error(&message);
                    formatter.info(&format!("File: {}", config_path.display()));
                } else {
                    formatter.info(&format!(
                        "Configuration file not found at {}",
                        config_path.display()
                    ));
                    formatter.info("Using default configuration. Run 'entaudit config set <key> <value>' to create one.");
                }
                return Ok(());
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");

        let errors = config.validate();

        if matches!(format, OutputFormat::Json) {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        Ok(())
    }

    async fn execute_path(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        if matches!(format, OutputFormat::Json) {
            formatter.print_json(&serde_json::json!({
                "config_path": config_path.display().to_string(),
                "exists": config_path.exists(),
            }));
        } else {
            println!("{}", config_path.display());
        }
        Ok(())
    }
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- audit ---
        "audit.enabled" => {
            config.audit.enabled = parse_bool(key, value)?;
        }
        "audit.tracking" => {
            config.audit.tracking = value
                .parse::<TrackingMode>()
                .map_err(|e| anyhow::anyhow!(e))?;
        }
        "audit.use_database_value_compare" => {
            config.audit.use_database_value_compare = parse_bool(key, value)?;
        }

        // --- logging ---
        "logging.level" => {
            config.logging.level = value.to_string();
        }
        "logging.json" => {
            config.logging.json = parse_bool(key, value)?;
        }

        _ => {
            anyhow::bail!("Unknown configuration key: '{}'", key);
        }
    }

    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse::<bool>()
        .with_context(|| format!("Expected true or false for {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_audit_enabled() {
        let mut config = Config::default();
        apply_config_value(&mut config, "audit.enabled", "false").unwrap();
        assert!(!config.audit.enabled);
    }

    #[test]
    fn test_apply_audit_tracking() {
        let mut config = Config::default();
        apply_config_value(&mut config, "audit.tracking", "all_except").unwrap();
        assert_eq!(config.audit.tracking, TrackingMode::AllExcept);
    }

    #[test]
    fn test_apply_invalid_tracking_fails() {
        let mut config = Config::default();
        let result = apply_config_value(&mut config, "audit.tracking", "sometimes");
        assert!(result.is_err());
        assert_eq!(config.audit.tracking, TrackingMode::Default);
    }

    #[test]
    fn test_apply_database_compare() {
        let mut config = Config::default();
        apply_config_value(&mut config, "audit.use_database_value_compare", "true").unwrap();
        assert!(config.audit.use_database_value_compare);
    }

    #[test]
    fn test_apply_logging() {
        let mut config = Config::default();
        apply_config_value(&mut config, "logging.level", "debug").unwrap();
        apply_config_value(&mut config, "logging.json", "true").unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_apply_invalid_bool_fails() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "audit.enabled", "yes").is_err());
    }

    #[test]
    fn test_apply_unknown_key_fails() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "sync.root", "/tmp").is_err());
    }

    #[tokio::test]
    async fn test_set_writes_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entaudit").join("config.yaml");

        ConfigCommand::Set {
            key: "audit.tracking".into(),
            value: "all".into(),
        }
        .execute(OutputFormat::Json, &path)
        .await
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.audit.tracking, TrackingMode::All);
    }

    #[tokio::test]
    async fn test_set_rejects_invalid_combination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "audit:\n  enabled: false\n  tracking: default\n  use_database_value_compare: false\n").unwrap();

        ConfigCommand::Set {
            key: "audit.use_database_value_compare".into(),
            value: "true".into(),
        }
        .execute(OutputFormat::Json, &path)
        .await
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.audit.use_database_value_compare);
    }
}
