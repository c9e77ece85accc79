//! Configuration validation.

use super::Config;
use crate::error::{Result, SyncError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(SyncError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(SyncError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(SyncError::Config("source.user is required".into()));
    }
    if config.source.r#type != "mysql" {
        return Err(SyncError::Config(format!(
            "source.type must be 'mysql', got '{}'",
            config.source.r#type
        )));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(SyncError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(SyncError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(SyncError::Config("target.user is required".into()));
    }
    if config.target.r#type != "postgres" {
        return Err(SyncError::Config(format!(
            "target.type must be 'postgres', got '{}'",
            config.target.r#type
        )));
    }
    if config.target.schema.is_empty() {
        return Err(SyncError::Config("target.schema is required".into()));
    }

    // Sync validation
    if config.sync.chunk_size == 0 {
        return Err(SyncError::Config(
            "sync.chunk_size must be at least 1".into(),
        ));
    }
    if config.sync.sub_chunk_size == 0 {
        return Err(SyncError::Config(
            "sync.sub_chunk_size must be at least 1".into(),
        ));
    }
    if config.sync.sub_chunk_size > config.sync.chunk_size {
        return Err(SyncError::Config(
            "sync.sub_chunk_size cannot exceed sync.chunk_size".into(),
        ));
    }
    if !(0.0..1.0).contains(&config.sync.count_tolerance) {
        return Err(SyncError::Config(
            "sync.count_tolerance must be in [0.0, 1.0)".into(),
        ));
    }
    if config.sync.small_table_threshold < 0 {
        return Err(SyncError::Config(
            "sync.small_table_threshold cannot be negative".into(),
        ));
    }
    for (key, value) in &config.sync.column_type_overrides {
        if key.split('.').count() != 2 {
            return Err(SyncError::Config(format!(
                "sync.column_type_overrides key '{}' must be 'table.column'",
                key
            )));
        }
        if value.is_empty() {
            return Err(SyncError::Config(format!(
                "sync.column_type_overrides['{}'] cannot be empty",
                key
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SourceConfig, SyncConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                r#type: "mysql".to_string(),
                host: "localhost".to_string(),
                port: 3306,
                database: "app".to_string(),
                user: "repl".to_string(),
                password: "password".to_string(),
            },
            target: TargetConfig {
                r#type: "postgres".to_string(),
                host: "localhost".to_string(),
                port: 5432,
                database: "warehouse".to_string(),
                user: "loader".to_string(),
                password: "password".to_string(),
                schema: "raw".to_string(),
                ssl_mode: "disable".to_string(),
            },
            sync: SyncConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_source_type() {
        let mut config = valid_config();
        config.source.r#type = "postgres".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_target_type() {
        let mut config = valid_config();
        config.target.r#type = "mysql".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_chunk_size() {
        let mut config = valid_config();
        config.sync.chunk_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_sub_chunk_larger_than_chunk() {
        let mut config = valid_config();
        config.sync.chunk_size = 100;
        config.sync.sub_chunk_size = 500;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_tolerance_out_of_range() {
        let mut config = valid_config();
        config.sync.count_tolerance = 1.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_override_key() {
        let mut config = valid_config();
        config
            .sync
            .column_type_overrides
            .insert("no_dot_here".to_string(), "text".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_from_yaml_defaults() {
        let yaml = r#"
source:
  host: db.example.com
  database: app
  user: repl
  password: secret
target:
  host: pg.example.com
  database: warehouse
  user: loader
  password: secret
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.source.port, 3306);
        assert_eq!(config.target.schema, "raw");
        assert_eq!(config.sync.chunk_size, 10_000);
        assert_eq!(config.sync.sub_chunk_size, 1_000);
        assert_eq!(config.sync.max_retries, 3);
        assert!((config.sync.count_tolerance - 0.001).abs() < f64::EPSILON);
    }
}
