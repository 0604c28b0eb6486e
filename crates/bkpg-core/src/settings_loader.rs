//! Settings loading from configuration files and the environment.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON document (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Fallback | Setting |
//! |---|---|---|
//! | `BKPG_DEBUG` | | `debug` |
//! | `BKPG_LOG_LEVEL` | | `log_level` |
//! | `BKPG_DB_HOST` | `PGHOST` | `database.host` |
//! | `BKPG_DB_PORT` | `PGPORT` | `database.port` |
//! | `BKPG_DB_NAME` | `PGDATABASE` | `database.name` |
//! | `BKPG_DB_USER` | `PGUSER` | `database.user` |
//! | `BKPG_DB_PASSWORD` | `PGPASSWORD` | `database.password` |
//! | `BKPG_DB_USE_POOL` | | `database.use_pool` |
//! | `BKPG_DB_JSON_AS_TEXT` | | `database.json_as_text` |

use std::path::Path;

use crate::error::BkError;
use crate::settings::Settings;

/// Loads settings from a TOML string. Missing keys keep their defaults.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, BkError> {
    toml::from_str(toml_str)
        .map_err(|e| BkError::Configuration(format!("Failed to parse TOML: {e}")))
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, BkError> {
    let content = read(path.as_ref())?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, BkError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string. Missing keys keep their defaults.
pub fn from_json_str(json_str: &str) -> Result<Settings, BkError> {
    serde_json::from_str(json_str)
        .map_err(|e| BkError::Configuration(format!("Failed to parse JSON: {e}")))
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, BkError> {
    let content = read(path.as_ref())?;
    from_json_str(&content)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies environment variable overrides to a settings struct.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

fn read(path: &Path) -> Result<String, BkError> {
    std::fs::read_to_string(path).map_err(|e| {
        BkError::Configuration(format!("Failed to read '{}': {e}", path.display()))
    })
}

fn parse_flag(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k));

    if let Some(val) = first(&["BKPG_DEBUG"]) {
        settings.debug = parse_flag(&val);
    }
    if let Some(val) = first(&["BKPG_LOG_LEVEL"]) {
        settings.log_level = val;
    }

    let db = &mut settings.database;
    if let Some(val) = first(&["BKPG_DB_HOST", "PGHOST"]) {
        db.host = val;
    }
    if let Some(val) = first(&["BKPG_DB_PORT", "PGPORT"]) {
        match val.parse() {
            Ok(port) => db.port = port,
            Err(_) => tracing::warn!(value = %val, "ignoring unparsable database port"),
        }
    }
    if let Some(val) = first(&["BKPG_DB_NAME", "PGDATABASE"]) {
        db.name = val;
    }
    if let Some(val) = first(&["BKPG_DB_USER", "PGUSER"]) {
        db.user = val;
    }
    if let Some(val) = first(&["BKPG_DB_PASSWORD", "PGPASSWORD"]) {
        db.password = val;
    }
    if let Some(val) = first(&["BKPG_DB_USE_POOL"]) {
        db.use_pool = parse_flag(&val);
    }
    if let Some(val) = first(&["BKPG_DB_JSON_AS_TEXT"]) {
        db.json_as_text = parse_flag(&val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn apply(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut settings = Settings::default();
        apply_overrides(&mut settings, |k| vars.get(k).cloned());
        settings
    }

    #[test]
    fn test_from_toml_str() {
        let settings = from_toml_str(
            r#"
            debug = true
            log_level = "debug"

            [database]
            name = "shop"
            user = "app"
            use_pool = true
            max_size = 12
            "#,
        )
        .unwrap();
        assert!(settings.debug);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.database.name, "shop");
        assert!(settings.database.use_pool);
        assert_eq!(settings.database.max_size, 12);
        assert_eq!(settings.database.port, 5432);
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let err = from_toml_str("debug = [").unwrap_err();
        assert!(matches!(err, BkError::Configuration(_)));
    }

    #[test]
    fn test_from_json_str() {
        let settings = from_json_str(r#"{"database": {"port": 6000}}"#).unwrap();
        assert_eq!(settings.database.port, 6000);
        assert_eq!(settings.database.host, "localhost");
    }

    #[test]
    fn test_from_toml_file_missing() {
        let err = from_toml_file("/nonexistent/bkpg.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_bkpg_vars_take_precedence_over_libpq() {
        let settings = apply(&[("BKPG_DB_HOST", "primary"), ("PGHOST", "fallback")]);
        assert_eq!(settings.database.host, "primary");
    }

    #[test]
    fn test_libpq_fallbacks() {
        let settings = apply(&[
            ("PGHOST", "pg.local"),
            ("PGPORT", "5433"),
            ("PGDATABASE", "shop"),
            ("PGUSER", "me"),
            ("PGPASSWORD", "pw"),
        ]);
        assert_eq!(settings.database.host, "pg.local");
        assert_eq!(settings.database.port, 5433);
        assert_eq!(settings.database.name, "shop");
        assert_eq!(settings.database.user, "me");
        assert_eq!(settings.database.password, "pw");
    }

    #[test]
    fn test_bad_port_is_ignored() {
        let settings = apply(&[("BKPG_DB_PORT", "not-a-port")]);
        assert_eq!(settings.database.port, 5432);
    }

    #[test]
    fn test_flags() {
        let settings = apply(&[
            ("BKPG_DEBUG", "yes"),
            ("BKPG_DB_USE_POOL", "1"),
            ("BKPG_DB_JSON_AS_TEXT", "TRUE"),
        ]);
        assert!(settings.debug);
        assert!(settings.database.use_pool);
        assert!(settings.database.json_as_text);
    }
}
