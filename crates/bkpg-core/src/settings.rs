//! Settings for bkpg.
//!
//! [`Settings`] holds logging options and the [`DatabaseSettings`] used by
//! executors to reach PostgreSQL. Every field has a default so partial
//! configuration files are accepted; see
//! [`settings_loader`](crate::settings_loader) for loading.

use serde::{Deserialize, Serialize};

/// PostgreSQL connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// The database host.
    pub host: String,
    /// The database port.
    pub port: u16,
    /// The database name.
    pub name: String,
    /// The database user.
    pub user: String,
    /// The database password.
    pub password: String,
    /// Whether to keep a connection pool instead of connecting per statement.
    pub use_pool: bool,
    /// Minimum pool size.
    pub min_size: usize,
    /// Maximum pool size.
    pub max_size: usize,
    /// Seconds to wait for a pooled connection.
    pub timeout_secs: u64,
    /// Bind JSON parameters as text instead of native `jsonb`.
    pub json_as_text: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: String::new(),
            user: String::new(),
            password: String::new(),
            use_pool: false,
            min_size: 1,
            max_size: 5,
            timeout_secs: 10,
            json_as_text: false,
        }
    }
}

impl DatabaseSettings {
    /// Builds a `postgresql://` connection string.
    ///
    /// # Examples
    ///
    /// ```
    /// use bkpg_core::settings::DatabaseSettings;
    ///
    /// let db = DatabaseSettings {
    ///     name: "shop".into(),
    ///     user: "app".into(),
    ///     password: "pw".into(),
    ///     ..DatabaseSettings::default()
    /// };
    /// assert_eq!(db.dsn(), "postgresql://app:pw@localhost:5432/shop");
    /// ```
    pub fn dsn(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

/// The complete set of bkpg settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Debug mode switches logging to a human-readable format.
    pub debug: bool,
    /// `tracing` filter directive (e.g. `"info"`, `"bkpg_db=debug"`).
    pub log_level: String,
    /// Connection settings.
    pub database: DatabaseSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "info".to_string(),
            database: DatabaseSettings::default(),
        }
    }
}
