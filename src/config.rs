use std::env;
use std::fmt;

/**
 * Runtime settings, read from the environment
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// PostgreSQL URL, the in-memory store is used when absent
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub listen_addr: String,
    pub templates_dir: String,
    /// Whether the unauthenticated admin pages are mounted
    pub admin: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            listen_addr: "127.0.0.1:8000".to_string(),
            templates_dir: "views".to_string(),
            admin: false,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid value for {}: {:?}", self.key, self.value)
    }
}

impl std::error::Error for ConfigError {}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /**
     * Build settings from any key lookup, which keeps the parsing testable without touching the
     * process environment
     */
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        settings.database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        if let Some(value) = lookup("DB_MAX_CONNECTIONS") {
            settings.max_connections = match value.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError {
                        key: "DB_MAX_CONNECTIONS",
                        value,
                    })
                }
            };
        }

        if let Some(value) = lookup("LISTEN_ADDR") {
            settings.listen_addr = value;
        }

        if let Some(value) = lookup("TEMPLATES_DIR") {
            settings.templates_dir = value;
        }

        if let Some(value) = lookup("POLLS_ADMIN") {
            settings.admin = match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError {
                        key: "POLLS_ADMIN",
                        value,
                    })
                }
            };
        }

        Ok(settings)
    }
}
