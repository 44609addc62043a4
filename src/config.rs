use std::path::PathBuf;

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub frontend_dir: PathBuf,
    pub admin_name: String,
    pub admin_password: String,
    pub access_secret: String,
    pub refresh_secret: String,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Read the environment, after loading `.env` if one exists.
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!("ignoring unreadable .env file: {e}");
        }

        Self {
            bind: var_or("SLOTBOOK_BIND", "0.0.0.0"),
            port: parsed("SLOTBOOK_PORT").unwrap_or(8080),
            data_dir: PathBuf::from(var_or("SLOTBOOK_DATA_DIR", "./data")),
            frontend_dir: PathBuf::from(var_or("SLOTBOOK_FRONTEND_DIR", "./frontend")),
            admin_name: var_or("SLOTBOOK_ADMIN_NAME", "admin"),
            admin_password: var_or("SLOTBOOK_ADMIN_PASSWORD", "admin"),
            access_secret: var_or("ACCESS_SECRET", ""),
            refresh_secret: var_or("REFRESH_SECRET", ""),
            compact_threshold: parsed("SLOTBOOK_COMPACT_THRESHOLD").unwrap_or(1000),
            metrics_port: parsed("SLOTBOOK_METRICS_PORT"),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("calendar.wal")
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
