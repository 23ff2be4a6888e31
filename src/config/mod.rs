use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Directory holding uploads while their import job runs
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Number of imports processed concurrently
    #[serde(default = "default_import_workers")]
    pub import_workers: usize,

    /// Submitted imports allowed to wait for a worker before submissions are refused
    #[serde(default = "default_import_queue_capacity")]
    pub import_queue_capacity: usize,

    /// Largest accepted request body, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_upload_dir() -> PathBuf {
    std::env::temp_dir().join("recognition-imports")
}

fn default_import_workers() -> usize {
    2
}

fn default_import_queue_capacity() -> usize {
    32
}

fn default_max_upload_bytes() -> usize {
    256 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply() {
        let vars = vec![(
            "DATABASE_URL".to_string(),
            "postgres://localhost/recognitions".to_string(),
        )];
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.import_workers, 2);
        assert_eq!(config.import_queue_capacity, 32);
        assert!(config.upload_dir.ends_with("recognition-imports"));
    }

    #[test]
    fn test_database_url_is_required() {
        let vars: Vec<(String, String)> = vec![];
        assert!(envy::from_iter::<_, AppConfig>(vars).is_err());
    }
}
