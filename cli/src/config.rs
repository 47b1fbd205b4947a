use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Environment variable that points the CLI at another database file.
pub const DB_ENV_VAR: &str = "CARNET_DB";

pub struct Config {
    pub db_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "carnet").context("Could not determine home directory")?;
        let db_override = std::env::var_os(DB_ENV_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::resolve(proj_dirs.data_dir().to_path_buf(), db_override)
    }

    /// Build the configuration from a data directory and an optional database
    /// path, creating whichever directory will hold the database.
    pub fn resolve(data_dir: PathBuf, db_override: Option<PathBuf>) -> Result<Self> {
        let db_path = db_override.unwrap_or_else(|| data_dir.join("carnet.db"));
        let db_dir = db_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or(data_dir, PathBuf::from);
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create data directory: {}", db_dir.display()))?;

        Ok(Config { db_path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_db_path() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = tmp.path().join("carnet");
        let config = Config::resolve(data_dir.clone(), None).unwrap();
        assert_eq!(config.db_path, data_dir.join("carnet.db"));
        assert!(data_dir.is_dir());
    }

    #[test]
    fn test_db_override_creates_parent() {
        let tmp = tempfile::tempdir().unwrap();
        let custom = tmp.path().join("ailleurs").join("recettes.db");
        let config = Config::resolve(tmp.path().join("unused"), Some(custom.clone())).unwrap();
        assert_eq!(config.db_path, custom);
        assert!(tmp.path().join("ailleurs").is_dir());
        assert!(!tmp.path().join("unused").exists());
    }
}
