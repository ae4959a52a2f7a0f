use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use verdant_core::{VerdantError, VerdantResult};

const DEFAULT_CONFIG_NAME: &str = "verdant.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Memory,
}

/// Connection timeouts. The pool itself is pinned to a single
/// connection: the store runs one in-flight transaction at a time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerdantConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
}

impl VerdantConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            database: DatabaseConfig::Memory,
            pool: None,
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> VerdantResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| VerdantError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| VerdantError::storage(format!("read config: {err}")))?;
            let config: VerdantConfig =
                serde_json::from_str(&raw).map_err(|err| VerdantError::invalid(err.to_string()))?;
            return Ok(config);
        }
        let default = VerdantConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| VerdantError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| VerdantError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> VerdantResult<Option<PathBuf>> {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| "verdant.sqlite".to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(Some(candidate))
                } else {
                    Ok(Some(base_dir.join(candidate)))
                }
            }
            DatabaseConfig::Memory => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_or_init_writes_default_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path();
        let config = VerdantConfig::load_or_init(base, &base.join("data.sqlite")).expect("config");
        assert!(matches!(config.database, DatabaseConfig::Sqlite { .. }));
        assert!(base.join(DEFAULT_CONFIG_NAME).exists());
        // A second load reads the file back instead of rewriting it.
        let again = VerdantConfig::load_or_init(base, &base.join("data.sqlite")).expect("config");
        assert!(matches!(again.database, DatabaseConfig::Sqlite { .. }));
    }

    #[test]
    fn sqlite_path_resolves_relative_to_base() {
        let config = VerdantConfig::default_sqlite("data.sqlite");
        let path = config
            .sqlite_path(Path::new("/tmp/verdant"))
            .unwrap()
            .unwrap();
        assert_eq!(path, Path::new("/tmp/verdant/data.sqlite"));
        assert!(VerdantConfig::in_memory()
            .sqlite_path(Path::new("/tmp"))
            .unwrap()
            .is_none());
    }
}
