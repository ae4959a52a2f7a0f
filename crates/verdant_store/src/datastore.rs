use std::path::{Path, PathBuf};

use crate::{VerdantConfig, VerdantStore};
use verdant_core::VerdantResult;

const DEFAULT_DB_NAME: &str = "verdant.sqlite";

pub fn load_or_init_config(base: &Path) -> VerdantResult<VerdantConfig> {
    let default_sqlite = base.join(DEFAULT_DB_NAME);
    VerdantConfig::load_or_init(base, &default_sqlite)
}

pub async fn open_store(base: &Path) -> VerdantResult<VerdantStore> {
    let config = load_or_init_config(base)?;
    VerdantStore::connect(&config, base).await
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_DB_NAME)
}
