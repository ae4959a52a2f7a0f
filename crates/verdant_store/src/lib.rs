mod create;
mod db;

pub mod config;
pub mod datastore;
pub mod filter;
pub mod migration;
pub mod store;
pub mod txn;

pub mod api {
    pub use verdant_core::api::*;
}

pub mod descriptor {
    pub use verdant_core::descriptor::*;
}

pub use verdant_core::*;

pub use config::{DatabaseConfig, PoolConfig, VerdantConfig};
pub use datastore::{default_sqlite_path, load_or_init_config, open_store};
pub use filter::{compile_filter, CompareOp, FilterExpr};
pub use store::VerdantStore;
pub use txn::{OpenTransaction, TransactionGate};
