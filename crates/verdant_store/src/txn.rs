use std::sync::Arc;

use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tokio::sync::{Mutex, OwnedMutexGuard};

use verdant_core::VerdantResult;

/// Serializes transaction windows across requests. The store runs on a
/// single SQLite connection, which supports one in-flight transaction;
/// waiters are woken in arrival order (tokio mutex fairness).
#[derive(Clone, Default)]
pub struct TransactionGate {
    lock: Arc<Mutex<()>>,
}

impl TransactionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the gate, then opens a transaction. The gate is held
    /// until the returned transaction commits or rolls back.
    pub async fn begin(&self, conn: &DatabaseConnection) -> VerdantResult<OpenTransaction> {
        let permit = self.lock.clone().lock_owned().await;
        let tx = conn.begin().await?;
        Ok(OpenTransaction {
            tx,
            _permit: permit,
        })
    }
}

pub struct OpenTransaction {
    tx: DatabaseTransaction,
    _permit: OwnedMutexGuard<()>,
}

impl OpenTransaction {
    pub fn connection(&self) -> &DatabaseTransaction {
        &self.tx
    }

    pub async fn commit(self) -> VerdantResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> VerdantResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
