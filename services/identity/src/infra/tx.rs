//! Transaction coordinator.
//!
//! An [`OpenTx`] exists only after `begin` succeeded, and `settle` consumes
//! it, so a transaction cannot be used after it reached a terminal state and
//! a failed begin never yields something to commit.

use sea_orm::{DatabaseTransaction, TransactionTrait};
use tracing::{debug, error};

use warden_core::Ctx;

use crate::error::StoreError;
use crate::infra::db::SeaStore;

pub(crate) struct OpenTx {
    store: SeaStore<DatabaseTransaction>,
}

impl OpenTx {
    /// Start a transaction on `conn`, or a savepoint when `conn` is itself a
    /// transaction. Bounded by `ctx`.
    pub(crate) async fn begin<C>(conn: &C, ctx: &Ctx) -> Result<Self, StoreError>
    where
        C: TransactionTrait + Sync,
    {
        let txn = ctx
            .run(conn.begin())
            .await?
            .map_err(StoreError::TransactionBegin)?;
        debug!("transaction begun");
        Ok(Self {
            store: SeaStore::new(txn),
        })
    }

    /// The transaction-scoped port every unit-of-work operation runs on.
    pub(crate) fn store(&self) -> &SeaStore<DatabaseTransaction> {
        &self.store
    }

    /// Commit on `Ok`, roll back on `Err`.
    ///
    /// Not bounded by a context: once work has finished the transaction is
    /// always driven to commit or rollback.
    pub(crate) async fn settle<T>(self, outcome: Result<T, StoreError>) -> Result<T, StoreError> {
        let txn = self.store.into_inner();
        match outcome {
            Ok(value) => {
                txn.commit().await.map_err(|err| {
                    error!(error = %err, "transaction commit failed");
                    StoreError::TransactionCommit(err)
                })?;
                debug!("transaction committed");
                Ok(value)
            }
            Err(original) => match txn.rollback().await {
                Ok(()) => {
                    debug!(reason = %original, "transaction rolled back");
                    Err(original)
                }
                Err(rollback) => {
                    error!(
                        reason = %original,
                        error = %rollback,
                        "transaction rollback failed"
                    );
                    Err(StoreError::TransactionRollback {
                        original: Box::new(original),
                        rollback,
                    })
                }
            },
        }
    }
}
