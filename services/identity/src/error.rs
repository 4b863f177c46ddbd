use std::fmt;

use sea_orm::{sqlx, DbErr, RuntimeErr, SqlErr};
use warden_core::Interrupted;

/// Stored entity named in `NotFound` and `InvalidRow` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Profile,
    Accounts,
    Link,
    Token,
    BlacklistedDomain,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Profile => "profile",
            Self::Accounts => "accounts",
            Self::Link => "link",
            Self::Token => "token",
            Self::BlacklistedDomain => "blacklisted domain",
        })
    }
}

/// Identity store error variants.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(Entity),
    #[error("{op}: constraint violation: {detail}")]
    ConstraintViolation { op: &'static str, detail: String },
    #[error("profile data serialization failed")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid {entity} row: {reason}")]
    InvalidRow { entity: Entity, reason: String },
    #[error("transaction begin error")]
    TransactionBegin(#[source] DbErr),
    #[error("transaction commit error")]
    TransactionCommit(#[source] DbErr),
    /// The store may be left inconsistent; both causes are kept.
    #[error("transaction rollback error: {rollback} (original error: {original})")]
    TransactionRollback {
        original: Box<StoreError>,
        rollback: DbErr,
    },
    #[error("{op}: storage unavailable")]
    StorageUnavailable {
        op: &'static str,
        #[source]
        source: DbErr,
    },
    #[error("{op}: storage error")]
    Storage {
        op: &'static str,
        #[source]
        source: DbErr,
    },
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    #[error("unit of work aborted: {0}")]
    Aborted(#[from] anyhow::Error),
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            Self::Serialization(_) => "SERIALIZATION",
            Self::InvalidRow { .. } => "INVALID_ROW",
            Self::TransactionBegin(_) => "TRANSACTION_BEGIN",
            Self::TransactionCommit(_) => "TRANSACTION_COMMIT",
            Self::TransactionRollback { .. } => "TRANSACTION_ROLLBACK",
            Self::StorageUnavailable { .. } => "STORAGE_UNAVAILABLE",
            Self::Storage { .. } => "STORAGE",
            Self::Interrupted(Interrupted::Cancelled) => "CANCELLED",
            Self::Interrupted(Interrupted::DeadlineExceeded) => "DEADLINE_EXCEEDED",
            Self::Aborted(_) => "ABORTED",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }

    /// Classify a driver error raised while running `op`.
    pub(crate) fn from_db(op: &'static str, err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail))
            | Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
                return Self::ConstraintViolation { op, detail };
            }
            _ => {}
        }
        if is_connectivity(&err) {
            Self::StorageUnavailable { op, source: err }
        } else {
            Self::Storage { op, source: err }
        }
    }

    pub(crate) fn invalid_row(entity: Entity, reason: impl fmt::Display) -> Self {
        Self::InvalidRow {
            entity,
            reason: reason.to_string(),
        }
    }
}

/// Lost connections and exhausted pools, whether reported on acquire or
/// mid-statement.
fn is_connectivity(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Query(RuntimeErr::SqlxError(inner)) | DbErr::Exec(RuntimeErr::SqlxError(inner)) => {
            matches!(
                inner,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            )
        }
        _ => false,
    }
}
