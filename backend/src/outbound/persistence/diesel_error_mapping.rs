//! Diesel and pool error mapping for the farm store.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use crate::domain::FarmerId;
use crate::domain::ports::FarmStoreError;

use super::pool::PoolError;

/// Prefix shared by the non-negative total constraints on `farmers`.
const FARMER_CONSTRAINT_PREFIX: &str = "farmers_";

/// PostgreSQL reports SQLSTATE 40P01 with this message; Diesel has no
/// dedicated kind for it.
const DEADLOCK_MESSAGE: &str = "deadlock detected";

pub(crate) fn map_pool_error(error: PoolError) -> FarmStoreError {
    FarmStoreError::connection(error.into_message())
}

fn log_diesel_error(error: &DieselError) {
    match error {
        DieselError::DatabaseError(kind, info) => {
            debug!(
                ?kind,
                detail = info.message(),
                constraint = ?info.constraint_name(),
                "diesel operation failed"
            );
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(error),
            error = %error,
            "diesel operation failed"
        ),
    }
}

/// Map errors that carry no farm-specific meaning.
///
/// Serialisation failures and deadlocks surface as conflicts so the service
/// retries them like a stale version.
pub(crate) fn map_diesel_error(error: DieselError) -> FarmStoreError {
    log_diesel_error(&error);
    match error {
        DieselError::DatabaseError(
            DatabaseErrorKind::SerializationFailure | DatabaseErrorKind::UniqueViolation,
            info,
        ) => FarmStoreError::conflict(info.message().to_owned()),
        DieselError::DatabaseError(_, info) if info.message().contains(DEADLOCK_MESSAGE) => {
            FarmStoreError::conflict(info.message().to_owned())
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
            FarmStoreError::connection(info.message().to_owned())
        }
        DieselError::DatabaseError(_, info) => FarmStoreError::query(info.message().to_owned()),
        DieselError::NotFound => FarmStoreError::query("record not found"),
        DieselError::QueryBuilderError(_) => FarmStoreError::query("database query error"),
        other => FarmStoreError::query(other.to_string()),
    }
}

/// Map a failed write that references `farmer_id`.
///
/// A foreign key violation means the farmer row is missing; a violated
/// `farmers_*` check means their totals would go negative.
pub(crate) fn map_farmer_write_error(error: DieselError, farmer_id: FarmerId) -> FarmStoreError {
    match &error {
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
            log_diesel_error(&error);
            FarmStoreError::farmer_not_found(farmer_id)
        }
        DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, info)
            if info
                .constraint_name()
                .is_some_and(|name| name.starts_with(FARMER_CONSTRAINT_PREFIX)) =>
        {
            log_diesel_error(&error);
            FarmStoreError::negative_aggregate(farmer_id)
        }
        _ => map_diesel_error(error),
    }
}
