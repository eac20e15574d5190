/*!
 * Transaction helper
 *
 * Runs a closure inside a database transaction, committing on `Ok` and
 * rolling back on `Err`, while keeping the caller's error type intact.
 */

use futures::future::BoxFuture;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionError, TransactionTrait};

/// Execute a function within a database transaction
///
/// ```rust,ignore
/// let order = with_transaction(&db, |txn| {
///     Box::pin(async move {
///         let order = order::ActiveModel { .. }.insert(txn).await?;
///         for item in items {
///             item.insert(txn).await?;
///         }
///         Ok::<_, ServiceError>(order)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T, E>(db: &DatabaseConnection, f: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, E>> + Send,
    T: Send,
    E: From<DbErr> + std::error::Error + Send,
{
    db.transaction::<F, T, E>(f).await.map_err(|e| match e {
        TransactionError::Connection(db_err) => E::from(db_err),
        TransactionError::Transaction(err) => err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use assert_matches::assert_matches;
    use sea_orm::{ConnectOptions, ConnectionTrait, Database, Statement};

    async fn scratch_db() -> DatabaseConnection {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1);
        let db = Database::connect(opt).await.unwrap();
        db.execute_unprepared("CREATE TABLE ledger (id INTEGER PRIMARY KEY, note TEXT NOT NULL)")
            .await
            .unwrap();
        db
    }

    async fn row_count(db: &DatabaseConnection) -> i64 {
        let row = db
            .query_one(Statement::from_string(
                db.get_database_backend(),
                "SELECT COUNT(*) AS n FROM ledger".to_owned(),
            ))
            .await
            .unwrap()
            .unwrap();
        row.try_get::<i64>("", "n").unwrap()
    }

    #[tokio::test]
    async fn commits_on_success() {
        let db = scratch_db().await;
        let out = with_transaction(&db, |txn| {
            Box::pin(async move {
                txn.execute_unprepared("INSERT INTO ledger (note) VALUES ('a')")
                    .await?;
                Ok::<_, ServiceError>(7)
            })
        })
        .await
        .unwrap();

        assert_eq!(out, 7);
        assert_eq!(row_count(&db).await, 1);
    }

    #[tokio::test]
    async fn rolls_back_and_keeps_error_variant() {
        let db = scratch_db().await;
        let result: Result<(), ServiceError> = with_transaction(&db, |txn| {
            Box::pin(async move {
                txn.execute_unprepared("INSERT INTO ledger (note) VALUES ('a')")
                    .await?;
                Err(ServiceError::InsufficientStock("lamp".into()))
            })
        })
        .await;

        assert_matches!(result, Err(ServiceError::InsufficientStock(name)) if name == "lamp");
        assert_eq!(row_count(&db).await, 0);
    }
}
