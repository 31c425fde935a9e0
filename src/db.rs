use std::{future::Future, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

use crate::config::DbConfig;

/// Failure of a storage operation.
///
/// `NotFound`, `EditConflict` and `DuplicateEmail` are expected domain outcomes
/// that handlers map to specific responses. Everything else is an unexpected
/// infrastructure failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// PostgreSQL-backed implementation of every store trait.
#[derive(Clone)]
pub struct PgStore {
    pub pool: PgPool,
    pub query_timeout: Duration,
}

impl PgStore {
    pub async fn connect(cfg: &DbConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .idle_timeout(cfg.max_idle)
            .acquire_timeout(cfg.query_timeout * 2)
            .connect(&cfg.url)
            .await
            .context("connect to database")?;
        Ok(Self {
            pool,
            query_timeout: cfg.query_timeout,
        })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run database migrations")?;
        Ok(())
    }

    /// Runs a query under this store's deadline.
    pub(crate) async fn bounded<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        bounded(self.query_timeout, fut).await
    }
}

pub(crate) async fn bounded<T, F>(deadline: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res.map_err(StoreError::from),
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}

/// True when `err` is a unique-constraint violation on `constraint`.
pub(crate) fn violates(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_maps_elapsed_deadline_to_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, sqlx::Error>(1)
        };
        let err = bounded(Duration::from_millis(10), slow).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
    }

    #[tokio::test]
    async fn bounded_passes_through_results() {
        let v = bounded(Duration::from_secs(1), async { Ok::<_, sqlx::Error>(7) })
            .await
            .expect("fast query should finish");
        assert_eq!(v, 7);

        let err = bounded(Duration::from_secs(1), async {
            Err::<i32, _>(sqlx::Error::RowNotFound)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Database(sqlx::Error::RowNotFound)));
    }
}
