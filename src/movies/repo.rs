use async_trait::async_trait;
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

use crate::{
    db::{PgStore, StoreError, StoreResult},
    movies::{
        filters::{Metadata, MovieFilters},
        repo_types::{Movie, MovieDraft},
    },
};

const MOVIE_COLUMNS: &str = "id, created_at, title, year, runtime, genres, version";

#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn insert(&self, draft: MovieDraft) -> StoreResult<Movie>;

    async fn get(&self, id: Uuid) -> StoreResult<Movie>;

    /// Writes `movie` only if the stored version still equals `movie.version`.
    /// Returns the new version (`movie.version + 1`); zero matching rows is an
    /// `EditConflict`.
    async fn update(&self, movie: &Movie) -> StoreResult<i32>;

    /// Zero affected rows is `NotFound`, whether the row never existed or a
    /// concurrent delete won.
    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    async fn list(&self, filters: &MovieFilters) -> StoreResult<(Vec<Movie>, Metadata)>;
}

#[async_trait]
impl MovieStore for PgStore {
    async fn insert(&self, draft: MovieDraft) -> StoreResult<Movie> {
        let sql = format!(
            "INSERT INTO movies (title, year, runtime, genres) VALUES ($1, $2, $3, $4) RETURNING {MOVIE_COLUMNS}"
        );
        self.bounded(
            sqlx::query_as::<_, Movie>(&sql)
                .bind(&draft.title)
                .bind(draft.year)
                .bind(draft.runtime)
                .bind(&draft.genres)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn get(&self, id: Uuid) -> StoreResult<Movie> {
        let sql = format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1");
        self.bounded(
            sqlx::query_as::<_, Movie>(&sql)
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn update(&self, movie: &Movie) -> StoreResult<i32> {
        self.bounded(
            sqlx::query_scalar::<_, i32>(
                r#"
                UPDATE movies
                SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1
                WHERE id = $5 AND version = $6
                RETURNING version
                "#,
            )
            .bind(&movie.title)
            .bind(movie.year)
            .bind(movie.runtime)
            .bind(&movie.genres)
            .bind(movie.id)
            .bind(movie.version)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(StoreError::EditConflict)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let result = self
            .bounded(
                sqlx::query("DELETE FROM movies WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list(&self, filters: &MovieFilters) -> StoreResult<(Vec<Movie>, Metadata)> {
        // The sort column comes from a fixed safelist, never from raw input.
        let order_by = match filters.sort {
            Some((column, direction)) => format!("{column} {}, id ASC", direction.as_sql()),
            None => "id ASC".to_string(),
        };
        let sql = format!(
            r#"
            SELECT count(*) OVER() AS total_records, {MOVIE_COLUMNS}
            FROM movies
            WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '')
            AND (genres @> $2 OR $2 = '{{}}')
            AND (year = $3 OR $3 = 0)
            ORDER BY {order_by}
            LIMIT $4 OFFSET $5
            "#
        );

        let rows: Vec<PgRow> = self
            .bounded(
                sqlx::query(&sql)
                    .bind(&filters.title)
                    .bind(&filters.genres)
                    .bind(filters.year)
                    .bind(filters.limit)
                    .bind(filters.offset())
                    .fetch_all(&self.pool),
            )
            .await?;

        let mut total_records = 0_i64;
        let mut movies = Vec::with_capacity(rows.len());
        for row in &rows {
            total_records = row.try_get("total_records")?;
            movies.push(Movie::from_row(row)?);
        }

        let metadata = Metadata::calculate(total_records, filters.page, filters.limit);
        Ok((movies, metadata))
    }
}
