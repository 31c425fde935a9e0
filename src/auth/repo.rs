use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{
        permissions::Permissions,
        repo_types::{NewUser, User},
        token::{hash_token, Token, TokenScope},
    },
    db::{violates, PgStore, StoreError, StoreResult},
};

const USER_COLUMNS: &str = "id, created_at, name, email, password_hash, activated, version";
const EMAIL_CONSTRAINT: &str = "users_email_key";

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `DuplicateEmail` when the address is taken.
    async fn insert(&self, user: NewUser) -> StoreResult<User>;

    async fn get_by_email(&self, email: &str) -> StoreResult<User>;

    /// Version-checked update. Writes name, email, password hash and activation
    /// only if the stored version still equals `user.version`; returns the new
    /// version. Zero matching rows is an `EditConflict`.
    async fn update(&self, user: &User) -> StoreResult<i32>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: &Token) -> StoreResult<()>;

    /// Owner of the unexpired token with this plaintext and scope. Unknown,
    /// expired and wrong-scope tokens are all `NotFound`.
    async fn find_user_by_token(&self, scope: TokenScope, plaintext: &str) -> StoreResult<User>;

    /// Idempotent.
    async fn delete_all_for_user(&self, scope: TokenScope, user_id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Empty set when the user holds no grants.
    async fn get_all_for_user(&self, user_id: Uuid) -> StoreResult<Permissions>;

    /// Idempotent; unknown codes are ignored.
    async fn add_for_user(&self, user_id: Uuid, codes: &[&str]) -> StoreResult<()>;
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        );
        let res = self
            .bounded(
                sqlx::query_as::<_, User>(&sql)
                    .bind(&user.name)
                    .bind(&user.email)
                    .bind(&user.password_hash)
                    .fetch_one(&self.pool),
            )
            .await;
        match res {
            Err(StoreError::Database(e)) if violates(&e, EMAIL_CONSTRAINT) => {
                Err(StoreError::DuplicateEmail)
            }
            other => other,
        }
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        self.bounded(
            sqlx::query_as::<_, User>(&sql)
                .bind(email)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &User) -> StoreResult<i32> {
        let res = self
            .bounded(
                sqlx::query_scalar::<_, i32>(
                    r#"
                    UPDATE users
                    SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
                    WHERE id = $5 AND version = $6
                    RETURNING version
                    "#,
                )
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.activated)
                .bind(user.id)
                .bind(user.version)
                .fetch_optional(&self.pool),
            )
            .await;
        match res {
            Ok(Some(version)) => Ok(version),
            Ok(None) => Err(StoreError::EditConflict),
            Err(StoreError::Database(e)) if violates(&e, EMAIL_CONSTRAINT) => {
                Err(StoreError::DuplicateEmail)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert(&self, token: &Token) -> StoreResult<()> {
        self.bounded(
            sqlx::query("INSERT INTO tokens (hash, user_id, expiry, scope) VALUES ($1, $2, $3, $4)")
                .bind(&token.hash)
                .bind(token.user_id)
                .bind(token.expiry)
                .bind(token.scope.as_str())
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn find_user_by_token(&self, scope: TokenScope, plaintext: &str) -> StoreResult<User> {
        let hash = hash_token(plaintext);
        self.bounded(
            sqlx::query_as::<_, User>(
                r#"
                SELECT u.id, u.created_at, u.name, u.email, u.password_hash, u.activated, u.version
                FROM users u
                INNER JOIN tokens t ON t.user_id = u.id
                WHERE t.hash = $1 AND t.scope = $2 AND t.expiry > $3
                "#,
            )
            .bind(hash)
            .bind(scope.as_str())
            .bind(OffsetDateTime::now_utc())
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_all_for_user(&self, scope: TokenScope, user_id: Uuid) -> StoreResult<()> {
        self.bounded(
            sqlx::query("DELETE FROM tokens WHERE user_id = $1 AND scope = $2")
                .bind(user_id)
                .bind(scope.as_str())
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn get_all_for_user(&self, user_id: Uuid) -> StoreResult<Permissions> {
        let codes = self
            .bounded(
                sqlx::query_scalar::<_, String>(
                    r#"
                    SELECT p.code
                    FROM permissions p
                    INNER JOIN users_permissions up ON up.permission_id = p.id
                    WHERE up.user_id = $1
                    "#,
                )
                .bind(user_id)
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(codes.into_iter().collect())
    }

    async fn add_for_user(&self, user_id: Uuid, codes: &[&str]) -> StoreResult<()> {
        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO users_permissions (user_id, permission_id)
                SELECT $1, p.id FROM permissions p WHERE p.code = ANY($2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(codes)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
