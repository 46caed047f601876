use sqlx::SqlitePool;

use super::RepositoryError;
use super::models::User;

#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let rec = sqlx::query_as::<_, User>(
            "SELECT id, username, credential_secret FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec)
    }

    pub async fn create_user(
        &self,
        username: &str,
        credential_secret: &str,
    ) -> Result<User, RepositoryError> {
        let rec = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, credential_secret)
            VALUES (?, ?)
            RETURNING id, username, credential_secret
            "#,
        )
        .bind(username)
        .bind(credential_secret)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                RepositoryError::DuplicateUser(username.to_string())
            }
            other => RepositoryError::Database(other),
        })?;
        log::info!("Created user '{}' with id {}", rec.username, rec.id);
        Ok(rec)
    }
}
