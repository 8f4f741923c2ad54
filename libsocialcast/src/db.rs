//! Database operations for Socialcast
//!
//! The credential store: accounts (tokens encrypted at rest), post
//! records, and insight snapshots, in SQLite. Every mutating call is a single awaited statement
//! with `synchronous = FULL`, so it is durable once it returns.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::credentials::TokenCipher;
use crate::error::{DbError, Result, SocialcastError};
use crate::types::{
    Account, NewAccount, NewPost, Platform, PostAnalytics, PostStatus, ScheduledPost,
};

const POST_COLUMNS: &str = "id, server_id, platform, account_id, image_url, caption, scheduled_at, \
     status, external_post_id, error_message, created_at, published_at";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    cipher: Arc<TokenCipher>,
}

impl Database {
    /// Open (creating if needed) the database at `db_path`.
    ///
    /// The encryption key is parsed before anything touches the disk, so a
    /// malformed key fails here rather than on the first token write.
    pub async fn open(db_path: &str, encryption_key: &str) -> Result<Self> {
        let cipher = TokenCipher::from_key(encryption_key)?;

        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        debug!("Opened database at {}", expanded_path);

        Ok(Self {
            pool,
            cipher: Arc::new(cipher),
        })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or overwrite the account for `(server_id, platform)`
    pub async fn save_account(&self, server_id: &str, data: &NewAccount) -> Result<Account> {
        let encrypted = self.cipher.encrypt(&data.access_token)?;
        let connected_at = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO accounts (server_id, platform, platform_account_id, access_token, display_name, connected_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(server_id, platform) DO UPDATE SET
                platform_account_id = excluded.platform_account_id,
                access_token = excluded.access_token,
                display_name = excluded.display_name,
                connected_at = excluded.connected_at
            "#,
        )
        .bind(server_id)
        .bind(data.platform.as_str())
        .bind(&data.platform_account_id)
        .bind(&encrypted)
        .bind(&data.display_name)
        .bind(connected_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        info!(
            "Saved {} account '{}' for server {}",
            data.platform, data.display_name, server_id
        );

        Ok(Account {
            server_id: server_id.to_string(),
            platform: data.platform,
            platform_account_id: data.platform_account_id.clone(),
            access_token: data.access_token.clone(),
            display_name: data.display_name.clone(),
            connected_at,
        })
    }

    /// Fetch and decrypt the account for `(server_id, platform)`
    pub async fn get_account(&self, server_id: &str, platform: Platform) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT server_id, platform, platform_account_id, access_token, display_name, connected_at
            FROM accounts WHERE server_id = ? AND platform = ?
            "#,
        )
        .bind(server_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(|r| self.row_to_account(&r)).transpose()
    }

    /// All accounts connected for a server
    pub async fn list_accounts(&self, server_id: &str) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT server_id, platform, platform_account_id, access_token, display_name, connected_at
            FROM accounts WHERE server_id = ?
            ORDER BY platform
            "#,
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(|r| self.row_to_account(r)).collect()
    }

    /// Delete the account; returns whether one existed
    pub async fn delete_account(&self, server_id: &str, platform: Platform) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE server_id = ? AND platform = ?")
            .bind(server_id)
            .bind(platform.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let existed = result.rows_affected() > 0;
        if existed {
            info!("Deleted {} account for server {}", platform, server_id);
        }
        Ok(existed)
    }

    /// Insert a post, returning its newly assigned id
    pub async fn save_post(&self, post: &NewPost) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().timestamp();
        let published_at = match post.status {
            PostStatus::Published => Some(created_at),
            _ => None,
        };

        sqlx::query(
            r#"
            INSERT INTO posts (id, server_id, platform, account_id, image_url, caption, scheduled_at,
                               status, external_post_id, created_at, published_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&post.server_id)
        .bind(post.platform.as_str())
        .bind(&post.account_id)
        .bind(&post.image_url)
        .bind(&post.caption)
        .bind(post.scheduled_at)
        .bind(post.status.as_str())
        .bind(&post.external_post_id)
        .bind(created_at)
        .bind(published_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        info!("Saved {} post {} ({})", post.platform, id, post.status);
        Ok(id)
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<ScheduledPost>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.map(|r| row_to_post(&r)).transpose()
    }

    /// Scheduled posts whose time has come. Order is not meaningful.
    pub async fn get_due_posts(&self, now: i64) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM posts
            WHERE status = 'scheduled' AND scheduled_at IS NOT NULL AND scheduled_at <= ?
            "#,
            POST_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_post).collect()
    }

    /// Move a scheduled post to a terminal status.
    ///
    /// Returns `false` without touching the row if the post is missing or
    /// no longer scheduled; terminal states never change.
    pub async fn update_post_status(
        &self,
        post_id: &str,
        status: PostStatus,
        external_id: Option<&str>,
    ) -> Result<bool> {
        self.finish_post(post_id, status, external_id, None).await
    }

    /// Mark a scheduled post failed, keeping the reason for later inspection
    pub async fn record_failure(&self, post_id: &str, reason: &str) -> Result<bool> {
        self.finish_post(post_id, PostStatus::Failed, None, Some(reason))
            .await
    }

    async fn finish_post(
        &self,
        post_id: &str,
        status: PostStatus,
        external_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<bool> {
        if !status.is_terminal() {
            return Err(SocialcastError::InvalidInput(format!(
                "cannot move post {} back to {}",
                post_id, status
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = ?,
                external_post_id = COALESCE(?, external_post_id),
                error_message = ?,
                published_at = ?
            WHERE id = ? AND status = 'scheduled'
            "#,
        )
        .bind(status.as_str())
        .bind(external_id)
        .bind(error_message)
        .bind(chrono::Utc::now().timestamp())
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let updated = result.rows_affected() > 0;
        if updated {
            info!("Updated post {} status to {}", post_id, status);
        } else {
            debug!("Post {} was not scheduled; status left unchanged", post_id);
        }
        Ok(updated)
    }

    /// Most recent posts for a server, newest first
    pub async fn get_posts_by_server(&self, server_id: &str, limit: usize) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM posts WHERE server_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
            POST_COLUMNS
        ))
        .bind(server_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_post).collect()
    }

    /// Store an insight snapshot for a published post
    pub async fn save_analytics(
        &self,
        server_id: &str,
        platform: Platform,
        external_post_id: &str,
        metrics: &BTreeMap<String, i64>,
    ) -> Result<PostAnalytics> {
        let encoded = serde_json::to_string(metrics).map_err(DbError::Encoding)?;
        let fetched_at = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO analytics (server_id, platform, external_post_id, metrics, fetched_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(server_id)
        .bind(platform.as_str())
        .bind(external_post_id)
        .bind(&encoded)
        .bind(fetched_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        debug!("Saved {} metric(s) for post {}", metrics.len(), external_post_id);
        Ok(PostAnalytics {
            server_id: server_id.to_string(),
            platform,
            external_post_id: external_post_id.to_string(),
            metrics: metrics.clone(),
            fetched_at,
        })
    }

    /// Newest insight snapshot for a post, if any was ever fetched
    pub async fn get_analytics(&self, external_post_id: &str) -> Result<Option<PostAnalytics>> {
        let row = sqlx::query(
            r#"
            SELECT server_id, platform, external_post_id, metrics, fetched_at
            FROM analytics
            WHERE external_post_id = ?
            ORDER BY fetched_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(external_post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let Some(r) = row else {
            return Ok(None);
        };
        let metrics: String = r.get("metrics");
        Ok(Some(PostAnalytics {
            server_id: r.get("server_id"),
            platform: parse_column(&r, "platform")?,
            external_post_id: r.get("external_post_id"),
            metrics: serde_json::from_str(&metrics).map_err(DbError::Encoding)?,
            fetched_at: r.get("fetched_at"),
        }))
    }

    fn row_to_account(&self, r: &SqliteRow) -> Result<Account> {
        let encrypted: String = r.get("access_token");
        Ok(Account {
            server_id: r.get("server_id"),
            platform: parse_column(r, "platform")?,
            platform_account_id: r.get("platform_account_id"),
            access_token: self.cipher.decrypt(&encrypted)?,
            display_name: r.get("display_name"),
            connected_at: r.get("connected_at"),
        })
    }
}

fn row_to_post(r: &SqliteRow) -> Result<ScheduledPost> {
    Ok(ScheduledPost {
        id: r.get("id"),
        server_id: r.get("server_id"),
        platform: parse_column(r, "platform")?,
        account_id: r.get("account_id"),
        image_url: r.get("image_url"),
        caption: r.get("caption"),
        scheduled_at: r.get("scheduled_at"),
        status: parse_column(r, "status")?,
        external_post_id: r.get("external_post_id"),
        error_message: r.get("error_message"),
        created_at: r.get("created_at"),
        published_at: r.get("published_at"),
    })
}

fn parse_column<T>(r: &SqliteRow, column: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = r.get(column);
    raw.parse::<T>()
        .map_err(|e| DbError::SqlxError(sqlx::Error::Decode(e.into())).into())
}
