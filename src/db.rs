//! SQLite-слой для записей пользователей: маркер авторизации, токены, путь к rclone-конфигу.

use crate::users::UserRecord;
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, FromRow)]
struct UserRecordRow {
    tg_user_id: i64,
    pending_auth: Option<String>,
    token: Option<String>,
    rclone_config: Option<String>,
}

pub struct Db {
    pool: SqlitePool,
}

fn current_unix_timestamp() -> Result<i64, anyhow::Error> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .map_err(|err| anyhow::anyhow!("Системное время меньше UNIX_EPOCH: {}", err))
}

impl Db {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("Не удалось создать директорию для БД: {}", e))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts)
            .await
            .map_err(|e| anyhow::anyhow!("Не удалось подключиться к SQLite: {}", e))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_records (
                tg_user_id INTEGER PRIMARY KEY,
                pending_auth TEXT,
                token TEXT,
                rclone_config TEXT,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Миграция БД: {}", e))?;
        Ok(())
    }

    pub async fn load_user(&self, tg_user_id: i64) -> Result<Option<UserRecord>, anyhow::Error> {
        let row = sqlx::query_as::<_, UserRecordRow>(
            "SELECT tg_user_id, pending_auth, token, rclone_config FROM user_records WHERE tg_user_id = ?",
        )
        .bind(tg_user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let pending = row
            .pending_auth
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| anyhow::anyhow!("Повреждён pending_auth пользователя {}: {}", tg_user_id, e))?;
        let token = row
            .token
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| anyhow::anyhow!("Повреждён token пользователя {}: {}", tg_user_id, e))?;

        Ok(Some(UserRecord {
            tg_user_id: row.tg_user_id,
            pending,
            token,
            rclone_config: row.rclone_config.map(PathBuf::from),
        }))
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Сохраняет запись целиком (insert или update).
    pub async fn save_user(&self, record: &UserRecord) -> Result<(), anyhow::Error> {
        let now = current_unix_timestamp()?;
        let pending_auth = record
            .pending
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let token = record.token.as_ref().map(serde_json::to_string).transpose()?;
        let rclone_config = record
            .rclone_config
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned());

        sqlx::query(
            "INSERT INTO user_records (tg_user_id, pending_auth, token, rclone_config, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(tg_user_id) DO UPDATE SET
                 pending_auth = excluded.pending_auth,
                 token = excluded.token,
                 rclone_config = excluded.rclone_config,
                 updated_at = excluded.updated_at",
        )
        .bind(record.tg_user_id)
        .bind(pending_auth)
        .bind(token)
        .bind(rclone_config)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::{PendingAuthorization, TokenBundle};
    use chrono::{TimeZone, Utc};

    fn pending() -> PendingAuthorization {
        PendingAuthorization {
            id: "abc123".into(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            state: "00ff".into(),
            client_id: "id".into(),
            auth_uri: "https://accounts.google.com/o/oauth2/auth".into(),
            token_uri: "https://oauth2.googleapis.com/token".into(),
            redirect_uri: "urn:ietf:wg:oauth:2.0:oob".into(),
            scopes: vec!["https://www.googleapis.com/auth/drive".into()],
        }
    }

    #[tokio::test]
    async fn missing_user_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path().join("users.db")).await.unwrap();
        assert!(db.load_user(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path().join("nested").join("users.db"))
            .await
            .unwrap();

        let mut record = UserRecord::new(5);
        record.pending = Some(pending());
        db.save_user(&record).await.unwrap();
        let stored = db.load_user(5).await.unwrap().unwrap();
        assert_eq!(stored.pending, Some(pending()));

        record.pending = None;
        record.token = Some(TokenBundle {
            access_token: "a".into(),
            refresh_token: Some("r".into()),
            token_uri: "https://oauth2.googleapis.com/token".into(),
            client_id: "id".into(),
            client_secret: "s".into(),
            scopes: vec![],
            expiry: Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap(),
        });
        record.rclone_config = Some(PathBuf::from("wcl/5_cine.conf"));
        db.save_user(&record).await.unwrap();

        let stored = db.load_user(5).await.unwrap().unwrap();
        assert!(stored.pending.is_none());
        assert_eq!(stored.token, record.token);
        assert_eq!(stored.rclone_config, Some(PathBuf::from("wcl/5_cine.conf")));
    }
}
