//! Записи пользователей. Все чтения и изменения проходят через [`UserStore`].

use crate::db::Db;
use crate::oauth::{PendingAuthorization, TokenBundle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub tg_user_id: i64,
    /// Маркер незавершённой авторизации.
    pub pending: Option<PendingAuthorization>,
    pub token: Option<TokenBundle>,
    pub rclone_config: Option<PathBuf>,
}

impl UserRecord {
    pub fn new(tg_user_id: i64) -> Self {
        Self {
            tg_user_id,
            pending: None,
            token: None,
            rclone_config: None,
        }
    }
}

/// Кэш записей в памяти; при настроенной БД каждое изменение сразу сохраняется.
pub struct UserStore {
    records: Mutex<HashMap<i64, UserRecord>>,
    db: Option<Arc<Db>>,
}

impl UserStore {
    pub fn in_memory() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            db: None,
        }
    }

    pub fn with_db(db: Arc<Db>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            db: Some(db),
        }
    }

    pub async fn get(&self, tg_user_id: i64) -> Result<UserRecord, anyhow::Error> {
        let mut records = self.records.lock().await;
        let record = self.load_locked(&mut records, tg_user_id).await?;
        Ok(record.clone())
    }

    pub async fn update<F, R>(&self, tg_user_id: i64, mutate: F) -> Result<R, anyhow::Error>
    where
        F: FnOnce(&mut UserRecord) -> R,
    {
        let mut records = self.records.lock().await;
        let current = self.load_locked(&mut records, tg_user_id).await?;
        // Кэш меняется только после успешной записи в БД.
        let mut updated = current.clone();
        let result = mutate(&mut updated);
        if let Some(db) = &self.db {
            db.save_user(&updated).await?;
        }
        *current = updated;
        Ok(result)
    }

    pub async fn has_pending_authorization(&self, tg_user_id: i64) -> Result<bool, anyhow::Error> {
        Ok(self.get(tg_user_id).await?.pending.is_some())
    }

    async fn load_locked<'a>(
        &self,
        records: &'a mut HashMap<i64, UserRecord>,
        tg_user_id: i64,
    ) -> Result<&'a mut UserRecord, anyhow::Error> {
        if !records.contains_key(&tg_user_id) {
            let stored = match &self.db {
                Some(db) => db.load_user(tg_user_id).await?,
                None => None,
            };
            records.insert(tg_user_id, stored.unwrap_or_else(|| UserRecord::new(tg_user_id)));
        }
        Ok(records
            .entry(tg_user_id)
            .or_insert_with(|| UserRecord::new(tg_user_id)))
    }
}
