//! Привязка Google Drive пользователя: ссылка авторизации, обмен кода на токены,
//! генерация rclone-конфига.
//!
//! Между `begin` и `complete` живёт только [`PendingAuthorization`] в записи
//! пользователя, поэтому незавершённая авторизация переживает перезапуск бота,
//! если настроена БД.

use crate::config::OAuthSection;
use crate::rclone::{render_drive_stanza, user_config_path};
use crate::users::UserStore;
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("No pending authorization found")]
    NoPending,
    #[error("Код авторизации пустой")]
    EmptyCode,
    #[error("Google отклонил авторизацию: {0}")]
    Denied(String),
    #[error("Failed to save token: {0}")]
    Exchange(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Незавершённая авторизация: параметры провайдера на момент `begin`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingAuthorization {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub state: String,
    pub client_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl PendingAuthorization {
    pub fn new(oauth: &OAuthSection) -> Self {
        let mut state = [0u8; 16];
        rand::rng().fill(&mut state);
        Self {
            id: Alphanumeric.sample_string(&mut rand::rng(), 16),
            created_at: Utc::now(),
            state: hex::encode(state),
            client_id: oauth.client_id.clone(),
            auth_uri: oauth.auth_uri.clone(),
            token_uri: oauth.token_uri.clone(),
            redirect_uri: oauth.redirect_uri.clone(),
            scopes: oauth.scopes.clone(),
        }
    }

    pub fn authorization_url(&self) -> String {
        let scope = self.scopes.join(" ");
        let params: [(&str, &str); 7] = [
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("state", self.state.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ];
        let query = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.auth_uri.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.auth_uri, separator, query)
    }
}

/// Выданные Google токены.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub expiry: DateTime<Utc>,
}

/// Код, присланный пользователем: сам код или целиком redirect-URL с `code=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedCode {
    pub code: String,
    pub state: Option<String>,
}

/// Redirect-URL с `error=` превращается в [`OAuthError::Denied`].
pub fn parse_submitted_code(input: &str) -> Result<SubmittedCode, OAuthError> {
    let trimmed = input.trim().trim_matches('`').trim();
    if trimmed.is_empty() {
        return Err(OAuthError::EmptyCode);
    }

    let Some((_, query)) = trimmed.split_once('?') else {
        return Ok(SubmittedCode {
            code: trimmed.to_string(),
            state: None,
        });
    };

    let query = query.split('#').next().unwrap_or("");
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let decoded = urlencoding::decode(value)
            .map(|value| value.into_owned())
            .unwrap_or_else(|_| value.to_string());
        match key {
            "code" => code = Some(decoded),
            "state" => state = Some(decoded),
            "error" => error = Some(decoded),
            "error_description" => error_description = Some(decoded),
            _ => {}
        }
    }
    if let Some(code) = code.filter(|code| !code.is_empty()) {
        return Ok(SubmittedCode { code, state });
    }
    match (error, error_description) {
        (Some(error), Some(description)) => Err(OAuthError::Denied(format!("{} ({})", error, description))),
        (Some(error), None) => Err(OAuthError::Denied(error)),
        _ => Err(OAuthError::EmptyCode),
    }
}

/// Обмен authorization code на токены у провайдера.
pub trait TokenExchanger: Send + Sync {
    fn exchange_code(
        &self,
        pending: &PendingAuthorization,
        code: &str,
    ) -> impl Future<Output = Result<TokenBundle, anyhow::Error>> + Send;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Token endpoint Google через reqwest.
#[derive(Debug, Clone)]
pub struct GoogleTokenClient {
    http: reqwest::Client,
    client_secret: String,
}

impl GoogleTokenClient {
    pub fn new(client_secret: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_secret: client_secret.into(),
        }
    }
}

impl TokenExchanger for GoogleTokenClient {
    async fn exchange_code(
        &self,
        pending: &PendingAuthorization,
        code: &str,
    ) -> Result<TokenBundle, anyhow::Error> {
        let form = [
            ("code", code),
            ("client_id", pending.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", pending.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];
        let response = self
            .http
            .post(&pending.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Token endpoint недоступен: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|err| match err.error_description {
                    Some(description) => format!("{} ({})", err.error, description),
                    None => err.error,
                })
                .unwrap_or_else(|_| body.trim().to_string());
            anyhow::bail!("{}: {}", status, reason);
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Некорректный ответ token endpoint: {}", e))?;
        let lifetime = payload.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let expiry = chrono::TimeDelta::try_seconds(lifetime)
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .ok_or_else(|| anyhow::anyhow!("Некорректный expires_in: {}", lifetime))?;
        let scopes = payload
            .scope
            .map(|scope| scope.split_whitespace().map(str::to_string).collect())
            .unwrap_or_else(|| pending.scopes.clone());

        Ok(TokenBundle {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
            token_uri: pending.token_uri.clone(),
            client_id: pending.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes,
            expiry,
        })
    }
}

pub struct AuthorizationManager<E> {
    users: Arc<UserStore>,
    exchanger: E,
    oauth: OAuthSection,
    work_dir: PathBuf,
    remote_name: String,
}

impl<E: TokenExchanger> AuthorizationManager<E> {
    pub fn new(
        users: Arc<UserStore>,
        exchanger: E,
        oauth: OAuthSection,
        work_dir: impl Into<PathBuf>,
        remote_name: impl Into<String>,
    ) -> Self {
        Self {
            users,
            exchanger,
            oauth,
            work_dir: work_dir.into(),
            remote_name: remote_name.into(),
        }
    }

    /// Создаёт (или заменяет) незавершённую авторизацию и возвращает ссылку для пользователя.
    pub async fn begin(&self, tg_user_id: i64) -> Result<String, OAuthError> {
        let pending = PendingAuthorization::new(&self.oauth);
        let url = pending.authorization_url();
        let pending_id = pending.id.clone();
        self.users
            .update(tg_user_id, |record| record.pending = Some(pending))
            .await?;
        tracing::info!(
            tg_user_id = tg_user_id,
            pending_id = %pending_id,
            "Authorization started"
        );
        Ok(url)
    }

    /// Обменивает код на токены и пишет rclone-конфиг. Маркер снимается при любом исходе обмена.
    pub async fn complete(&self, tg_user_id: i64, input: &str) -> Result<PathBuf, OAuthError> {
        let record = self.users.get(tg_user_id).await?;
        let Some(pending) = record.pending else {
            return Err(OAuthError::NoPending);
        };
        let submitted = match parse_submitted_code(input) {
            Err(OAuthError::Denied(reason)) => {
                tracing::warn!(
                    tg_user_id = tg_user_id,
                    pending_id = %pending.id,
                    reason = %reason,
                    "Authorization denied by provider"
                );
                self.users
                    .update(tg_user_id, |record| clear_pending(record, &pending.id))
                    .await?;
                return Err(OAuthError::Denied(reason));
            }
            other => other?,
        };

        let outcome = self.exchange_and_write(tg_user_id, &pending, &submitted).await;
        match outcome {
            Ok((token, path)) => {
                let stored_path = path.clone();
                self.users
                    .update(tg_user_id, |record| {
                        clear_pending(record, &pending.id);
                        record.token = Some(token);
                        record.rclone_config = Some(stored_path);
                    })
                    .await?;
                tracing::info!(
                    tg_user_id = tg_user_id,
                    config = %path.display(),
                    "Authorization completed"
                );
                Ok(path)
            }
            Err(error) => {
                tracing::warn!(
                    tg_user_id = tg_user_id,
                    pending_id = %pending.id,
                    error = %error,
                    "Authorization failed"
                );
                self.users
                    .update(tg_user_id, |record| clear_pending(record, &pending.id))
                    .await?;
                Err(OAuthError::Exchange(error.to_string()))
            }
        }
    }

    async fn exchange_and_write(
        &self,
        tg_user_id: i64,
        pending: &PendingAuthorization,
        submitted: &SubmittedCode,
    ) -> Result<(TokenBundle, PathBuf), anyhow::Error> {
        if let Some(state) = submitted.state.as_deref()
            && state != pending.state
        {
            anyhow::bail!("state в ссылке не совпадает с запросом авторизации");
        }
        let token = self.exchanger.exchange_code(pending, &submitted.code).await?;
        let path = write_rclone_config(&self.work_dir, tg_user_id, &self.remote_name, &token).await?;
        Ok((token, path))
    }
}

fn clear_pending(record: &mut crate::users::UserRecord, pending_id: &str) {
    // Повторный /rclone мог заменить маркер, пока шёл обмен.
    if record
        .pending
        .as_ref()
        .is_some_and(|pending| pending.id == pending_id)
    {
        record.pending = None;
    }
}

async fn write_rclone_config(
    work_dir: &Path,
    tg_user_id: i64,
    remote_name: &str,
    token: &TokenBundle,
) -> Result<PathBuf, anyhow::Error> {
    tokio::fs::create_dir_all(work_dir)
        .await
        .map_err(|e| anyhow::anyhow!("Не удалось создать {}: {}", work_dir.display(), e))?;
    let path = user_config_path(work_dir, tg_user_id, remote_name);
    let stanza = render_drive_stanza(remote_name, token)?;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options
        .open(&path)
        .await
        .map_err(|e| anyhow::anyhow!("Не удалось создать {}: {}", path.display(), e))?;
    // mode() действует только при создании; старый файл мог остаться с другими правами.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600)).await?;
    }
    file.write_all(stanza.as_bytes())
        .await
        .map_err(|e| anyhow::anyhow!("Не удалось записать {}: {}", path.display(), e))?;
    file.flush().await?;
    Ok(path)
}
