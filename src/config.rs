//! Конфигурация бота (TOML).

use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
const DEFAULT_DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Пустой список: бот доступен всем.
    #[serde(default)]
    pub authorized_user_ids: Vec<i64>,
    /// Если не задан, записи пользователей живут только в памяти.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default)]
    pub rclone: RcloneSection,
    pub oauth: OAuthSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RcloneSection {
    #[serde(default = "default_rclone_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_remote_name")]
    pub remote_name: String,
}

impl Default for RcloneSection {
    fn default() -> Self {
        Self {
            binary: default_rclone_binary(),
            remote_name: default_remote_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthSection {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("wcl")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_rclone_binary() -> PathBuf {
    PathBuf::from("rclone")
}

fn default_remote_name() -> String {
    "cine".to_string()
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

fn default_scopes() -> Vec<String> {
    vec![DEFAULT_DRIVE_SCOPE.to_string()]
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Не удалось прочитать конфиг {}: {}", path.display(), e)
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, anyhow::Error> {
        let config: Config =
            toml::from_str(raw).map_err(|e| anyhow::anyhow!("Некорректный конфиг: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.oauth.client_id.trim().is_empty() {
            anyhow::bail!("oauth.client_id не может быть пустым");
        }
        if self.oauth.client_secret.trim().is_empty() {
            anyhow::bail!("oauth.client_secret не может быть пустым");
        }
        if self.oauth.scopes.is_empty() {
            anyhow::bail!("oauth.scopes не может быть пустым");
        }
        let remote = self.rclone.remote_name.trim();
        if remote.is_empty() || remote.contains([':', '[', ']', '/']) {
            anyhow::bail!("Некорректное rclone.remote_name: {:?}", self.rclone.remote_name);
        }
        Ok(())
    }

    /// Токен из файла, иначе из переменной окружения BOT_TOKEN.
    pub fn bot_token(&self) -> Result<String, anyhow::Error> {
        if let Some(token) = self.bot_token.as_deref()
            && !token.trim().is_empty()
        {
            return Ok(token.trim().to_string());
        }
        std::env::var("BOT_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Не задан bot_token в конфиге и BOT_TOKEN в окружении"))
    }

    pub fn is_authorized(&self, user_id: i64) -> bool {
        self.authorized_user_ids.is_empty() || self.authorized_user_ids.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        bot_token = "123:abc"

        [oauth]
        client_id = "id.apps.googleusercontent.com"
        client_secret = "secret"
    "#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.work_dir, PathBuf::from("wcl"));
        assert_eq!(config.download_dir, PathBuf::from("downloads"));
        assert_eq!(config.rclone.binary, PathBuf::from("rclone"));
        assert_eq!(config.rclone.remote_name, "cine");
        assert_eq!(config.oauth.redirect_uri, DEFAULT_REDIRECT_URI);
        assert_eq!(config.oauth.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(config.oauth.scopes, vec![DEFAULT_DRIVE_SCOPE.to_string()]);
        assert!(config.db_path.is_none());
        assert_eq!(config.bot_token().unwrap(), "123:abc");
    }

    #[test]
    fn empty_authorized_list_allows_everyone() {
        let config = Config::parse(MINIMAL).unwrap();
        assert!(config.is_authorized(1));
        assert!(config.is_authorized(42));
    }

    #[test]
    fn authorized_list_restricts_access() {
        let raw = format!("authorized_user_ids = [7, 8]\n{}", MINIMAL);
        let config = Config::parse(&raw).unwrap();
        assert!(config.is_authorized(7));
        assert!(!config.is_authorized(9));
    }

    #[test]
    fn rejects_empty_client_secret() {
        let raw = r#"
            [oauth]
            client_id = "id"
            client_secret = "  "
        "#;
        assert!(Config::parse(raw).is_err());
    }

    #[test]
    fn rejects_remote_name_with_colon() {
        let raw = format!("{}\n[rclone]\nremote_name = \"bad:name\"\n", MINIMAL);
        assert!(Config::parse(&raw).is_err());
    }
}
