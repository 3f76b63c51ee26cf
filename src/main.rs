//! rclone-drive-bot — Telegram-бот для выгрузки загруженных файлов на личный Google Drive через rclone.

mod bot;
mod config;
mod db;
mod exec;
mod oauth;
mod rclone;
mod users;

use std::path::PathBuf;
use std::sync::Arc;
use teloxide::dispatching::Dispatcher;
use teloxide::prelude::*;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc/rclone-drive-bot.toml"));
    tracing::info!(
        "Starting rclone-drive-bot with config {}",
        config_path.display()
    );

    let config = Arc::new(config::Config::load(&config_path)?);
    let token = config.bot_token()?;
    tracing::info!(
        authorized_count = config.authorized_user_ids.len(),
        work_dir = %config.work_dir.display(),
        download_dir = %config.download_dir.display(),
        rclone_binary = %config.rclone.binary.display(),
        remote_name = %config.rclone.remote_name,
        "Configuration loaded"
    );

    let users = match &config.db_path {
        Some(db_path) => {
            let db = Arc::new(db::Db::open(db_path).await?);
            tracing::info!(db_path = %db_path.display(), "User records are persisted");
            Arc::new(users::UserStore::with_db(db))
        }
        None => {
            tracing::warn!("db_path не задан, привязки Google Drive не переживут перезапуск");
            Arc::new(users::UserStore::in_memory())
        }
    };

    let version = exec::run_command(&config.rclone.binary, ["version"]).await;
    if version.success {
        tracing::info!(
            version = %version.stdout.lines().next().unwrap_or(""),
            "rclone found"
        );
    } else {
        tracing::warn!(
            rclone_binary = %config.rclone.binary.display(),
            stderr = %version.stderr,
            "rclone недоступен, выгрузки будут завершаться ошибкой"
        );
    }

    let auth = Arc::new(oauth::AuthorizationManager::new(
        users.clone(),
        oauth::GoogleTokenClient::new(config.oauth.client_secret.clone()),
        config.oauth.clone(),
        config.work_dir.clone(),
        config.rclone.remote_name.clone(),
    ));
    let transfer = Arc::new(rclone::RcloneTransfer::new(
        rclone::RcloneSettings::from_config(&config),
    ));

    let bot = Bot::new(token);
    let state = bot::handlers::BotState {
        config,
        users,
        auth,
        transfer,
        active_transfers: Arc::new(Mutex::new(std::collections::HashMap::new())),
    };
    tracing::info!("Dispatcher initialized, bot is ready");

    Dispatcher::builder(bot, bot::handlers::schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
