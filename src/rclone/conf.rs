//! Генерация секции rclone.conf для Google Drive.

use crate::oauth::TokenBundle;
use chrono::SecondsFormat;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Формат поля `token`, который ожидает rclone.
#[derive(Serialize)]
struct RcloneToken<'a> {
    access_token: &'a str,
    token_type: &'static str,
    refresh_token: &'a str,
    expiry: String,
}

pub fn render_drive_stanza(remote: &str, token: &TokenBundle) -> Result<String, serde_json::Error> {
    let blob = serde_json::to_string(&RcloneToken {
        access_token: &token.access_token,
        token_type: "Bearer",
        refresh_token: token.refresh_token.as_deref().unwrap_or(""),
        expiry: token.expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
    })?;

    Ok(format!(
        "[{remote}]\n\
         type = drive\n\
         client_id = {client_id}\n\
         client_secret = {client_secret}\n\
         scope = drive\n\
         token = {blob}\n\
         team_drive = \n\
         root_folder_id = \n",
        remote = remote,
        client_id = token.client_id,
        client_secret = token.client_secret,
        blob = blob,
    ))
}

pub fn user_config_path(work_dir: &Path, tg_user_id: i64, remote: &str) -> PathBuf {
    work_dir.join(format!("{}_{}.conf", tg_user_id, remote))
}
