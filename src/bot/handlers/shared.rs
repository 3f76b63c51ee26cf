use super::format::{rclone_setup_text, render_transfer_status};
use super::state::BotState;
use crate::oauth::OAuthError;
use crate::rclone::{TransferError, TransferStatus};
use anyhow::anyhow;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Путь к файлу внутри папки загрузок; абсолютные пути и `..` запрещены.
pub fn resolve_upload_path(download_dir: &Path, arg: &str) -> Option<PathBuf> {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        return None;
    }
    let relative = Path::new(trimmed);
    if !relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return None;
    }
    Some(download_dir.join(relative))
}

/// Всё, что идёт после команды: имена файлов могут содержать пробелы.
pub fn command_argument(text: &str) -> &str {
    text.split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .unwrap_or("")
}

pub fn parse_callback_user_id(data: &str, prefix: &str) -> Result<i64, anyhow::Error> {
    data.strip_prefix(prefix)
        .ok_or_else(|| anyhow!("Некорректный callback payload"))?
        .parse::<i64>()
        .map_err(|_| anyhow!("Некорректный tg_user_id"))
}

pub fn callback_message_target(q: &CallbackQuery) -> Option<(ChatId, MessageId)> {
    q.message.as_ref().map(|msg| (msg.chat().id, msg.id()))
}

pub fn callback_prefix_filter(prefix: &'static str) -> impl Fn(CallbackQuery) -> Option<CallbackQuery> {
    move |q: CallbackQuery| {
        if q.data.as_deref().is_some_and(|payload| payload.starts_with(prefix)) {
            Some(q)
        } else {
            None
        }
    }
}

/// Проверяет, что кнопку нажал владелец сообщения.
pub async fn require_owner_callback(
    bot: &Bot,
    q: &CallbackQuery,
    prefix: &str,
) -> Result<Option<i64>, anyhow::Error> {
    let owner_id = parse_callback_user_id(q.data.as_deref().unwrap_or(""), prefix)?;
    if q.from.id.0 as i64 != owner_id {
        bot.answer_callback_query(q.id.clone())
            .text("Эта кнопка не для вас")
            .show_alert(true)
            .await?;
        return Ok(None);
    }
    Ok(Some(owner_id))
}

pub async fn start_authorization(
    bot: &Bot,
    chat_id: ChatId,
    tg_user_id: i64,
    state: &BotState,
) -> HandlerResult {
    tracing::info!(tg_user_id = tg_user_id, "Rclone authorization requested");
    let url = match state.auth.begin(tg_user_id).await {
        Ok(url) => url,
        Err(error) => {
            tracing::error!(tg_user_id = tg_user_id, error = %error, "Error in rclone command");
            bot.send_message(chat_id, format!("Ошибка: {}", error))
                .await?;
            return Ok(());
        }
    };

    let keyboard = crate::bot::keyboards::authorize_buttons(&url, tg_user_id)?;
    bot.send_message(chat_id, rclone_setup_text())
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

/// Если пользователь ждёт ввода кода авторизации, обрабатывает сообщение как код.
pub async fn try_process_authorization_code(
    bot: &Bot,
    msg: &Message,
    state: &BotState,
    tg_user_id: i64,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let text = msg.text().unwrap_or("");
    if text.starts_with('/') || !state.users.has_pending_authorization(tg_user_id).await? {
        return Ok(false);
    }

    match state.auth.complete(tg_user_id, text).await {
        Ok(_) => {
            bot.send_message(
                msg.chat.id,
                "Google Drive подключён! Теперь файлы можно выгружать командой /upload <файл>.",
            )
            .reply_markup(crate::bot::keyboards::user_menu())
            .await?;
        }
        Err(OAuthError::EmptyCode) => {
            bot.send_message(msg.chat.id, "Отправьте код авторизации текстом.")
                .await?;
        }
        Err(error) => {
            bot.send_message(
                msg.chat.id,
                format!("Ошибка: {}\n\nПопробуйте ещё раз через /rclone.", error),
            )
            .reply_markup(crate::bot::keyboards::user_menu())
            .await?;
        }
    }
    Ok(true)
}

pub async fn start_upload(
    bot: &Bot,
    chat_id: ChatId,
    tg_user_id: i64,
    state: &BotState,
    file_path: PathBuf,
) -> HandlerResult {
    let record = state.users.get(tg_user_id).await?;
    if record.rclone_config.is_none() {
        bot.send_message(chat_id, TransferError::NotConfigured.to_string())
            .await?;
        return Ok(());
    }
    if !tokio::fs::try_exists(&file_path).await.unwrap_or(false) {
        bot.send_message(chat_id, "Файл не найден в папке загрузок.")
            .await?;
        return Ok(());
    }

    let name = file_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let status = Arc::new(TransferStatus::new(name));
    let already_running = {
        let mut active = state.active_transfers.lock().await;
        if active.contains_key(&tg_user_id) {
            true
        } else {
            active.insert(tg_user_id, status.clone());
            false
        }
    };
    if already_running {
        bot.send_message(
            chat_id,
            "У вас уже идёт выгрузка. Дождитесь её окончания или отмените через /cancel.",
        )
        .await?;
        return Ok(());
    }

    tracing::info!(
        tg_user_id = tg_user_id,
        file = %file_path.display(),
        "Upload queued"
    );
    bot.send_message(chat_id, render_transfer_status(&status.snapshot()))
        .reply_markup(crate::bot::keyboards::transfer_buttons(tg_user_id))
        .await?;

    let bot = bot.clone();
    let state = state.clone();
    tokio::spawn(async move {
        let result = state
            .transfer
            .upload(&status, record.rclone_config.as_deref(), &file_path)
            .await;
        state.active_transfers.lock().await.remove(&tg_user_id);

        let text = match result {
            Ok(link) => {
                tracing::info!(tg_user_id = tg_user_id, file = %status.name(), "Upload finished");
                format!("✅ Файл {} выгружен.\n\n{}", status.name(), link)
            }
            Err(error) if error.is_cancelled() => {
                format!("Выгрузка {} отменена.", status.name())
            }
            Err(error) => {
                tracing::error!(
                    tg_user_id = tg_user_id,
                    file = %status.name(),
                    error = %error,
                    "Error in rclone upload"
                );
                format!("❌ Ошибка выгрузки {}: {}", status.name(), error)
            }
        };
        if let Err(error) = bot.send_message(chat_id, text).await {
            tracing::warn!(
                tg_user_id = tg_user_id,
                error = %error,
                "Не удалось отправить результат выгрузки"
            );
        }
    });
    Ok(())
}

pub async fn show_transfer_status(
    bot: &Bot,
    chat_id: ChatId,
    tg_user_id: i64,
    state: &BotState,
    message_id: Option<MessageId>,
) -> HandlerResult {
    let status = state.active_transfers.lock().await.get(&tg_user_id).cloned();
    let Some(status) = status else {
        let text = "Активных выгрузок нет.";
        if let Some(message_id) = message_id {
            bot.edit_message_text(chat_id, message_id, text).await?;
        } else {
            bot.send_message(chat_id, text)
                .reply_markup(crate::bot::keyboards::user_menu())
                .await?;
        }
        return Ok(());
    };

    let text = render_transfer_status(&status.snapshot());
    let keyboard = crate::bot::keyboards::transfer_buttons(tg_user_id);
    if let Some(message_id) = message_id {
        bot.edit_message_text(chat_id, message_id, text)
            .reply_markup(keyboard)
            .await?;
    } else {
        bot.send_message(chat_id, text).reply_markup(keyboard).await?;
    }
    Ok(())
}

/// Возвращает false, если отменять нечего.
pub async fn cancel_transfer(state: &BotState, tg_user_id: i64) -> bool {
    let status = state.active_transfers.lock().await.get(&tg_user_id).cloned();
    match status {
        Some(status) => {
            tracing::info!(tg_user_id = tg_user_id, file = %status.name(), "Cancelling upload");
            status.cancel();
            true
        }
        None => false,
    }
}
