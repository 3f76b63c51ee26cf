use super::commands::{cmd_help, cmd_rclone, cmd_status};
use super::shared::{try_process_authorization_code, HandlerResult};
use super::state::{sender_user_id, BotState};
use crate::bot::keyboards::{BTN_CONNECT_DRIVE, BTN_HELP, BTN_TRANSFER_STATUS};
use teloxide::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextRoute {
    ConnectDrive,
    TransferStatus,
    Help,
    /// Код авторизации, если он ожидается, иначе подсказка.
    Other,
}

/// Кнопки меню разбираются раньше кода авторизации.
fn route_text(text: &str) -> TextRoute {
    match text {
        BTN_CONNECT_DRIVE => TextRoute::ConnectDrive,
        BTN_TRANSFER_STATUS => TextRoute::TransferStatus,
        BTN_HELP => TextRoute::Help,
        _ => TextRoute::Other,
    }
}

pub async fn handle_text_message(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(user_id) = sender_user_id(&msg) else {
        return Ok(());
    };

    match route_text(text) {
        TextRoute::ConnectDrive => {
            cmd_rclone(bot, msg, state).await?;
        }
        TextRoute::TransferStatus => {
            cmd_status(bot, msg, state).await?;
        }
        TextRoute::Help => {
            cmd_help(bot, msg).await?;
        }
        TextRoute::Other => {
            if try_process_authorization_code(&bot, &msg, &state, user_id).await? {
                return Ok(());
            }
            bot.send_message(msg.chat.id, "Не понял запрос. Используйте кнопки меню ниже.")
                .reply_markup(crate::bot::keyboards::user_menu())
                .await?;
        }
    }
    Ok(())
}
