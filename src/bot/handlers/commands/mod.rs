use super::format::help_text;
use super::shared::{
    cancel_transfer, command_argument, resolve_upload_path, show_transfer_status, start_authorization,
    start_upload, HandlerResult,
};
use super::state::{sender_user_id, BotState};
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum BotCommand {
    #[command(description = "Начать работу")]
    Start,
    #[command(description = "Справка")]
    Help,
    #[command(description = "Подключить Google Drive")]
    Rclone,
    #[command(description = "Выгрузить файл на Google Drive")]
    Upload,
    #[command(description = "Состояние выгрузки")]
    Status,
    #[command(description = "Отменить выгрузку")]
    Cancel,
}

pub fn handler() -> teloxide::dispatching::UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    teloxide::filter_command::<BotCommand, _>()
        .branch(dptree::case![BotCommand::Start].endpoint(cmd_help))
        .branch(dptree::case![BotCommand::Help].endpoint(cmd_help))
        .branch(dptree::case![BotCommand::Rclone].endpoint(cmd_rclone))
        .branch(dptree::case![BotCommand::Upload].endpoint(cmd_upload))
        .branch(dptree::case![BotCommand::Status].endpoint(cmd_status))
        .branch(dptree::case![BotCommand::Cancel].endpoint(cmd_cancel))
}

pub async fn cmd_help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, help_text())
        .reply_markup(crate::bot::keyboards::user_menu())
        .await?;
    Ok(())
}

pub async fn cmd_rclone(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Some(user_id) = sender_user_id(&msg) else {
        return Ok(());
    };
    start_authorization(&bot, msg.chat.id, user_id, &state).await
}

async fn cmd_upload(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Some(user_id) = sender_user_id(&msg) else {
        return Ok(());
    };

    let arg = command_argument(msg.text().unwrap_or(""));
    let Some(file_path) = resolve_upload_path(&state.config.download_dir, arg) else {
        bot.send_message(
            msg.chat.id,
            "Использование: /upload <файл>\nПуть указывается относительно папки загрузок.",
        )
        .await?;
        return Ok(());
    };
    tracing::info!(user_id = user_id, file = %file_path.display(), "Received /upload command");

    start_upload(&bot, msg.chat.id, user_id, &state, file_path).await
}

pub async fn cmd_status(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Some(user_id) = sender_user_id(&msg) else {
        return Ok(());
    };
    show_transfer_status(&bot, msg.chat.id, user_id, &state, None).await
}

async fn cmd_cancel(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Some(user_id) = sender_user_id(&msg) else {
        return Ok(());
    };
    let text = if cancel_transfer(&state, user_id).await {
        "Отменяю выгрузку…"
    } else {
        "Активных выгрузок нет."
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
