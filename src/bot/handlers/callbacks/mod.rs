use super::shared::{
    callback_message_target, callback_prefix_filter, cancel_transfer, require_owner_callback,
    show_transfer_status, HandlerResult,
};
use super::state::BotState;
use teloxide::dptree;
use teloxide::prelude::*;

pub fn handler() -> teloxide::dispatching::UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    Update::filter_callback_query()
        .branch(dptree::filter_map(callback_prefix_filter("close:")).endpoint(callback_close))
        .branch(dptree::filter_map(callback_prefix_filter("cancel:")).endpoint(callback_cancel))
        .branch(dptree::filter_map(callback_prefix_filter("status:")).endpoint(callback_status))
}

async fn callback_close(bot: Bot, q: CallbackQuery) -> HandlerResult {
    if require_owner_callback(&bot, &q, "close:").await?.is_none() {
        return Ok(());
    }

    bot.answer_callback_query(q.id.clone()).await?;
    if let Some((chat_id, message_id)) = callback_message_target(&q) {
        bot.delete_message(chat_id, message_id).await?;
    }
    Ok(())
}

async fn callback_cancel(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    let Some(tg_user_id) = require_owner_callback(&bot, &q, "cancel:").await? else {
        return Ok(());
    };
    tracing::info!(tg_user_id = tg_user_id, "Cancel callback received");

    let text = if cancel_transfer(&state, tg_user_id).await {
        "Отменяю выгрузку…"
    } else {
        "Активных выгрузок нет"
    };
    bot.answer_callback_query(q.id.clone()).text(text).await?;

    if let Some((chat_id, message_id)) = callback_message_target(&q) {
        bot.edit_message_reply_markup(chat_id, message_id)
            .reply_markup(teloxide::types::InlineKeyboardMarkup::default())
            .await?;
    }
    Ok(())
}

async fn callback_status(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    let Some(tg_user_id) = require_owner_callback(&bot, &q, "status:").await? else {
        return Ok(());
    };

    bot.answer_callback_query(q.id.clone()).await?;
    if let Some((chat_id, message_id)) = callback_message_target(&q) {
        show_transfer_status(&bot, chat_id, tg_user_id, &state, Some(message_id)).await?;
    }
    Ok(())
}
