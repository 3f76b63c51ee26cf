//! Клавиатуры бота: inline и постоянные reply-кнопки.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

pub const BTN_CONNECT_DRIVE: &str = "🔐 Подключить Google Drive";
pub const BTN_TRANSFER_STATUS: &str = "📊 Статус выгрузки";
pub const BTN_HELP: &str = "❓ Помощь";

pub fn user_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new(BTN_CONNECT_DRIVE),
            KeyboardButton::new(BTN_TRANSFER_STATUS),
        ],
        vec![KeyboardButton::new(BTN_HELP)],
    ])
    .resize_keyboard()
    .persistent()
}

pub fn authorize_buttons(
    auth_url: &str,
    tg_user_id: i64,
) -> Result<InlineKeyboardMarkup, anyhow::Error> {
    let url = reqwest::Url::parse(auth_url)?;
    Ok(InlineKeyboardMarkup::default().append_row(vec![
        InlineKeyboardButton::url("🔑 Авторизовать", url),
        InlineKeyboardButton::callback("✖️ Закрыть", format!("close:{}", tg_user_id)),
    ]))
}

pub fn transfer_buttons(tg_user_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default().append_row(vec![
        InlineKeyboardButton::callback("🔄 Обновить", format!("status:{}", tg_user_id)),
        InlineKeyboardButton::callback("⛔ Отменить", format!("cancel:{}", tg_user_id)),
    ])
}
