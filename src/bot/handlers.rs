//! Обработчики команд, кнопок меню и inline-кнопок.

#[path = "handlers/callbacks/mod.rs"]
mod callbacks;
#[path = "handlers/commands/mod.rs"]
mod commands;
#[path = "handlers/format.rs"]
mod format;
#[path = "handlers/menu.rs"]
mod menu;
#[path = "handlers/shared.rs"]
mod shared;
#[path = "handlers/state.rs"]
mod state;

pub use state::BotState;

use teloxide::dispatching::DpHandlerDescription;
use teloxide::dptree;
use teloxide::prelude::*;

/// Апдейты от пользователей вне `authorized_user_ids` молча отбрасываются.
fn is_authorized_update(update: Update, state: BotState) -> bool {
    match update.from() {
        Some(user) => {
            let user_id = user.id.0 as i64;
            let allowed = state.config.is_authorized(user_id);
            if !allowed {
                tracing::debug!(user_id = user_id, "Ignoring update from unauthorized user");
            }
            allowed
        }
        None => false,
    }
}

pub fn schema() -> dptree::Handler<
    'static,
    Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>,
    DpHandlerDescription,
> {
    let message_handler = Update::filter_message()
        .branch(commands::handler())
        .endpoint(menu::handle_text_message);

    dptree::filter(is_authorized_update)
        .branch(message_handler)
        .branch(callbacks::handler())
}
