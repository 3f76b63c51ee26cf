use crate::config::Config;
use crate::oauth::{AuthorizationManager, GoogleTokenClient};
use crate::rclone::{RcloneTransfer, TransferStatus};
use crate::users::UserStore;
use std::collections::HashMap;
use std::sync::Arc;
use teloxide::types::Message;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct BotState {
    pub config: Arc<Config>,
    pub users: Arc<UserStore>,
    pub auth: Arc<AuthorizationManager<GoogleTokenClient>>,
    pub transfer: Arc<RcloneTransfer>,
    /// Не больше одной активной выгрузки на пользователя.
    pub active_transfers: Arc<Mutex<HashMap<i64, Arc<TransferStatus>>>>,
}

pub fn sender_user_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().map(|user| user.id.0 as i64)
}
