use std::collections::HashSet;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef, UserId},
    messaging::types::InlineKeyboard,
    model::BroadcastSpec,
    Result,
};

/// Messaging gateway port.
///
/// Telegram is the first implementation; the shape keeps the core free of
/// transport types so the scheduler and panel can be tested against fakes.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Deliver one broadcast: text/photo/video plus optional url buttons.
    async fn deliver(&self, chat_id: ChatId, content: &BroadcastSpec) -> Result<MessageRef>;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    /// Current administrators of a chat (used by moderation's admin bypass).
    async fn list_admins(&self, chat_id: ChatId) -> Result<HashSet<UserId>>;

    async fn send_menu(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn edit_menu(&self, msg: MessageRef, text: &str, keyboard: InlineKeyboard)
        -> Result<()>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
