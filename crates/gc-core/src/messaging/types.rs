use crate::{
    domain::{ChatId, MessageId, UserId},
    model::ContentKind,
};

/// Cross-messenger incoming message model.
///
/// Telegram-specific fields (raw entities, chat kinds) stay in the Telegram
/// adapter; moderation and the wizard only ever see this shape.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub message_id: MessageId,
    /// Message text or media caption; empty when the message carries neither.
    pub text: String,
    /// Transport-parsed structured spans.
    pub has_link_entity: bool,
    pub has_mention_entity: bool,
    /// Attached media, if any: kind + opaque transport handle.
    pub media: Option<(ContentKind, String)>,
    /// Owner or chat administrator, as resolved by the dispatcher.
    pub sender_is_resolved_admin: bool,
}

/// Inline keyboard of callback buttons (panel navigation).
#[derive(Clone, Debug, Default)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    /// Builder convenience for "one button per row" menus.
    pub fn button(mut self, label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        self.buttons.push(InlineButton {
            label: label.into(),
            callback_data: callback_data.into(),
        });
        self
    }
}
