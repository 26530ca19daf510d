use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{Message, MessageEntityKind},
};

use gc_core::{
    domain::{ChatId, MessageId, UserId},
    messaging::types::InboundMessage,
    model::ContentKind,
};

use crate::router::AppState;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let chat_id = ChatId(msg.chat.id.0);
    let sender_id = UserId(user.id.0 as i64);
    let is_owner = sender_id.0 == state.cfg.owner_id;

    // Owner command opens the panel for this chat.
    if is_owner && is_panel_command(msg.text()) {
        match state.panel.open(chat_id).await {
            Ok(view) => {
                if let Err(e) = state
                    .messenger
                    .send_menu(chat_id, &view.text, view.keyboard)
                    .await
                {
                    tracing::warn!(chat = chat_id.0, "failed to send panel: {e}");
                }
            }
            Err(e) => tracing::error!(chat = chat_id.0, "panel open failed: {e}"),
        }
        return Ok(());
    }

    // An active wizard session for this (chat, admin) consumes the message.
    if state.wizard.is_active(chat_id, sender_id).await {
        let inbound = to_inbound(&msg, sender_id, true);
        match state.wizard.handle_input(&inbound).await {
            Ok(Some(reply)) => {
                let _ = state.messenger.send_text(chat_id, &reply).await;
            }
            Ok(None) => {}
            Err(e) => tracing::error!(chat = chat_id.0, "wizard step failed: {e}"),
        }
        return Ok(());
    }

    // Moderation applies to group chats only.
    if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        return Ok(());
    }

    let is_admin = is_owner || state.admins.is_admin(chat_id, sender_id).await;
    let inbound = to_inbound(&msg, sender_id, is_admin);
    if let Err(e) = state.moderation.handle(&inbound).await {
        tracing::error!(chat = chat_id.0, "moderation failed: {e}");
    }

    Ok(())
}

fn is_panel_command(text: Option<&str>) -> bool {
    let Some(text) = text else {
        return false;
    };
    let Some(cmd) = text.trim().split_whitespace().next() else {
        return false;
    };
    cmd == "/panel" || cmd.starts_with("/panel@")
}

/// Flattens a Telegram message into the transport-agnostic inbound model.
fn to_inbound(msg: &Message, sender_id: UserId, sender_is_resolved_admin: bool) -> InboundMessage {
    let text = msg
        .text()
        .or_else(|| msg.caption())
        .unwrap_or_default()
        .to_string();

    let mut has_link_entity = false;
    let mut has_mention_entity = false;
    let entities = msg
        .entities()
        .unwrap_or(&[])
        .iter()
        .chain(msg.caption_entities().unwrap_or(&[]));
    for entity in entities {
        match &entity.kind {
            MessageEntityKind::Url | MessageEntityKind::TextLink { .. } => has_link_entity = true,
            MessageEntityKind::Mention | MessageEntityKind::TextMention { .. } => {
                has_mention_entity = true
            }
            _ => {}
        }
    }

    let media = if let Some(sizes) = msg.photo() {
        sizes
            .last()
            .map(|p| (ContentKind::Photo, p.file.id.clone()))
    } else {
        msg.video().map(|v| (ContentKind::Video, v.file.id.clone()))
    };

    InboundMessage {
        chat_id: ChatId(msg.chat.id.0),
        sender_id,
        message_id: MessageId(msg.id.0),
        text,
        has_link_entity,
        has_mention_entity,
        media,
        sender_is_resolved_admin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_command_detection() {
        assert!(is_panel_command(Some("/panel")));
        assert!(is_panel_command(Some("  /panel  ")));
        assert!(is_panel_command(Some("/panel@guardcast_bot")));
        assert!(!is_panel_command(Some("/panels")));
        assert!(!is_panel_command(Some("panel")));
        assert!(!is_panel_command(None));
    }
}
