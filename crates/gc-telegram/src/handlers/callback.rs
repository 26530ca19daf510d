use std::sync::Arc;

use teloxide::{prelude::*, types::CallbackQuery};

use gc_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    panel::PanelAction,
};

use crate::router::AppState;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let data = q.data.clone().unwrap_or_default();

    // The panel message we will edit in place.
    let Some(menu_msg) = q.message.as_ref() else {
        let _ = state.messenger.answer_callback(&cb_id, None).await;
        return Ok(());
    };
    let chat_id = ChatId(menu_msg.chat.id.0);
    let admin_id = UserId(q.from.id.0 as i64);

    // Panel is owner-only.
    if admin_id.0 != state.cfg.owner_id {
        let _ = state
            .messenger
            .answer_callback(&cb_id, Some("Not authorized"))
            .await;
        return Ok(());
    }

    let Some(action) = PanelAction::parse(&data) else {
        let _ = state.messenger.answer_callback(&cb_id, None).await;
        return Ok(());
    };

    match state.panel.handle(action, chat_id, admin_id).await {
        Ok(view) => {
            let menu = MessageRef {
                chat_id,
                message_id: MessageId(menu_msg.id.0),
            };
            if let Err(e) = state
                .messenger
                .edit_menu(menu, &view.text, view.keyboard)
                .await
            {
                // Editing to identical content fails on Telegram; harmless.
                tracing::debug!(chat = chat_id.0, "menu edit failed: {e}");
            }
            let _ = state.messenger.answer_callback(&cb_id, None).await;
        }
        Err(e) => {
            tracing::error!(chat = chat_id.0, "panel action {data} failed: {e}");
            let _ = state
                .messenger
                .answer_callback(&cb_id, Some("Something went wrong"))
                .await;
        }
    }

    Ok(())
}
