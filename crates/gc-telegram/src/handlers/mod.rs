//! Telegram update handlers.
//!
//! Thin dispatch layer: routes each update to the panel, the wizard or the
//! moderation engine. Failures inside one update are logged and isolated;
//! nothing here ever takes down the dispatch loop.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use crate::router::AppState;

mod callback;
mod message;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    message::handle_message(msg, state).await
}
