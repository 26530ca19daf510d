//! Telegram adapter (teloxide).
//!
//! This crate implements the `gc-core` MessagingPort over the Telegram Bot API.

use std::collections::HashSet;

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile},
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use gc_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{port::MessagingPort, types::InlineKeyboard},
    model::{BroadcastSpec, ContentKind, UrlButton},
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Transport(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    /// Url buttons, one per row. Buttons whose url fails to parse are dropped
    /// at render time rather than failing the whole send.
    fn url_markup(buttons: &[UrlButton]) -> Option<InlineKeyboardMarkup> {
        if buttons.is_empty() {
            return None;
        }
        let mut rows = Vec::new();
        for b in buttons {
            let Ok(parsed) = url::Url::parse(&b.url) else {
                tracing::warn!(url = %b.url, "skipping button with unparseable url");
                continue;
            };
            rows.push(vec![InlineKeyboardButton::url(b.label.clone(), parsed)]);
        }
        if rows.is_empty() {
            None
        } else {
            Some(InlineKeyboardMarkup::new(rows))
        }
    }

    fn callback_markup(keyboard: InlineKeyboard) -> InlineKeyboardMarkup {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .buttons
            .into_iter()
            .map(|b| vec![InlineKeyboardButton::callback(b.label, b.callback_data)])
            .collect();
        InlineKeyboardMarkup::new(rows)
    }

    fn msg_ref(chat_id: ChatId, msg: &teloxide::types::Message) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn deliver(&self, chat_id: ChatId, content: &BroadcastSpec) -> Result<MessageRef> {
        let markup = Self::url_markup(&content.buttons);
        let chat = Self::tg_chat(chat_id);

        let msg = match content.kind {
            ContentKind::Text => {
                self.with_retry(|| {
                    let mut req = self.bot.send_message(chat, content.text.clone());
                    if let Some(m) = markup.clone() {
                        req = req.reply_markup(m);
                    }
                    req
                })
                .await?
            }
            ContentKind::Photo => {
                let file_ref = content.file_ref.clone().ok_or_else(|| {
                    Error::Validation("photo broadcast without file_ref".to_string())
                })?;
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_photo(chat, InputFile::file_id(file_ref.clone()))
                        .caption(content.text.clone());
                    if let Some(m) = markup.clone() {
                        req = req.reply_markup(m);
                    }
                    req
                })
                .await?
            }
            ContentKind::Video => {
                let file_ref = content.file_ref.clone().ok_or_else(|| {
                    Error::Validation("video broadcast without file_ref".to_string())
                })?;
                self.with_retry(|| {
                    let mut req = self
                        .bot
                        .send_video(chat, InputFile::file_id(file_ref.clone()))
                        .caption(content.text.clone());
                    if let Some(m) = markup.clone() {
                        req = req.reply_markup(m);
                    }
                    req
                })
                .await?
            }
        };

        Ok(Self::msg_ref(chat_id, &msg))
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await?;
        Ok(Self::msg_ref(chat_id, &msg))
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn list_admins(&self, chat_id: ChatId) -> Result<HashSet<UserId>> {
        let members = self
            .with_retry(|| self.bot.get_chat_administrators(Self::tg_chat(chat_id)))
            .await?;
        Ok(members
            .into_iter()
            .map(|m| UserId(m.user.id.0 as i64))
            .collect())
    }

    async fn send_menu(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let markup = Self::callback_markup(keyboard);
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
                    .reply_markup(markup.clone())
            })
            .await?;
        Ok(Self::msg_ref(chat_id, &msg))
    }

    async fn edit_menu(
        &self,
        msg: MessageRef,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        let markup = Self::callback_markup(keyboard);
        self.with_retry(|| {
            self.bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    text.to_string(),
                )
                .reply_markup(markup.clone())
        })
        .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }
}
