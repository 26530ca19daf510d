//! Recording MessagingPort fake shared by core unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{port::MessagingPort, types::InlineKeyboard},
    model::BroadcastSpec,
    Result,
};

#[derive(Default)]
pub struct RecordingMessenger {
    /// Chats whose deliveries should fail with a transport error.
    pub fail_chats: HashSet<i64>,
    pub delivered: Mutex<Vec<(i64, BroadcastSpec)>>,
    pub deleted: Mutex<Vec<MessageRef>>,
    pub texts: Mutex<Vec<(i64, String)>>,
    pub admins: Mutex<HashSet<UserId>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(chat_ids: &[i64]) -> Self {
        Self {
            fail_chats: chat_ids.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    async fn deliver(&self, chat_id: ChatId, content: &BroadcastSpec) -> Result<MessageRef> {
        if self.fail_chats.contains(&chat_id.0) {
            return Err(Error::Transport("simulated delivery failure".to_string()));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((chat_id.0, content.clone()));
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(1),
        })
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.texts
            .lock()
            .unwrap()
            .push((chat_id.0, text.to_string()));
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(1),
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.deleted.lock().unwrap().push(msg);
        Ok(())
    }

    async fn list_admins(&self, _chat_id: ChatId) -> Result<HashSet<UserId>> {
        Ok(self.admins.lock().unwrap().clone())
    }

    async fn send_menu(
        &self,
        chat_id: ChatId,
        _text: &str,
        _keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(1),
        })
    }

    async fn edit_menu(
        &self,
        _msg: MessageRef,
        _text: &str,
        _keyboard: InlineKeyboard,
    ) -> Result<()> {
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
        Ok(())
    }
}
