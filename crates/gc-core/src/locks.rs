use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-chat async mutex map.
///
/// The store's partial updates are last-write-wins on the same field, so every
/// ChatConfig mutation in this instance (panel toggles, wizard completions,
/// scheduler batch writes) takes the chat's lock first. That serializes
/// writers per chat instead of silently losing updates.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
