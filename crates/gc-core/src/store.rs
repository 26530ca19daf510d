use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::Mutex;

use crate::{
    domain::ChatId,
    model::{BroadcastSpec, ChatConfig},
    Result,
};

/// Partial write against one ChatConfig.
///
/// `None` fields are left untouched, so concurrent updates on disjoint fields
/// compose. Same-field writes race last-write-wins at the store level; callers
/// that must not lose updates hold the chat's `ChatLocks` entry first.
#[derive(Clone, Debug, Default)]
pub struct ConfigPatch {
    pub anti_link: Option<bool>,
    pub anti_mention: Option<bool>,
    pub banned_words: Option<Vec<String>>,
    pub recurring_broadcasts: Option<Vec<BroadcastSpec>>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.anti_link.is_none()
            && self.anti_mention.is_none()
            && self.banned_words.is_none()
            && self.recurring_broadcasts.is_none()
    }
}

/// Port for the persistent per-chat configuration store.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Idempotent: returns the existing config or inserts one with defaults.
    async fn get_or_create(&self, chat_id: ChatId) -> Result<ChatConfig>;

    /// Applies a partial write (upserting the document if missing).
    async fn update(&self, chat_id: ChatId, patch: ConfigPatch) -> Result<()>;

    /// Lazy, restartable stream of every config whose broadcast list is
    /// non-empty. Intended for the scheduler's scan; never materializes the
    /// full set up front.
    async fn with_broadcasts(&self) -> Result<BoxStream<'static, Result<ChatConfig>>>;
}

/// In-memory ConfigStore over a mutexed map.
///
/// Reference implementation for unit tests; counts underlying writes so
/// idempotence is assertable.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<i64, ChatConfig>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn get(&self, chat_id: ChatId) -> Option<ChatConfig> {
        self.inner.lock().await.get(&chat_id.0).cloned()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get_or_create(&self, chat_id: ChatId) -> Result<ChatConfig> {
        let mut map = self.inner.lock().await;
        if let Some(cfg) = map.get(&chat_id.0) {
            return Ok(cfg.clone());
        }
        let cfg = ChatConfig::new(chat_id.0);
        map.insert(chat_id.0, cfg.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(cfg)
    }

    async fn update(&self, chat_id: ChatId, patch: ConfigPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut map = self.inner.lock().await;
        let cfg = map
            .entry(chat_id.0)
            .or_insert_with(|| ChatConfig::new(chat_id.0));
        if let Some(v) = patch.anti_link {
            cfg.anti_link = v;
        }
        if let Some(v) = patch.anti_mention {
            cfg.anti_mention = v;
        }
        if let Some(words) = patch.banned_words {
            cfg.banned_words = words;
        }
        if let Some(specs) = patch.recurring_broadcasts {
            cfg.recurring_broadcasts = specs;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn with_broadcasts(&self) -> Result<BoxStream<'static, Result<ChatConfig>>> {
        let map = self.inner.lock().await;
        let mut configs: Vec<ChatConfig> = map
            .values()
            .filter(|c| !c.recurring_broadcasts.is_empty())
            .cloned()
            .collect();
        configs.sort_by_key(|c| c.chat_id);
        Ok(stream::iter(configs.into_iter().map(Ok)).boxed())
    }
}
