//! Periodic broadcast dispatcher.
//!
//! Each tick streams every chat with a non-empty broadcast list and spawns one
//! unit of work per chat onto a `JoinSet`, gated by a semaphore so concurrency
//! stays bounded. Every outbound delivery is wrapped in a timeout; a failed or
//! timed-out delivery leaves `last_sent` untouched so the spec is retried on
//! the next tick, and it never blocks later specs of the same chat.

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use tokio::{
    sync::Semaphore,
    task::JoinSet,
    time::{interval, timeout, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    domain::ChatId,
    locks::ChatLocks,
    messaging::port::MessagingPort,
    model::{unix_now, BroadcastSpec, ChatConfig},
    store::{ConfigPatch, ConfigStore},
};

#[derive(Clone, Copy, Debug)]
pub struct SchedulerSettings {
    pub tick: Duration,
    pub delivery_timeout: Duration,
    pub max_concurrency: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
            delivery_timeout: Duration::from_secs(30),
            max_concurrency: 16,
        }
    }
}

#[derive(Clone)]
pub struct BroadcastScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    settings: SchedulerSettings,
    store: Arc<dyn ConfigStore>,
    messenger: Arc<dyn MessagingPort>,
    locks: Arc<ChatLocks>,
    permits: Arc<Semaphore>,
}

impl BroadcastScheduler {
    pub fn new(
        settings: SchedulerSettings,
        store: Arc<dyn ConfigStore>,
        messenger: Arc<dyn MessagingPort>,
        locks: Arc<ChatLocks>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));
        Self {
            inner: Arc::new(SchedulerInner {
                settings,
                store,
                messenger,
                locks,
                permits,
            }),
        }
    }

    /// Runs until `cancel` fires. Single-threaded cooperative: sleep, scan,
    /// spawn, drain completions, repeat.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut tick = interval(self.inner.settings.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks: JoinSet<()> = JoinSet::new();

        tracing::info!(
            tick_secs = self.inner.settings.tick.as_secs(),
            max_concurrency = self.inner.settings.max_concurrency,
            "broadcast scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    // Surface completions from earlier ticks without blocking the scan.
                    while let Some(joined) = tasks.try_join_next() {
                        if let Err(e) = joined {
                            tracing::error!("broadcast task panicked: {e}");
                        }
                    }
                    self.scan(&mut tasks).await;
                }
            }
        }

        tasks.shutdown().await;
        tracing::info!("broadcast scheduler stopped");
    }

    async fn scan(&self, tasks: &mut JoinSet<()>) {
        let mut stream = match self.inner.store.with_broadcasts().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("broadcast scan failed: {e}");
                return;
            }
        };

        while let Some(item) = stream.next().await {
            let cfg = match item {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::error!("skipping unreadable config document: {e}");
                    continue;
                }
            };

            let scheduler = self.clone();
            tasks.spawn(async move {
                let Ok(_permit) = scheduler.inner.permits.clone().acquire_owned().await else {
                    return; // semaphore closed, shutting down
                };
                scheduler.dispatch_chat(cfg).await;
            });
        }
    }

    /// Sends every due spec for one chat in stored order, then persists the
    /// changed `last_sent` values in a single batch write.
    ///
    /// Deliveries run against the scan snapshot with no lock held; the write
    /// then re-reads under the chat lock and advances `last_sent` only on
    /// specs still present, so a stop-all or an append that landed during
    /// delivery is never clobbered by the stale snapshot.
    async fn dispatch_chat(&self, cfg: ChatConfig) {
        let chat_id = ChatId(cfg.chat_id);
        let now = unix_now();

        let mut sent: Vec<BroadcastSpec> = Vec::new();
        for spec in &cfg.recurring_broadcasts {
            if !spec.is_due(now) {
                continue;
            }

            let attempt = timeout(
                self.inner.settings.delivery_timeout,
                self.inner.messenger.deliver(chat_id, spec),
            )
            .await;

            match attempt {
                Ok(Ok(_)) => sent.push(spec.clone()),
                Ok(Err(e)) => {
                    // Retried automatically on the next tick.
                    tracing::warn!(chat = chat_id.0, "broadcast delivery failed: {e}");
                }
                Err(_) => {
                    tracing::warn!(chat = chat_id.0, "broadcast delivery timed out");
                }
            }
        }

        if sent.is_empty() {
            return;
        }

        let _guard = self.inner.locks.lock_chat(chat_id.0).await;
        let fresh = match self.inner.store.get_or_create(chat_id).await {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(chat = chat_id.0, "failed to re-read broadcast state: {e}");
                return;
            }
        };

        let mut specs = fresh.recurring_broadcasts;
        let mut changed = false;
        for delivered in &sent {
            if let Some(live) = specs.iter_mut().find(|s| **s == *delivered) {
                live.last_sent = now;
                changed = true;
            }
        }

        if changed {
            let patch = ConfigPatch {
                recurring_broadcasts: Some(specs),
                ..Default::default()
            };
            if let Err(e) = self.inner.store.update(chat_id, patch).await {
                tracing::error!(chat = chat_id.0, "failed to persist broadcast state: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::testing::RecordingMessenger;
    use crate::model::{BroadcastSpec, ContentKind};
    use crate::store::MemoryStore;

    fn spec(text: &str, interval: i64, last_sent: i64) -> BroadcastSpec {
        BroadcastSpec {
            kind: ContentKind::Text,
            text: text.to_string(),
            file_ref: None,
            buttons: Vec::new(),
            interval_seconds: interval,
            last_sent,
        }
    }

    fn scheduler_over(
        store: Arc<MemoryStore>,
        messenger: Arc<RecordingMessenger>,
    ) -> BroadcastScheduler {
        BroadcastScheduler::new(
            SchedulerSettings::default(),
            store,
            messenger,
            Arc::new(ChatLocks::default()),
        )
    }

    async fn seed(store: &MemoryStore, chat: i64, specs: Vec<BroadcastSpec>) {
        store
            .update(
                ChatId(chat),
                ConfigPatch {
                    recurring_broadcasts: Some(specs),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn due_specs_are_sent_and_last_sent_advances() {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let now = unix_now();

        seed(&store, -1, vec![spec("due", 60, now - 61), spec("not-due", 60, now - 10)]).await;

        let scheduler = scheduler_over(store.clone(), messenger.clone());
        let cfg = store.get(ChatId(-1)).await.unwrap();
        scheduler.dispatch_chat(cfg).await;

        assert_eq!(messenger.delivered_count(), 1);
        assert_eq!(messenger.delivered.lock().unwrap()[0].1.text, "due");

        let cfg = store.get(ChatId(-1)).await.unwrap();
        assert!(cfg.recurring_broadcasts[0].last_sent >= now);
        assert_eq!(cfg.recurring_broadcasts[1].last_sent, now - 10);
    }

    #[tokio::test]
    async fn failed_delivery_keeps_last_sent_and_later_specs_still_send() {
        let store = Arc::new(MemoryStore::new());
        // First chat fails, but only at the transport level.
        let messenger = Arc::new(RecordingMessenger::failing_for(&[-1]));

        seed(&store, -1, vec![spec("a", 60, 0), spec("b", 60, 0)]).await;

        let scheduler = scheduler_over(store.clone(), messenger.clone());
        let cfg = store.get(ChatId(-1)).await.unwrap();
        scheduler.dispatch_chat(cfg).await;

        // Nothing delivered, nothing persisted: both retried next tick.
        assert_eq!(messenger.delivered_count(), 0);
        let cfg = store.get(ChatId(-1)).await.unwrap();
        assert_eq!(cfg.recurring_broadcasts[0].last_sent, 0);
        assert_eq!(cfg.recurring_broadcasts[1].last_sent, 0);
    }

    #[tokio::test]
    async fn one_failing_chat_does_not_affect_another() {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::failing_for(&[-1]));

        seed(&store, -1, vec![spec("broken", 60, 0)]).await;
        seed(&store, -2, vec![spec("healthy", 60, 0)]).await;

        let scheduler = scheduler_over(store.clone(), messenger.clone());
        for chat in [-1, -2] {
            let cfg = store.get(ChatId(chat)).await.unwrap();
            scheduler.dispatch_chat(cfg).await;
        }

        assert_eq!(messenger.delivered_count(), 1);
        assert_eq!(messenger.delivered.lock().unwrap()[0].0, -2);
        assert_eq!(
            store.get(ChatId(-1)).await.unwrap().recurring_broadcasts[0].last_sent,
            0
        );
        assert!(store.get(ChatId(-2)).await.unwrap().recurring_broadcasts[0].last_sent > 0);
    }

    #[tokio::test]
    async fn stop_all_during_delivery_is_not_reverted() {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::new());

        seed(&store, -1, vec![spec("ad", 60, 0)]).await;

        // Scan snapshot taken, then every broadcast stopped before the
        // dispatch write lands.
        let scheduler = scheduler_over(store.clone(), messenger.clone());
        let snapshot = store.get(ChatId(-1)).await.unwrap();
        seed(&store, -1, Vec::new()).await;

        scheduler.dispatch_chat(snapshot).await;

        assert_eq!(messenger.delivered_count(), 1);
        let cfg = store.get(ChatId(-1)).await.unwrap();
        assert!(
            cfg.recurring_broadcasts.is_empty(),
            "stopped broadcasts must stay stopped"
        );
    }

    #[tokio::test]
    async fn append_during_delivery_survives_the_batch_write() {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let now = unix_now();

        seed(&store, -1, vec![spec("old", 60, now - 61)]).await;

        let scheduler = scheduler_over(store.clone(), messenger.clone());
        let snapshot = store.get(ChatId(-1)).await.unwrap();
        seed(
            &store,
            -1,
            vec![spec("old", 60, now - 61), spec("new", 60, 0)],
        )
        .await;

        scheduler.dispatch_chat(snapshot).await;

        let cfg = store.get(ChatId(-1)).await.unwrap();
        assert_eq!(cfg.recurring_broadcasts.len(), 2);
        assert!(cfg.recurring_broadcasts[0].last_sent >= now);
        assert_eq!(cfg.recurring_broadcasts[1].text, "new");
        assert_eq!(cfg.recurring_broadcasts[1].last_sent, 0);
    }

    #[tokio::test]
    async fn nothing_changed_means_no_extra_write() {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let now = unix_now();

        seed(&store, -1, vec![spec("later", 3600, now)]).await;
        let writes_before = store.write_count();

        let scheduler = scheduler_over(store.clone(), messenger.clone());
        let cfg = store.get(ChatId(-1)).await.unwrap();
        scheduler.dispatch_chat(cfg).await;

        assert_eq!(messenger.delivered_count(), 0);
        assert_eq!(store.write_count(), writes_before);
    }
}
