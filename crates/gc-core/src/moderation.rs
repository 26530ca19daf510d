//! Per-chat moderation decision pipeline.
//!
//! Decision order (short-circuiting): resolved admins bypass everything, then
//! the link/mention policy, then banned-word substring matching. At most one
//! deletion request is issued per message and its failure is swallowed.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use regex::Regex;
use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, MessageRef, UserId},
    messaging::{port::MessagingPort, types::InboundMessage},
    model::ChatConfig,
    store::ConfigStore,
    Result,
};

/// Outcome of the moderation pipeline for one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Delete(DeleteReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteReason {
    Link,
    Mention,
    BannedWord(String),
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|\s)@[A-Za-z0-9_]{3,}").expect("valid regex"))
}

/// Heuristic for links and mentions that slipped past entity parsing:
/// scheme prefixes, `www.`, `t.me` and bare `@handle` tokens.
pub fn looks_like_link_or_mention(text: &str) -> bool {
    let lower = text.to_lowercase();
    if lower.contains("http://")
        || lower.contains("https://")
        || lower.contains("www.")
        || lower.contains("t.me")
    {
        return true;
    }
    mention_re().is_match(text)
}

/// Pure decision function; the engine wraps it with config lookup + deletion.
pub fn decide(cfg: &ChatConfig, msg: &InboundMessage) -> Verdict {
    if msg.sender_is_resolved_admin {
        return Verdict::Allow;
    }

    if cfg.anti_link || cfg.anti_mention {
        let flagged = msg.has_link_entity
            || msg.has_mention_entity
            || looks_like_link_or_mention(&msg.text);
        if flagged {
            let reason = if msg.has_mention_entity && !msg.has_link_entity {
                DeleteReason::Mention
            } else {
                DeleteReason::Link
            };
            return Verdict::Delete(reason);
        }
    }

    if !cfg.banned_words.is_empty() {
        let lower = msg.text.to_lowercase();
        if let Some(word) = cfg.banned_words.iter().find(|w| lower.contains(w.as_str())) {
            return Verdict::Delete(DeleteReason::BannedWord(word.clone()));
        }
    }

    Verdict::Allow
}

/// Applies the moderation decision for one inbound group message.
pub struct ModerationEngine {
    store: Arc<dyn ConfigStore>,
    messenger: Arc<dyn MessagingPort>,
}

impl ModerationEngine {
    pub fn new(store: Arc<dyn ConfigStore>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self { store, messenger }
    }

    /// Lazily creates the chat config, decides, and issues at most one delete.
    /// Deletion failures (already removed, missing rights) are logged and
    /// swallowed, never retried.
    pub async fn handle(&self, msg: &InboundMessage) -> Result<Verdict> {
        let cfg = self.store.get_or_create(msg.chat_id).await?;
        let verdict = decide(&cfg, msg);

        if let Verdict::Delete(reason) = &verdict {
            tracing::info!(
                chat = msg.chat_id.0,
                sender = msg.sender_id.0,
                ?reason,
                "removing message"
            );
            let target = MessageRef {
                chat_id: msg.chat_id,
                message_id: msg.message_id,
            };
            if let Err(e) = self.messenger.delete_message(target).await {
                tracing::warn!(chat = msg.chat_id.0, "delete failed: {e}");
            }
        }

        Ok(verdict)
    }
}

/// TTL cache over the gateway's admin list.
///
/// A lookup failure resolves to "not an admin": moderation stays closed rather
/// than open while the gateway is unreachable.
pub struct AdminRoster {
    messenger: Arc<dyn MessagingPort>,
    ttl: Duration,
    cache: Mutex<HashMap<i64, (Instant, HashSet<UserId>)>>,
}

impl AdminRoster {
    pub fn new(messenger: Arc<dyn MessagingPort>, ttl: Duration) -> Self {
        Self {
            messenger,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn is_admin(&self, chat_id: ChatId, user_id: UserId) -> bool {
        let now = Instant::now();
        {
            let cache = self.cache.lock().await;
            if let Some((fetched_at, admins)) = cache.get(&chat_id.0) {
                if now.duration_since(*fetched_at) < self.ttl {
                    return admins.contains(&user_id);
                }
            }
        }

        match self.messenger.list_admins(chat_id).await {
            Ok(admins) => {
                let hit = admins.contains(&user_id);
                self.cache.lock().await.insert(chat_id.0, (now, admins));
                hit
            }
            Err(e) => {
                tracing::warn!(chat = chat_id.0, "admin lookup failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;

    fn msg(text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: ChatId(-100),
            sender_id: UserId(7),
            message_id: MessageId(1),
            text: text.to_string(),
            has_link_entity: false,
            has_mention_entity: false,
            media: None,
            sender_is_resolved_admin: false,
        }
    }

    fn cfg() -> ChatConfig {
        ChatConfig::new(-100)
    }

    #[test]
    fn link_heuristic_catches_urls_and_handles() {
        assert!(looks_like_link_or_mention("Visit http://example.com"));
        assert!(looks_like_link_or_mention("go to WWW.example.com now"));
        assert!(looks_like_link_or_mention("join t.me/somegroup"));
        assert!(looks_like_link_or_mention("ping @some_handle"));
        assert!(!looks_like_link_or_mention("just a normal sentence"));
        assert!(!looks_like_link_or_mention("emails like a@b are too short"));
    }

    #[test]
    fn admin_messages_are_never_deleted() {
        let mut config = cfg();
        config.banned_words = vec!["spam".to_string()];

        let mut message = msg("spam with https://evil.test and @mention");
        message.has_link_entity = true;
        message.has_mention_entity = true;
        message.sender_is_resolved_admin = true;

        assert_eq!(decide(&config, &message), Verdict::Allow);
    }

    #[test]
    fn plain_link_deleted_only_while_policy_enabled() {
        let message = msg("Visit http://example.com");

        assert_eq!(
            decide(&cfg(), &message),
            Verdict::Delete(DeleteReason::Link)
        );

        let mut relaxed = cfg();
        relaxed.anti_link = false;
        relaxed.anti_mention = false;
        assert_eq!(decide(&relaxed, &message), Verdict::Allow);
    }

    #[test]
    fn mention_entity_reported_as_mention() {
        let mut message = msg("hello");
        message.has_mention_entity = true;
        assert_eq!(
            decide(&cfg(), &message),
            Verdict::Delete(DeleteReason::Mention)
        );
    }

    #[test]
    fn banned_word_is_case_insensitive_substring() {
        let mut config = cfg();
        config.anti_link = false;
        config.anti_mention = false;
        config.banned_words = vec!["spam".to_string()];

        assert_eq!(
            decide(&config, &msg("This is SPAM!!")),
            Verdict::Delete(DeleteReason::BannedWord("spam".to_string()))
        );
        assert_eq!(decide(&config, &msg("perfectly fine")), Verdict::Allow);
    }

    #[tokio::test]
    async fn engine_creates_config_lazily_and_issues_one_delete() {
        use crate::messaging::testing::RecordingMessenger;
        use crate::store::MemoryStore;

        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let engine = ModerationEngine::new(store.clone(), messenger.clone());

        let verdict = engine.handle(&msg("see https://spam.test")).await.unwrap();
        assert_eq!(verdict, Verdict::Delete(DeleteReason::Link));
        assert_eq!(messenger.deleted.lock().unwrap().len(), 1);

        // Lazy creation happened with defaults.
        let cfg = store.get(ChatId(-100)).await.unwrap();
        assert!(cfg.anti_link && cfg.anti_mention);

        // A clean message leaves everything alone.
        let verdict = engine.handle(&msg("all good")).await.unwrap();
        assert_eq!(verdict, Verdict::Allow);
        assert_eq!(messenger.deleted.lock().unwrap().len(), 1);
    }

    #[test]
    fn empty_banned_list_skips_word_check() {
        let mut config = cfg();
        config.anti_link = false;
        config.anti_mention = false;
        assert_eq!(decide(&config, &msg("anything goes")), Verdict::Allow);
    }
}
