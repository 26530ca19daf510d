//! Multi-step conversational configuration flow.
//!
//! Sessions are keyed by `(chat, admin)` so two admins configuring the same
//! chat at the same time never corrupt each other's draft. `Idle` is the
//! absence of a session; the transition function is a pure exhaustive match
//! so every step is unit-testable without a transport.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, UserId},
    locks::ChatLocks,
    messaging::types::InboundMessage,
    model::{BroadcastSpec, ContentKind, UrlButton},
    store::{ConfigPatch, ConfigStore},
    Result,
};

pub const PROMPT_CONTENT: &str =
    "Send the ad content: plain text, or a photo/video whose caption becomes the ad text.";
pub const PROMPT_INTERVAL: &str =
    "Every how many minutes should this be sent? Send a positive number.";
pub const PROMPT_BUTTONS: &str =
    "Add buttons, one per line, as Label|https://url, or send \"No\" for none.";
pub const PROMPT_BANNED: &str = "Send the word to ban.";

/// Broadcast fields accumulated across wizard steps.
#[derive(Clone, Debug, PartialEq)]
pub struct BroadcastDraft {
    pub kind: ContentKind,
    pub text: String,
    pub file_ref: Option<String>,
}

/// Per-admin wizard state. `Idle` is represented by the absence of a session.
#[derive(Clone, Debug, PartialEq)]
pub enum WizardState {
    AwaitingBannedWord,
    AwaitingBroadcastContent,
    AwaitingBroadcastInterval {
        draft: BroadcastDraft,
    },
    AwaitingBroadcastButtons {
        draft: BroadcastDraft,
        interval_seconds: i64,
    },
}

/// Effect of one wizard step; the reply is always sent back to the admin.
#[derive(Clone, Debug, PartialEq)]
pub enum WizardAction {
    Reply(String),
    SaveBannedWord { word: String, reply: String },
    SaveBroadcast { spec: BroadcastSpec, reply: String },
}

/// Advance one step. Returns the next state (`None` = back to `Idle`) and the
/// action to apply. Malformed input re-prompts without transitioning.
pub fn advance(state: WizardState, input: &InboundMessage) -> (Option<WizardState>, WizardAction) {
    match state {
        WizardState::AwaitingBannedWord => {
            let word = input.text.trim().to_lowercase();
            if word.is_empty() {
                return (
                    Some(WizardState::AwaitingBannedWord),
                    WizardAction::Reply(PROMPT_BANNED.to_string()),
                );
            }
            (
                None,
                WizardAction::SaveBannedWord {
                    word,
                    reply: "Banned word saved.".to_string(),
                },
            )
        }

        WizardState::AwaitingBroadcastContent => {
            let (kind, file_ref) = match &input.media {
                Some((kind, file_ref)) => (*kind, Some(file_ref.clone())),
                None => (ContentKind::Text, None),
            };
            if input.text.trim().is_empty() && file_ref.is_none() {
                return (
                    Some(WizardState::AwaitingBroadcastContent),
                    WizardAction::Reply(PROMPT_CONTENT.to_string()),
                );
            }
            let draft = BroadcastDraft {
                kind,
                text: input.text.clone(),
                file_ref,
            };
            (
                Some(WizardState::AwaitingBroadcastInterval { draft }),
                WizardAction::Reply(PROMPT_INTERVAL.to_string()),
            )
        }

        WizardState::AwaitingBroadcastInterval { draft } => {
            let interval_seconds = input
                .text
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|minutes| *minutes > 0)
                .and_then(|minutes| minutes.checked_mul(60));
            match interval_seconds {
                Some(interval_seconds) => (
                    Some(WizardState::AwaitingBroadcastButtons {
                        draft,
                        interval_seconds,
                    }),
                    WizardAction::Reply(PROMPT_BUTTONS.to_string()),
                ),
                // Not a positive number of minutes that fits in seconds.
                None => (
                    Some(WizardState::AwaitingBroadcastInterval { draft }),
                    WizardAction::Reply(PROMPT_INTERVAL.to_string()),
                ),
            }
        }

        WizardState::AwaitingBroadcastButtons {
            draft,
            interval_seconds,
        } => {
            let spec = BroadcastSpec {
                kind: draft.kind,
                text: draft.text,
                file_ref: draft.file_ref,
                buttons: parse_buttons(&input.text),
                interval_seconds,
                last_sent: 0,
            };
            (
                None,
                WizardAction::SaveBroadcast {
                    spec,
                    reply: "Recurring ad saved.".to_string(),
                },
            )
        }
    }
}

/// `"No"` (any case) means no buttons; otherwise each `label|url` line becomes
/// one button and malformed lines are dropped silently.
pub fn parse_buttons(input: &str) -> Vec<UrlButton> {
    if input.trim().eq_ignore_ascii_case("no") {
        return Vec::new();
    }
    input
        .lines()
        .filter_map(|line| {
            let (label, url) = line.split_once('|')?;
            let (label, url) = (label.trim(), url.trim());
            if label.is_empty() || url.is_empty() {
                return None;
            }
            Some(UrlButton {
                label: label.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

/// Transient wizard sessions, keyed by `(chat, admin)`.
#[derive(Default)]
pub struct WizardSessions {
    inner: Mutex<HashMap<(i64, i64), WizardState>>,
}

impl WizardSessions {
    pub async fn begin(&self, chat_id: ChatId, admin_id: UserId, state: WizardState) {
        self.inner
            .lock()
            .await
            .insert((chat_id.0, admin_id.0), state);
    }

    pub async fn take(&self, chat_id: ChatId, admin_id: UserId) -> Option<WizardState> {
        self.inner.lock().await.remove(&(chat_id.0, admin_id.0))
    }

    pub async fn put(&self, chat_id: ChatId, admin_id: UserId, state: WizardState) {
        self.inner
            .lock()
            .await
            .insert((chat_id.0, admin_id.0), state);
    }

    pub async fn is_active(&self, chat_id: ChatId, admin_id: UserId) -> bool {
        self.inner
            .lock()
            .await
            .contains_key(&(chat_id.0, admin_id.0))
    }
}

/// Drives wizard sessions: pulls the admin's state, advances it, and persists
/// completed entries under the chat lock.
pub struct Wizard {
    store: Arc<dyn ConfigStore>,
    sessions: Arc<WizardSessions>,
    locks: Arc<ChatLocks>,
}

impl Wizard {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        sessions: Arc<WizardSessions>,
        locks: Arc<ChatLocks>,
    ) -> Self {
        Self {
            store,
            sessions,
            locks,
        }
    }

    pub async fn is_active(&self, chat_id: ChatId, admin_id: UserId) -> bool {
        self.sessions.is_active(chat_id, admin_id).await
    }

    /// Feed one inbound message into the admin's session. Returns the reply
    /// to send, or `None` when no session is active for this `(chat, admin)`.
    pub async fn handle_input(&self, msg: &InboundMessage) -> Result<Option<String>> {
        let Some(state) = self.sessions.take(msg.chat_id, msg.sender_id).await else {
            return Ok(None);
        };

        let (next, action) = advance(state, msg);
        if let Some(next) = next {
            self.sessions.put(msg.chat_id, msg.sender_id, next).await;
        }

        let reply = match action {
            WizardAction::Reply(reply) => reply,
            WizardAction::SaveBannedWord { word, reply } => {
                self.append_banned_word(msg.chat_id, &word).await?;
                reply
            }
            WizardAction::SaveBroadcast { spec, reply } => {
                self.append_broadcast(msg.chat_id, spec).await?;
                reply
            }
        };

        Ok(Some(reply))
    }

    /// Appends unless already present; words are stored lowercase so the
    /// comparison is case-insensitive.
    async fn append_banned_word(&self, chat_id: ChatId, word: &str) -> Result<()> {
        let _guard = self.locks.lock_chat(chat_id.0).await;

        let cfg = self.store.get_or_create(chat_id).await?;
        if cfg.banned_words.iter().any(|w| w == word) {
            return Ok(());
        }

        let mut words = cfg.banned_words;
        words.push(word.to_string());
        self.store
            .update(
                chat_id,
                ConfigPatch {
                    banned_words: Some(words),
                    ..Default::default()
                },
            )
            .await
    }

    async fn append_broadcast(&self, chat_id: ChatId, spec: BroadcastSpec) -> Result<()> {
        let _guard = self.locks.lock_chat(chat_id.0).await;

        let cfg = self.store.get_or_create(chat_id).await?;
        let mut specs = cfg.recurring_broadcasts;
        specs.push(spec);
        self.store
            .update(
                chat_id,
                ConfigPatch {
                    recurring_broadcasts: Some(specs),
                    ..Default::default()
                },
            )
            .await
    }
}
