//! Admin configuration panel.
//!
//! One privileged entry point (`/panel`, owner only) opens the top-level menu;
//! every subsequent navigation is a discrete callback action token mapping
//! 1:1 to a menu render or a mutation.

use std::sync::Arc;

use crate::{
    domain::{ChatId, UserId},
    locks::ChatLocks,
    messaging::types::InlineKeyboard,
    model::{ChatConfig, ContentKind},
    store::{ConfigPatch, ConfigStore},
    wizard::{WizardSessions, WizardState, PROMPT_BANNED, PROMPT_CONTENT},
    Result,
};

/// Discrete panel action tokens carried in inline-keyboard callback data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelAction {
    Recurring,
    ToggleLink,
    ToggleMention,
    BannedWords,
    AddRecurring,
    ListRecurring,
    StopAllRecurring,
    AddBanned,
    ClearBanned,
    BackMain,
}

impl PanelAction {
    pub fn token(self) -> &'static str {
        match self {
            PanelAction::Recurring => "recurring",
            PanelAction::ToggleLink => "toggle_link",
            PanelAction::ToggleMention => "toggle_mention",
            PanelAction::BannedWords => "banned_words",
            PanelAction::AddRecurring => "add_recurring",
            PanelAction::ListRecurring => "list_recurring",
            PanelAction::StopAllRecurring => "stop_all_recurring",
            PanelAction::AddBanned => "add_banned",
            PanelAction::ClearBanned => "clear_banned",
            PanelAction::BackMain => "back_main",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "recurring" => Some(PanelAction::Recurring),
            "toggle_link" => Some(PanelAction::ToggleLink),
            "toggle_mention" => Some(PanelAction::ToggleMention),
            "banned_words" => Some(PanelAction::BannedWords),
            "add_recurring" => Some(PanelAction::AddRecurring),
            "list_recurring" => Some(PanelAction::ListRecurring),
            "stop_all_recurring" => Some(PanelAction::StopAllRecurring),
            "add_banned" => Some(PanelAction::AddBanned),
            "clear_banned" => Some(PanelAction::ClearBanned),
            "back_main" => Some(PanelAction::BackMain),
            _ => None,
        }
    }
}

/// What to show after handling an action: menu text + keyboard.
#[derive(Clone, Debug)]
pub struct PanelView {
    pub text: String,
    pub keyboard: InlineKeyboard,
}

enum Toggle {
    AntiLink,
    AntiMention,
}

pub struct Panel {
    store: Arc<dyn ConfigStore>,
    sessions: Arc<WizardSessions>,
    locks: Arc<ChatLocks>,
}

impl Panel {
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

    /// Renders the top-level panel (the `/panel` command).
    pub async fn open(&self, chat_id: ChatId) -> Result<PanelView> {
        self.main_menu(chat_id).await
    }

    pub async fn handle(
        &self,
        action: PanelAction,
        chat_id: ChatId,
        admin_id: UserId,
    ) -> Result<PanelView> {
        match action {
            PanelAction::BackMain => self.main_menu(chat_id).await,
            PanelAction::Recurring => self.recurring_menu(chat_id).await,
            PanelAction::BannedWords => self.banned_menu(chat_id).await,

            PanelAction::ToggleLink => {
                self.toggle(chat_id, Toggle::AntiLink).await?;
                self.main_menu(chat_id).await
            }
            PanelAction::ToggleMention => {
                self.toggle(chat_id, Toggle::AntiMention).await?;
                self.main_menu(chat_id).await
            }

            PanelAction::AddRecurring => {
                self.sessions
                    .begin(chat_id, admin_id, WizardState::AwaitingBroadcastContent)
                    .await;
                Ok(PanelView {
                    text: PROMPT_CONTENT.to_string(),
                    keyboard: InlineKeyboard::default()
                        .button("⬅️ Back", PanelAction::Recurring.token()),
                })
            }
            PanelAction::ListRecurring => self.list_recurring(chat_id).await,
            PanelAction::StopAllRecurring => {
                let _guard = self.locks.lock_chat(chat_id.0).await;
                self.store
                    .update(
                        chat_id,
                        ConfigPatch {
                            recurring_broadcasts: Some(Vec::new()),
                            ..Default::default()
                        },
                    )
                    .await?;
                drop(_guard);
                self.recurring_menu(chat_id).await
            }

            PanelAction::AddBanned => {
                self.sessions
                    .begin(chat_id, admin_id, WizardState::AwaitingBannedWord)
                    .await;
                Ok(PanelView {
                    text: PROMPT_BANNED.to_string(),
                    keyboard: InlineKeyboard::default()
                        .button("⬅️ Back", PanelAction::BannedWords.token()),
                })
            }
            PanelAction::ClearBanned => {
                let _guard = self.locks.lock_chat(chat_id.0).await;
                self.store
                    .update(
                        chat_id,
                        ConfigPatch {
                            banned_words: Some(Vec::new()),
                            ..Default::default()
                        },
                    )
                    .await?;
                drop(_guard);
                self.banned_menu(chat_id).await
            }
        }
    }

    async fn toggle(&self, chat_id: ChatId, which: Toggle) -> Result<()> {
        let _guard = self.locks.lock_chat(chat_id.0).await;
        let cfg = self.store.get_or_create(chat_id).await?;
        let patch = match which {
            Toggle::AntiLink => ConfigPatch {
                anti_link: Some(!cfg.anti_link),
                ..Default::default()
            },
            Toggle::AntiMention => ConfigPatch {
                anti_mention: Some(!cfg.anti_mention),
                ..Default::default()
            },
        };
        self.store.update(chat_id, patch).await
    }

    async fn main_menu(&self, chat_id: ChatId) -> Result<PanelView> {
        let cfg = self.store.get_or_create(chat_id).await?;
        Ok(PanelView {
            text: "⚙️ Group settings".to_string(),
            keyboard: InlineKeyboard::default()
                .button("📢 Recurring Ads", PanelAction::Recurring.token())
                .button("🚫 Banned Words", PanelAction::BannedWords.token())
                .button(
                    format!("Anti-link: {}", on_off(cfg.anti_link)),
                    PanelAction::ToggleLink.token(),
                )
                .button(
                    format!("Anti-mention: {}", on_off(cfg.anti_mention)),
                    PanelAction::ToggleMention.token(),
                ),
        })
    }

    async fn recurring_menu(&self, chat_id: ChatId) -> Result<PanelView> {
        let cfg = self.store.get_or_create(chat_id).await?;
        Ok(PanelView {
            text: format!(
                "📢 Recurring ads: {} configured",
                cfg.recurring_broadcasts.len()
            ),
            keyboard: InlineKeyboard::default()
                .button("➕ Add New", PanelAction::AddRecurring.token())
                .button("📋 List", PanelAction::ListRecurring.token())
                .button("🗑 Stop All", PanelAction::StopAllRecurring.token())
                .button("⬅️ Back", PanelAction::BackMain.token()),
        })
    }

    async fn list_recurring(&self, chat_id: ChatId) -> Result<PanelView> {
        let cfg = self.store.get_or_create(chat_id).await?;
        Ok(PanelView {
            text: render_broadcast_list(&cfg),
            keyboard: InlineKeyboard::default()
                .button("⬅️ Back", PanelAction::Recurring.token()),
        })
    }

    async fn banned_menu(&self, chat_id: ChatId) -> Result<PanelView> {
        let cfg = self.store.get_or_create(chat_id).await?;
        let text = if cfg.banned_words.is_empty() {
            "🚫 Banned words: none".to_string()
        } else {
            format!("🚫 Banned words:\n{}", cfg.banned_words.join(", "))
        };
        Ok(PanelView {
            text,
            keyboard: InlineKeyboard::default()
                .button("➕ Add Word", PanelAction::AddBanned.token())
                .button("🗑 Clear All", PanelAction::ClearBanned.token())
                .button("⬅️ Back", PanelAction::BackMain.token()),
        })
    }
}

fn on_off(v: bool) -> &'static str {
    if v {
        "✅"
    } else {
        "❌"
    }
}

fn render_broadcast_list(cfg: &ChatConfig) -> String {
    if cfg.recurring_broadcasts.is_empty() {
        return "No recurring ads configured.".to_string();
    }

    let mut lines = vec!["📋 Recurring ads:".to_string()];
    for (idx, spec) in cfg.recurring_broadcasts.iter().enumerate() {
        let kind = match spec.kind {
            ContentKind::Text => "text",
            ContentKind::Photo => "photo",
            ContentKind::Video => "video",
        };
        let mut preview: String = spec.text.chars().take(40).collect();
        if spec.text.chars().count() > 40 {
            preview.push('…');
        }
        lines.push(format!(
            "{}. [{kind}] every {} — {} button(s) — {preview}",
            idx + 1,
            human_interval(spec.interval_seconds),
            spec.buttons.len(),
        ));
    }
    lines.join("\n")
}

fn human_interval(seconds: i64) -> String {
    if seconds % 3600 == 0 && seconds >= 3600 {
        format!("{} h", seconds / 3600)
    } else {
        format!("{} min", seconds / 60)
    }
}
