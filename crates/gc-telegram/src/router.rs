use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio_util::sync::CancellationToken;

use gc_core::{
    config::Config,
    locks::ChatLocks,
    messaging::port::MessagingPort,
    moderation::{AdminRoster, ModerationEngine},
    panel::Panel,
    scheduler::{BroadcastScheduler, SchedulerSettings},
    store::ConfigStore,
    wizard::{Wizard, WizardSessions},
};

use crate::handlers;
use crate::TelegramMessenger;

/// Everything a handler needs, constructed once at startup and injected via
/// dptree. No global mutable state anywhere.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub messenger: Arc<dyn MessagingPort>,
    pub moderation: Arc<ModerationEngine>,
    pub wizard: Arc<Wizard>,
    pub panel: Arc<Panel>,
    pub admins: Arc<AdminRoster>,
}

pub async fn run_polling(cfg: Arc<Config>, store: Arc<dyn ConfigStore>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        tracing::info!(owner = cfg.owner_id, "guardcast started: @{}", me.username());
    }

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let locks = Arc::new(ChatLocks::default());
    let sessions = Arc::new(WizardSessions::default());

    let moderation = Arc::new(ModerationEngine::new(store.clone(), messenger.clone()));
    let wizard = Arc::new(Wizard::new(store.clone(), sessions.clone(), locks.clone()));
    let panel = Arc::new(Panel::new(store.clone(), sessions, locks.clone()));
    let admins = Arc::new(AdminRoster::new(messenger.clone(), cfg.admin_cache_ttl));

    let scheduler = BroadcastScheduler::new(
        SchedulerSettings {
            tick: cfg.scheduler_tick,
            delivery_timeout: cfg.delivery_timeout,
            max_concurrency: cfg.scheduler_max_concurrency,
        },
        store,
        messenger.clone(),
        locks,
    );
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await });
    }

    let state = Arc::new(AppState {
        cfg,
        messenger,
        moderation,
        wizard,
        panel,
        admins,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    cancel.cancel();
    Ok(())
}
