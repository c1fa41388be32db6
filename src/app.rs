//! Process wiring: builds the store, cache, chat adapter and scheduler and
//! runs them until Ctrl+C.

use crate::bot::BotService;
use crate::cache::TaskCache;
use crate::channels::traits::{ChatAdapter, InboundEvent};
use crate::channels::{Notifier, TelegramAdapter, supervise_adapter};
use crate::clock::{Clock, SystemClock};
use crate::config::BotConfig;
use crate::members::MembersRegistry;
use crate::scheduler::Scheduler;
use crate::store::{RemoteStore, SheetsStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const INBOUND_QUEUE_SIZE: usize = 64;

/// Run the bot until `cancel` fires.
///
/// # Errors
///
/// Returns an error when the configuration is invalid.
pub async fn run(config: BotConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    config.ensure_valid()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.schedule.timezone()));
    let store: Arc<dyn RemoteStore> = Arc::new(SheetsStore::new(&config.sheets)?);
    let cache = TaskCache::new(Arc::clone(&store), clock);
    let members = Arc::new(MembersRegistry::load(config.storage.members_path()));
    let adapter: Arc<dyn ChatAdapter> = Arc::new(TelegramAdapter::new(&config.telegram));

    match adapter.health_check().await {
        Ok(true) => info!(adapter = adapter.id(), "chat adapter reachable"),
        Ok(false) => warn!(adapter = adapter.id(), "chat adapter health check failed"),
        Err(err) => warn!(adapter = adapter.id(), "chat adapter health check error: {err}"),
    }

    let notifier = Arc::new(Notifier::new(
        Arc::clone(&adapter),
        config.rate_limit.messages_per_minute,
    ));
    let scheduler = Scheduler::new(
        cache.clone(),
        Arc::clone(&store),
        Arc::clone(&members),
        notifier,
        &config.schedule,
    )
    .with_manager_chat(config.telegram.manager_chat_id)
    .with_default_jobs(&config.schedule);
    let scheduler_handle = scheduler.run(cancel.clone());

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundEvent>(INBOUND_QUEUE_SIZE);
    let adapter_handle = tokio::spawn(supervise_adapter(
        Arc::clone(&adapter),
        inbound_tx,
        cancel.clone(),
    ));

    let service = BotService::new(
        cache.clone(),
        members,
        adapter,
        config.telegram.admin_user_id,
    );
    info!("shiftbot running");
    service.run(inbound_rx, cancel.clone()).await;
    service.shutdown().await;

    cancel.cancel();
    if let Err(err) = scheduler_handle.await {
        warn!("scheduler task ended abnormally: {err}");
    }
    if let Err(err) = adapter_handle.await {
        warn!("adapter task ended abnormally: {err}");
    }
    cache.shutdown().await;
    info!("shiftbot stopped");
    Ok(())
}
