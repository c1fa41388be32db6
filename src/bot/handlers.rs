//! Command and button dispatch.

use crate::bot::format;
use crate::cache::TaskCache;
use crate::channels::traits::{ChatAdapter, ChatId, InboundEvent, MessageId, OutboundMessage, Sender};
use crate::members::MembersRegistry;
use crate::model::{Completion, TaskId, normalize_handle};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Days covered by `/history`.
pub const HISTORY_DAYS: u64 = 7;

/// Handles inbound chat events against the task cache.
pub struct BotService {
    cache: TaskCache,
    members: Arc<MembersRegistry>,
    adapter: Arc<dyn ChatAdapter>,
    admin_user_id: Option<i64>,
    /// Manual refreshes run here so the event loop keeps serving.
    background: TaskTracker,
}

impl BotService {
    pub fn new(
        cache: TaskCache,
        members: Arc<MembersRegistry>,
        adapter: Arc<dyn ChatAdapter>,
        admin_user_id: Option<i64>,
    ) -> Self {
        Self {
            cache,
            members,
            adapter,
            admin_user_id,
            background: TaskTracker::new(),
        }
    }

    /// Wait for manual refreshes still in flight.
    pub async fn shutdown(&self) {
        self.background.close();
        self.background.wait().await;
    }

    fn is_admin(&self, sender: &Sender) -> bool {
        self.admin_user_id == Some(sender.user_id)
    }

    /// Normalized handle of an authorized sender, or the reply explaining
    /// why the sender is turned away.
    fn authorize(&self, sender: &Sender) -> Result<String, String> {
        let Some(username) = sender.username.as_deref() else {
            return Err(format::no_username_text());
        };
        let handle = normalize_handle(username);
        if self.members.is_member(&handle) || self.is_admin(sender) {
            Ok(handle)
        } else {
            Err(format::not_member_text())
        }
    }

    async fn reply(&self, chat_id: ChatId, text: String) -> anyhow::Result<()> {
        self.adapter.send(OutboundMessage::text(chat_id, text)).await
    }

    /// Consume events until the queue closes or `cancel` fires.
    pub async fn run(
        &self,
        mut inbound_rx: mpsc::Receiver<InboundEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = inbound_rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if let Err(err) = self.handle_event(event).await {
                warn!("failed to handle chat event: {err}");
            }
        }
        info!("bot event loop stopped");
    }

    pub async fn handle_event(&self, event: InboundEvent) -> anyhow::Result<()> {
        match event {
            InboundEvent::Command {
                chat_id,
                sender,
                command,
                ..
            } => self.handle_command(chat_id, &sender, &command).await,
            InboundEvent::Callback {
                callback_id,
                chat_id,
                message_id,
                sender,
                data,
            } => {
                self.handle_callback(&callback_id, chat_id, message_id, &sender, &data)
                    .await
            }
        }
    }

    async fn handle_command(
        &self,
        chat_id: ChatId,
        sender: &Sender,
        command: &str,
    ) -> anyhow::Result<()> {
        debug!(chat_id, user_id = sender.user_id, command, "command received");
        match command {
            "start" => self.start(chat_id, sender).await,
            "help" => self.reply(chat_id, format::help_text(self.is_admin(sender))).await,
            "tasks" => self.tasks(chat_id, sender).await,
            "history" => self.history(chat_id, sender).await,
            "refresh" => self.refresh(chat_id, sender).await,
            _ => self.reply(chat_id, format::unknown_command_text()).await,
        }
    }

    async fn start(&self, chat_id: ChatId, sender: &Sender) -> anyhow::Result<()> {
        if let Some(username) = sender.username.as_deref() {
            if let Some(member) = self.members.member(username) {
                let name = if member.name.is_empty() {
                    sender.first_name.as_str()
                } else {
                    member.name.as_str()
                };
                if let Err(err) = self.members.add_member(username, sender.user_id, name) {
                    warn!(username, "could not save member chat id: {err}");
                }
            }
        }
        self.reply(chat_id, format::welcome_text()).await
    }

    async fn tasks(&self, chat_id: ChatId, sender: &Sender) -> anyhow::Result<()> {
        let handle = match self.authorize(sender) {
            Ok(handle) => handle,
            Err(text) => return self.reply(chat_id, text).await,
        };
        let today = self.cache.today();
        let Some(shift) = self.cache.get_shift_for_user(&handle) else {
            return self.reply(chat_id, format::no_shift_text(today)).await;
        };
        let tasks = self.cache.get_tasks_for_user(&handle, today);
        if tasks.is_empty() {
            return self.reply(chat_id, format::no_tasks_text(today)).await;
        }
        let (text, keyboard) = format::tasks_message(&tasks, &shift, today);
        self.adapter
            .send(OutboundMessage::text(chat_id, text).with_keyboard(keyboard))
            .await
    }

    async fn history(&self, chat_id: ChatId, sender: &Sender) -> anyhow::Result<()> {
        let handle = match self.authorize(sender) {
            Ok(handle) => handle,
            Err(text) => return self.reply(chat_id, text).await,
        };
        let mut who = vec![handle.clone()];
        if let Some(member) = self.members.member(&handle) {
            who.push(member.name);
        }
        if let Some(shift) = self.cache.get_shift_for_user(&handle) {
            who.push(shift.employee_name);
        }
        let who: Vec<&str> = who.iter().map(String::as_str).collect();
        let history = self.cache.recent_completions(&who, HISTORY_DAYS);
        self.reply(chat_id, format::history_message(&history, HISTORY_DAYS))
            .await
    }

    async fn refresh(&self, chat_id: ChatId, sender: &Sender) -> anyhow::Result<()> {
        if !self.is_admin(sender) {
            return self.reply(chat_id, format::admin_only_text()).await;
        }
        info!(user_id = sender.user_id, "manual cache refresh requested");
        let cache = self.cache.clone();
        let adapter = Arc::clone(&self.adapter);
        self.background.spawn(async move {
            let ok = cache.refresh().await;
            let text = format::refresh_result_text(
                ok,
                cache.all_tasks().len(),
                cache.shifts_today().len(),
            );
            if let Err(err) = adapter.send(OutboundMessage::text(chat_id, text)).await {
                warn!(chat_id, "failed to report refresh result: {err}");
            }
        });
        Ok(())
    }

    async fn handle_callback(
        &self,
        callback_id: &str,
        chat_id: ChatId,
        message_id: MessageId,
        sender: &Sender,
        data: &str,
    ) -> anyhow::Result<()> {
        if let Err(err) = self.adapter.answer_callback(callback_id, None).await {
            warn!(callback_id, "failed to answer callback: {err}");
        }

        let Some(task_id) = format::parse_complete_callback(data) else {
            debug!(data, "ignoring unknown callback data");
            return Ok(());
        };

        let edit = |text: String| OutboundMessage::text(chat_id, text);
        let handle = match self.authorize(sender) {
            Ok(handle) => handle,
            Err(text) => return self.adapter.edit(message_id, edit(text)).await,
        };
        let Some(shift) = self.cache.get_shift_for_user(&handle) else {
            return self
                .adapter
                .edit(message_id, edit(format::no_shift_callback_text()))
                .await;
        };

        let today = self.cache.today();
        let already_done = self
            .cache
            .get_tasks_for_user(&handle, today)
            .iter()
            .any(|t| t.id == task_id && t.is_done());
        if !already_done && !self.complete(task_id, &handle, &shift.employee_name) {
            return self
                .adapter
                .edit(message_id, edit(format::task_not_found_text()))
                .await;
        }

        let tasks = self.cache.get_tasks_for_user(&handle, today);
        let (text, keyboard) = format::tasks_message(&tasks, &shift, today);
        self.adapter
            .edit(message_id, edit(text).with_keyboard(keyboard))
            .await
    }

    /// Mark locally and push to the store in the background.
    fn complete(&self, task_id: TaskId, handle: &str, employee_name: &str) -> bool {
        let Some(task) = self.cache.all_tasks().into_iter().find(|t| t.id == task_id) else {
            warn!(task_id, "completion for a task missing from the snapshot");
            return false;
        };
        let now = self.cache.now();
        self.cache.mark_completed_local(task_id, handle, now);
        self.cache.spawn_sync(Completion {
            task_id,
            completed_by: employee_name.to_owned(),
            completed_at: now,
            period: task.period,
        });
        info!(task_id, user = handle, task = %task.name, "task completed");
        true
    }
}
