//! Gateway Core (C7): the central orchestrator wiring the Registry, Session
//! Store, Approval Tracker, Intent Parser, IPC Hub, and adapters together.
//!
//! `Gateway` implements [`InboundSink`] (chat -> gateway) and
//! [`IpcEventHandler`] (worker -> gateway), so it is the single place where
//! both directions of traffic get turned into action (§4.7).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::Router;
use chrono::{Local, Timelike, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapters::discord::DiscordAdapter;
use crate::adapters::lark::LarkAdapter;
use crate::adapters::messenger::MessengerAdapter;
use crate::adapters::slack::SlackAdapter;
use crate::adapters::telegram::TelegramAdapter;
use crate::adapters::{Adapter, AdapterFuture, InboundSink};
use crate::approval::ApprovalTracker;
use crate::cleanup;
use crate::config::{GlobalConfig, QuietHoursConfig};
use crate::intent::IntentParser;
use crate::ipc::{IpcEventHandler, IpcFuture, IpcHub};
use crate::model::intent::{Intent, IntentKind};
use crate::model::ipc::{
    ApprovalPayload, ApprovalResponsePayload, CommandPayload, CommandReplyTo, CommandUser,
    HeartbeatPayload, NotificationPayload, RegisterPayload, ResponsePayload,
};
use crate::model::{
    Button, ButtonClick, ButtonStyle, InboundMessage, OutboundMessage, PendingApproval, Platform,
    ProcessInfo, ProcessStatus, ReplyContext, Session,
};
use crate::registry::Registry;
use crate::session::SessionStore;
use crate::Result;

const SHUTDOWN_TIMEOUT: StdDuration = StdDuration::from_secs(10);

const HELP_TEXT: &str = "\
**Available commands**
- `list` — show connected processes
- `status [name]` — show status for a process (`logs`/`errors` also work)
- `bind [name]` — bind this chat to a process
- `pause|resume|cancel|stop [name]` — control a process
- `<name> <task>` — send a free-text task to a process
- `approve` / `reject` — resolve a pending approval, or reply to the request";

/// The central orchestrator. One instance per running gateway process.
pub struct Gateway {
    config: Arc<GlobalConfig>,
    registry: Arc<Registry>,
    sessions: Arc<SessionStore>,
    approvals: Arc<ApprovalTracker>,
    parser: IntentParser,
    ipc: Arc<IpcHub>,
    adapters: HashMap<Platform, Arc<dyn Adapter>>,
    slack: Option<Arc<SlackAdapter>>,
    lark: Option<Arc<LarkAdapter>>,
    messenger: Option<Arc<MessengerAdapter>>,
}

/// Handle to a running [`Gateway`], returned by [`Gateway::start`] and
/// consumed by [`Gateway::stop`].
pub struct GatewayHandle {
    cancel: CancellationToken,
    ipc_handle: JoinHandle<()>,
    adapter_handles: Vec<JoinHandle<()>>,
    http_handle: Option<JoinHandle<()>>,
    cleanup_handle: JoinHandle<()>,
}

impl Gateway {
    /// Construct a gateway from configuration, building one adapter per
    /// configured platform section and skipping those whose credentials are
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Adapter` if the Slack adapter's identity cannot be
    /// resolved (the only fallible adapter constructor).
    pub fn new(config: Arc<GlobalConfig>) -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let sessions = Arc::new(SessionStore::new());
        let approvals = Arc::new(ApprovalTracker::new());
        let parser = IntentParser::new(config.mention_keywords.clone());
        let ipc = Arc::new(IpcHub::new(config.ipc_socket_path.clone()));

        let mut adapters: HashMap<Platform, Arc<dyn Adapter>> = HashMap::new();
        let mut slack = None;
        let mut lark = None;
        let mut messenger = None;

        if let Some(cfg) = &config.telegram {
            let adapter: Arc<TelegramAdapter> = Arc::new(TelegramAdapter::new(cfg.clone()));
            adapters.insert(Platform::Telegram, adapter as Arc<dyn Adapter>);
        }
        if let Some(cfg) = &config.discord {
            let adapter: Arc<DiscordAdapter> = Arc::new(DiscordAdapter::new(cfg.clone()));
            adapters.insert(Platform::Discord, adapter as Arc<dyn Adapter>);
        }
        if let Some(cfg) = &config.slack {
            let adapter = Arc::new(SlackAdapter::new(cfg.clone())?);
            adapters.insert(Platform::Slack, Arc::clone(&adapter) as Arc<dyn Adapter>);
            slack = Some(adapter);
        }
        if let Some(cfg) = &config.lark {
            let adapter = Arc::new(LarkAdapter::new(cfg.clone()));
            adapters.insert(Platform::Lark, Arc::clone(&adapter) as Arc<dyn Adapter>);
            lark = Some(adapter);
        }
        if let Some(cfg) = &config.messenger {
            let adapter = Arc::new(MessengerAdapter::new(cfg.clone()));
            adapters.insert(Platform::FbMessenger, Arc::clone(&adapter) as Arc<dyn Adapter>);
            messenger = Some(adapter);
        }

        Ok(Self {
            config,
            registry,
            sessions,
            approvals,
            parser,
            ipc,
            adapters,
            slack,
            lark,
            messenger,
        })
    }

    /// Start every configured adapter, the IPC hub, the shared HTTP router
    /// for webhook-style adapters, and the cleanup loop.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ipc` if the IPC listener cannot be bound.
    pub async fn start(self: &Arc<Self>) -> Result<GatewayHandle> {
        let cancel = CancellationToken::new();
        let sink: Arc<dyn InboundSink> = Arc::clone(self) as Arc<dyn InboundSink>;
        let handler: Arc<dyn IpcEventHandler> = Arc::clone(self) as Arc<dyn IpcEventHandler>;

        let ipc_handle = Arc::clone(&self.ipc).start(handler, cancel.clone())?;

        let mut adapter_handles = Vec::with_capacity(self.adapters.len());
        for adapter in self.adapters.values() {
            let adapter = Arc::clone(adapter);
            let sink = Arc::clone(&sink);
            let cancel = cancel.clone();
            adapter_handles.push(tokio::spawn(async move {
                let platform = adapter.platform_tag();
                if let Err(err) = adapter.start(sink, cancel).await {
                    error!(%err, %platform, "adapter exited with error");
                }
            }));
        }

        let mut router: Option<Router> = None;
        if let Some(slack) = &self.slack {
            router = Some(merge_router(router, slack.router(Arc::clone(&sink))));
        }
        if let Some(lark) = &self.lark {
            router = Some(merge_router(router, lark.router(Arc::clone(&sink))));
        }
        if let Some(messenger) = &self.messenger {
            router = Some(merge_router(router, messenger.router(Arc::clone(&sink))));
        }
        let http_handle = router.map(|router| {
            let port = self.config.http_port;
            let cancel = cancel.clone();
            tokio::spawn(serve_http(router, port, cancel))
        });

        let cleanup_handle = cleanup::spawn(
            Arc::clone(&self.registry),
            Arc::clone(&self.sessions),
            Arc::clone(&self.approvals),
            StdDuration::from_secs(self.config.cleanup_interval_secs),
            cancel.clone(),
        );

        self.broadcast_to_default_chats(OutboundMessage::markdown("🟢 Gateway online."))
            .await;

        info!("gateway started");
        Ok(GatewayHandle {
            cancel,
            ipc_handle,
            adapter_handles,
            http_handle,
            cleanup_handle,
        })
    }

    /// Post a shutdown notice, cancel every background task, and wait for
    /// them to unwind (bounded by [`SHUTDOWN_TIMEOUT`] each).
    pub async fn stop(&self, handle: GatewayHandle) {
        let sessions = self.sessions.count().await;
        let approvals = self.approvals.count().await;
        let notice = format!(
            "🔴 Gateway shutting down. {sessions} active session(s), {approvals} pending approval(s)."
        );
        self.broadcast_to_default_chats(OutboundMessage::markdown(notice)).await;

        handle.cancel.cancel();
        self.ipc.stop().await;

        shutdown_with_timeout("ipc hub", handle.ipc_handle).await;
        for adapter_handle in handle.adapter_handles {
            shutdown_with_timeout("adapter", adapter_handle).await;
        }
        if let Some(http_handle) = handle.http_handle {
            shutdown_with_timeout("http router", http_handle).await;
        }
        shutdown_with_timeout("cleanup loop", handle.cleanup_handle).await;

        info!("gateway stopped");
    }

    /// The shared process registry, exposed so callers can wire external
    /// watchers (e.g. the alias hot-reload watcher) against the same state
    /// the gateway itself dispatches against.
    #[must_use]
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    fn resolve_require_mention(&self, msg: &InboundMessage) -> bool {
        use crate::config::MentionMode;
        if msg.is_direct_message && self.config.direct_message_mode == MentionMode::Always {
            return false;
        }
        if !msg.is_direct_message && self.config.channel_mode == MentionMode::Always {
            return false;
        }
        self.config.require_mention
    }

    async fn handle_message(&self, msg: InboundMessage) {
        let require_mention = self.resolve_require_mention(&msg);
        let Some(intent) = self.parser.parse(&msg, require_mention) else {
            return;
        };

        let session = self.sessions.get_or_create(msg.platform, &msg.user_id, &msg.chat_id).await;
        let ctx = ReplyContext::from_inbound(&msg);
        if let Some(text) = self.dispatch_intent(&msg, &session, intent).await {
            self.send_reply(&ctx, msg.platform, text).await;
        }
    }

    async fn dispatch_intent(&self, msg: &InboundMessage, session: &Session, intent: Intent) -> Option<String> {
        match intent.kind {
            IntentKind::Help => Some(HELP_TEXT.to_owned()),
            IntentKind::QueryList => {
                let processes = self.registry.list().await;
                Some(render_list(&processes))
            }
            IntentKind::QueryStatus => {
                match resolve_target(&self.registry, intent.target.as_deref(), session.bound_process.as_deref()).await {
                    TargetResolution::Found(process) => Some(render_status(&process)),
                    other => Some(resolution_message(&other)),
                }
            }
            IntentKind::Control => {
                match resolve_target(&self.registry, intent.target.as_deref(), session.bound_process.as_deref()).await {
                    TargetResolution::Found(process) => {
                        self.dispatch_command(&process, msg, &intent).await;
                        None
                    }
                    other => Some(resolution_message(&other)),
                }
            }
            IntentKind::Bind => match intent.target.as_deref() {
                None => Some(match &session.bound_process {
                    Some(name) => format!("Bound to `{name}`."),
                    None => "Not bound.".to_owned(),
                }),
                Some(target) => match self.registry.find(target).await {
                    Some(process) => {
                        let name = process.name();
                        self.sessions.bind(msg.platform, &msg.user_id, &name).await;
                        Some(format!("Bound to `{name}`."))
                    }
                    None => Some(format!("Process `{target}` not found.")),
                },
            },
            IntentKind::SendTask => {
                match resolve_target(&self.registry, intent.target.as_deref(), session.bound_process.as_deref()).await {
                    TargetResolution::Found(process) => {
                        let name = process.name();
                        self.dispatch_command(&process, msg, &intent).await;
                        Some(format!("Task sent to `{name}`."))
                    }
                    other => Some(resolution_message(&other)),
                }
            }
            IntentKind::Approve => Some(self.handle_approve(msg, &intent).await),
            IntentKind::Subscribe | IntentKind::Unknown => {
                Some("I didn't understand that. Type `help`…".to_owned())
            }
        }
    }

    async fn dispatch_command(&self, process: &ProcessInfo, msg: &InboundMessage, intent: &Intent) {
        let payload = CommandPayload {
            intent: intent.clone(),
            user: CommandUser {
                id: msg.user_id.clone(),
                name: msg.user_name.clone(),
                platform: msg.platform,
            },
            reply_to: CommandReplyTo {
                platform: msg.platform,
                chat_id: msg.chat_id.clone(),
                message_id: Some(msg.message_id.clone()),
                thread_id: msg.thread_id.clone(),
            },
        };
        let request_id = Uuid::new_v4().to_string();
        if let Err(err) = self.ipc.send_command(&process.process_id, Some(request_id), &payload).await {
            warn!(%err, process_id = %process.process_id, "failed to dispatch command to worker");
        }
    }

    async fn handle_approve(&self, msg: &InboundMessage, intent: &Intent) -> String {
        let Some(reply_to) = msg.reply_to.as_deref() else {
            return "No pending approval found. Reply to the request or use the buttons.".to_owned();
        };
        let Some(approval) = self.approvals.get_by_message(reply_to).await else {
            return "No pending approval found. Reply to the request or use the buttons.".to_owned();
        };
        let approved = intent.approved.unwrap_or(true);
        self.resolve_approval(&approval, approved, &msg.user_id).await;
        if approved {
            "Request approved.".to_owned()
        } else {
            "Request rejected.".to_owned()
        }
    }

    async fn handle_button(&self, click: ButtonClick) {
        let Some(approved) = approval_button_kind(&click.button_id) else {
            return;
        };
        let Some(approval) = self.approvals.get(&click.data).await else {
            return;
        };
        self.resolve_approval(&approval, approved, &click.user_id).await;

        let verb = if approved { "✅ Approved" } else { "❌ Rejected" };
        let banner = format!("{verb} by <@{}>", click.user_id);
        if let Some(adapter) = self.adapters.get(&click.platform) {
            if let Err(err) = adapter.edit(&click.chat_id, &click.message_id, OutboundMessage::markdown(banner)).await {
                warn!(%err, "failed to edit approval message with final banner");
            }
        }
    }

    async fn resolve_approval(&self, approval: &PendingApproval, approved: bool, user_id: &str) {
        let payload = ApprovalResponsePayload {
            request_id: approval.id.clone(),
            approved,
            comment: None,
            user_id: user_id.to_owned(),
        };
        if let Err(err) = self
            .ipc
            .send(
                &approval.process_id,
                crate::model::ipc::IpcMessageType::ApprovalResponse,
                Some(approval.id.clone()),
                &payload,
            )
            .await
        {
            warn!(%err, approval_id = %approval.id, "failed to deliver approval response to worker");
        }
        self.approvals.remove(&approval.id).await;
    }

    async fn send_reply(&self, ctx: &ReplyContext, platform: Platform, text: String) {
        let Some(adapter) = self.adapters.get(&platform) else {
            return;
        };
        let outbound = OutboundMessage::markdown(text);
        let result = match &ctx.message_id {
            Some(message_id) => adapter.reply(&ctx.chat_id, message_id, outbound).await,
            None => adapter.send(&ctx.chat_id, outbound).await,
        };
        if let Err(err) = result {
            warn!(%err, %platform, "failed to send chat reply");
        }
    }

    fn default_chats(&self) -> Vec<(Platform, String)> {
        let mut chats = Vec::new();
        if let Some(cfg) = &self.config.telegram {
            if let Some(id) = &cfg.access.default_chat_id {
                chats.push((Platform::Telegram, id.clone()));
            }
        }
        if let Some(cfg) = &self.config.discord {
            if let Some(id) = &cfg.access.default_chat_id {
                chats.push((Platform::Discord, id.clone()));
            }
        }
        if let Some(cfg) = &self.config.slack {
            if let Some(id) = &cfg.access.default_chat_id {
                chats.push((Platform::Slack, id.clone()));
            }
        }
        if let Some(cfg) = &self.config.lark {
            if let Some(id) = &cfg.access.default_chat_id {
                chats.push((Platform::Lark, id.clone()));
            }
        }
        if let Some(cfg) = &self.config.messenger {
            if let Some(id) = &cfg.access.default_chat_id {
                chats.push((Platform::FbMessenger, id.clone()));
            }
        }
        chats
    }

    async fn broadcast_to_default_chats(&self, message: OutboundMessage) {
        for (platform, chat_id) in self.default_chats() {
            if let Some(adapter) = self.adapters.get(&platform) {
                if let Err(err) = adapter.send(&chat_id, message.clone()).await {
                    warn!(%err, %platform, "failed to deliver broadcast message");
                }
            }
        }
    }
}

impl InboundSink for Gateway {
    fn on_message(&self, message: InboundMessage) -> AdapterFuture<'_, ()> {
        Box::pin(async move { self.handle_message(message).await })
    }

    fn on_button(&self, click: ButtonClick) -> AdapterFuture<'_, ()> {
        Box::pin(async move { self.handle_button(click).await })
    }
}

impl IpcEventHandler for Gateway {
    fn on_register(&self, payload: RegisterPayload) -> IpcFuture<'_, ()> {
        Box::pin(async move {
            let process = ProcessInfo::new(
                payload.process_id.clone(),
                std::path::PathBuf::from(payload.process_path.clone()),
                payload.pid,
            );
            info!(process_id = %payload.process_id, path = %payload.process_path, "worker registered");
            self.registry.register(process).await;
        })
    }

    fn on_heartbeat(&self, payload: HeartbeatPayload) -> IpcFuture<'_, ()> {
        Box::pin(async move {
            self.registry.update_status(&payload.process_id, payload.status, payload.current_task).await;
        })
    }

    fn on_notification(&self, process_id: &str, payload: NotificationPayload) -> IpcFuture<'_, ()> {
        let process_id = process_id.to_owned();
        Box::pin(async move {
            let Some(process) = self.registry.find(&process_id).await else {
                warn!(process_id = %process_id, "notification from unknown process, dropping");
                return;
            };
            if !matches!(payload.level, crate::model::ipc::NotificationLevel::Error)
                && is_quiet_hour(&self.config.quiet_hours)
            {
                return;
            }
            let text = format!(
                "{} **{}** [{}]\n\n{}",
                payload.level.icon(),
                payload.title,
                process.name(),
                payload.message
            );
            let mut message = OutboundMessage::markdown(text);
            if let Some(buttons) = payload.buttons {
                message = message.with_buttons(buttons);
            }
            self.broadcast_to_default_chats(message).await;
        })
    }

    fn on_approval(&self, process_id: &str, payload: ApprovalPayload) -> IpcFuture<'_, ()> {
        let process_id = process_id.to_owned();
        Box::pin(async move {
            let Some(process) = self.registry.find(&process_id).await else {
                warn!(process_id = %process_id, approval_id = %payload.id, "approval request from unknown process, dropping");
                return;
            };
            let Some((platform, chat_id)) = self.default_chats().into_iter().next() else {
                warn!(approval_id = %payload.id, "no default chat configured, dropping approval request");
                return;
            };
            let Some(adapter) = self.adapters.get(&platform).cloned() else {
                return;
            };

            let mut text = format!(
                "🔔 **Approval Request** [{}]\n\n**Action:** {}\n**Description:** {}",
                process.name(),
                payload.action,
                payload.description
            );
            if let Some(details) = &payload.details {
                if !details.is_empty() {
                    text.push_str(&format!("\n\n```\n{details}\n```"));
                }
            }
            let buttons = vec![
                Button::new(format!("approve_{}", payload.id), "Approve", ButtonStyle::Primary, payload.id.clone()),
                Button::new(format!("reject_{}", payload.id), "Reject", ButtonStyle::Danger, payload.id.clone()),
            ];
            let message = OutboundMessage::markdown(text).with_buttons(buttons);

            match adapter.send(&chat_id, message).await {
                Ok(message_id) => {
                    let reply_context = ReplyContext {
                        platform,
                        chat_id,
                        message_id: Some(message_id.clone()),
                        thread_id: None,
                    };
                    let approval = PendingApproval::new(
                        payload.id.clone(),
                        process_id.clone(),
                        reply_context,
                        Some(message_id),
                        payload.timeout.unwrap_or(0),
                    );
                    self.approvals.add(approval).await;
                }
                Err(err) => warn!(%err, approval_id = %payload.id, "failed to post approval request"),
            }
        })
    }

    fn on_response(&self, process_id: &str, request_id: Option<String>, payload: ResponsePayload) -> IpcFuture<'_, ()> {
        let process_id = process_id.to_owned();
        Box::pin(async move {
            handle_process_response(&process_id, request_id.as_deref(), &payload);
        })
    }

    fn on_unregister(&self, process_id: &str) -> IpcFuture<'_, ()> {
        let process_id = process_id.to_owned();
        Box::pin(async move {
            if let Some(removed) = self.registry.unregister(&process_id).await {
                info!(process_id = %process_id, name = %removed.display_name(), "worker unregistered");
            }
        })
    }

    fn on_disconnect(&self, process_id: &str) -> IpcFuture<'_, ()> {
        let process_id = process_id.to_owned();
        Box::pin(async move {
            info!(process_id = %process_id, "ipc connection closed, leaving registry entry for the stale reaper");
        })
    }
}

/// Command-response routing hook (§9 Open Question). Worker `response`
/// frames carry a `request_id` but nothing here correlates them back to an
/// outstanding chat reply; this hook only logs. A future extension that
/// wants to route responses to chat should start here.
fn handle_process_response(process_id: &str, request_id: Option<&str>, payload: &ResponsePayload) {
    info!(
        process_id = %process_id,
        request_id = ?request_id,
        success = payload.success,
        message = %payload.message,
        "worker response received (no chat correlation wired)"
    );
}

enum TargetResolution {
    Found(ProcessInfo),
    NotFound(String),
    NoneConnected,
    Ambiguous(Vec<ProcessInfo>),
}

async fn resolve_target(registry: &Registry, target: Option<&str>, bound: Option<&str>) -> TargetResolution {
    if let Some(target) = target {
        return match registry.find(target).await {
            Some(process) => TargetResolution::Found(process),
            None => TargetResolution::NotFound(target.to_owned()),
        };
    }
    if let Some(bound) = bound {
        return match registry.find(bound).await {
            Some(process) => TargetResolution::Found(process),
            None => TargetResolution::NotFound(bound.to_owned()),
        };
    }
    let mut processes = registry.list().await;
    match processes.len() {
        0 => TargetResolution::NoneConnected,
        1 => TargetResolution::Found(processes.remove(0)),
        _ => TargetResolution::Ambiguous(processes),
    }
}

fn resolution_message(resolution: &TargetResolution) -> String {
    match resolution {
        TargetResolution::Found(process) => process.name(),
        TargetResolution::NoneConnected => "No processes connected.".to_owned(),
        TargetResolution::NotFound(query) => format!("Process `{query}` not found."),
        TargetResolution::Ambiguous(processes) => {
            let names: Vec<String> = processes.iter().map(ProcessInfo::display_name).collect();
            format!(
                "Multiple processes are connected ({}); specify one by name, or `bind` to one first.",
                names.join(", ")
            )
        }
    }
}

fn approval_button_kind(button_id: &str) -> Option<bool> {
    if button_id.starts_with("approve_") {
        Some(true)
    } else if button_id.starts_with("reject_") {
        Some(false)
    } else {
        None
    }
}

fn status_label(status: ProcessStatus) -> &'static str {
    match status {
        ProcessStatus::Idle => "idle",
        ProcessStatus::Busy => "busy",
        ProcessStatus::Error => "error",
    }
}

fn render_list(processes: &[ProcessInfo]) -> String {
    if processes.is_empty() {
        return "No processes connected.".to_owned();
    }
    processes
        .iter()
        .map(|p| {
            let task = p.current_task.as_deref().unwrap_or("idle");
            format!(
                "{} {} — {} — {}",
                p.status.emoji(),
                p.display_name(),
                p.workspace_path.display(),
                task
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_status(process: &ProcessInfo) -> String {
    let task = process.current_task.as_deref().unwrap_or("idle");
    format!(
        "{} **{}**\nstatus: {}\ntask: {}\npath: {}",
        process.status.emoji(),
        process.display_name(),
        status_label(process.status),
        task,
        process.workspace_path.display()
    )
}

fn parse_hhmm(value: &str) -> Option<u32> {
    let (h, m) = value.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

fn quiet_window_contains(start: u32, end: u32, now_minute: u32) -> bool {
    if start < end {
        start <= now_minute && now_minute < end
    } else {
        now_minute >= start || now_minute < end
    }
}

fn current_minute_of_day(timezone: &str) -> u32 {
    match timezone.parse::<Tz>() {
        Ok(tz) => {
            let now = Utc::now().with_timezone(&tz);
            now.hour() * 60 + now.minute()
        }
        Err(_) => {
            let now = Local::now();
            now.hour() * 60 + now.minute()
        }
    }
}

fn is_quiet_hour(quiet: &QuietHoursConfig) -> bool {
    if !quiet.enabled {
        return false;
    }
    let Some(start) = parse_hhmm(&quiet.start) else {
        return false;
    };
    let Some(end) = parse_hhmm(&quiet.end) else {
        return false;
    };
    quiet_window_contains(start, end, current_minute_of_day(&quiet.timezone))
}

fn merge_router(existing: Option<Router>, next: Router) -> Router {
    match existing {
        Some(router) => router.merge(next),
        None => next,
    }
}

async fn serve_http(router: Router, port: u16, cancel: CancellationToken) {
    let addr = format!("0.0.0.0:{port}");
    match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => {
            info!(%addr, "http router listening");
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                cancel.cancelled().await;
            });
            if let Err(err) = server.await {
                error!(%err, "http server exited with error");
            }
        }
        Err(err) => error!(%err, %addr, "failed to bind http listener"),
    }
}

async fn shutdown_with_timeout(label: &str, handle: JoinHandle<()>) {
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
        warn!(%label, "task did not shut down within timeout");
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn cross_midnight_quiet_hours_matches_boundary_examples() {
        let start = parse_hhmm("23:00").unwrap();
        let end = parse_hhmm("07:00").unwrap();
        assert!(quiet_window_contains(start, end, 23 * 60 + 30));
        assert!(quiet_window_contains(start, end, 3 * 60));
        assert!(!quiet_window_contains(start, end, 12 * 60));
    }

    #[test]
    fn same_day_window_excludes_end_minute() {
        let start = parse_hhmm("09:00").unwrap();
        let end = parse_hhmm("17:00").unwrap();
        assert!(quiet_window_contains(start, end, 9 * 60));
        assert!(!quiet_window_contains(start, end, 17 * 60));
    }

    #[test]
    fn malformed_time_string_is_not_quiet() {
        let quiet = QuietHoursConfig {
            enabled: true,
            start: "garbage".into(),
            end: "07:00".into(),
            timezone: "UTC".into(),
        };
        assert!(!is_quiet_hour(&quiet));
    }

    #[test]
    fn disabled_quiet_hours_never_suppress() {
        let quiet = QuietHoursConfig {
            enabled: false,
            start: "00:00".into(),
            end: "23:59".into(),
            timezone: "UTC".into(),
        };
        assert!(!is_quiet_hour(&quiet));
    }

    #[test]
    fn approval_button_kind_matches_prefixes() {
        assert_eq!(approval_button_kind("approve_A1"), Some(true));
        assert_eq!(approval_button_kind("reject_A1"), Some(false));
        assert_eq!(approval_button_kind("snooze_A1"), None);
    }

    #[tokio::test]
    async fn resolve_target_falls_back_to_single_registered_process() {
        let registry = Registry::new();
        registry.register(ProcessInfo::new("p1".into(), PathBuf::from("/srv/api"), 1)).await;
        let resolution = resolve_target(&registry, None, None).await;
        assert!(matches!(resolution, TargetResolution::Found(p) if p.process_id == "p1"));
    }

    #[tokio::test]
    async fn resolve_target_reports_ambiguous_with_no_selector() {
        let registry = Registry::new();
        registry.register(ProcessInfo::new("p1".into(), PathBuf::from("/srv/api"), 1)).await;
        registry.register(ProcessInfo::new("p2".into(), PathBuf::from("/srv/web"), 2)).await;
        let resolution = resolve_target(&registry, None, None).await;
        assert!(matches!(resolution, TargetResolution::Ambiguous(_)));
        let message = resolution_message(&resolution);
        assert!(message.contains("Multiple processes"));
    }

    #[tokio::test]
    async fn resolve_target_prefers_explicit_target_over_binding() {
        let registry = Registry::new();
        registry.register(ProcessInfo::new("p1".into(), PathBuf::from("/srv/api"), 1)).await;
        registry.register(ProcessInfo::new("p2".into(), PathBuf::from("/srv/web"), 2)).await;
        let resolution = resolve_target(&registry, Some("web"), Some("api")).await;
        assert!(matches!(resolution, TargetResolution::Found(p) if p.process_id == "p2"));
    }

    #[tokio::test]
    async fn resolve_target_not_found_reports_query() {
        let registry = Registry::new();
        let resolution = resolve_target(&registry, Some("ghost"), None).await;
        let message = resolution_message(&resolution);
        assert_eq!(message, "Process `ghost` not found.");
    }

    #[test]
    fn render_list_reports_no_processes_connected() {
        assert_eq!(render_list(&[]), "No processes connected.");
    }

    #[test]
    fn render_status_includes_display_name_and_task() {
        let mut process = ProcessInfo::new("p1".into(), PathBuf::from("/srv/api"), 1);
        process.current_task = Some("running tests".into());
        let rendered = render_status(&process);
        assert!(rendered.contains("api"));
        assert!(rendered.contains("running tests"));
    }

    fn test_config() -> Arc<GlobalConfig> {
        Arc::new(GlobalConfig::from_toml_str("").unwrap())
    }

    fn test_message(user_id: &str, chat_id: &str, content: &str) -> InboundMessage {
        InboundMessage {
            message_id: "m1".into(),
            platform: Platform::Telegram,
            chat_id: chat_id.into(),
            thread_id: None,
            user_id: user_id.into(),
            user_name: "tester".into(),
            content: content.into(),
            reply_to: None,
            timestamp: Utc::now(),
            is_mention: true,
            is_direct_message: true,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn bind_then_send_task_reports_binding_and_dispatch() {
        let gateway = Gateway::new(test_config()).unwrap();
        gateway
            .registry
            .register(ProcessInfo::new("p1".into(), PathBuf::from("/srv/api"), 1))
            .await;

        let msg = test_message("u1", "C1", "bind api");
        let session = gateway.sessions.get_or_create(Platform::Telegram, "u1", "C1").await;
        let bind_intent = Intent::new(IntentKind::Bind, "bind api").with_target("api");
        let reply = gateway.dispatch_intent(&msg, &session, bind_intent).await;
        assert_eq!(reply, Some("Bound to `api`.".to_owned()));

        let session = gateway.sessions.get_or_create(Platform::Telegram, "u1", "C1").await;
        assert_eq!(session.bound_process.as_deref(), Some("api"));

        let task_msg = test_message("u1", "C1", "run tests");
        let task_intent = Intent::new(IntentKind::SendTask, "run tests").with_task("run tests");
        let reply = gateway.dispatch_intent(&task_msg, &session, task_intent).await;
        assert_eq!(reply, Some("Task sent to `api`.".to_owned()));
    }

    #[tokio::test]
    async fn approve_via_text_reply_removes_approval_and_confirms() {
        let gateway = Gateway::new(test_config()).unwrap();
        let approval = PendingApproval::new(
            "A1".into(),
            "p1".into(),
            ReplyContext {
                platform: Platform::Telegram,
                chat_id: "C1".into(),
                message_id: Some("M42".into()),
                thread_id: None,
            },
            Some("M42".into()),
            300,
        );
        gateway.approvals.add(approval).await;

        let mut msg = test_message("u7", "C1", "approve");
        msg.reply_to = Some("M42".into());
        let intent = Intent::new(IntentKind::Approve, "approve").with_approved(true);
        let reply = gateway.dispatch_intent(&msg, &gateway.sessions.get_or_create(Platform::Telegram, "u7", "C1").await, intent).await;

        assert_eq!(reply, Some("Request approved.".to_owned()));
        assert!(gateway.approvals.get("A1").await.is_none());
    }

    #[tokio::test]
    async fn approving_twice_reports_no_pending_approval_found() {
        let gateway = Gateway::new(test_config()).unwrap();
        let mut msg = test_message("u7", "C1", "approve");
        msg.reply_to = Some("M42".into());
        let intent = Intent::new(IntentKind::Approve, "approve").with_approved(true);
        let session = gateway.sessions.get_or_create(Platform::Telegram, "u7", "C1").await;
        let reply = gateway.dispatch_intent(&msg, &session, intent).await;
        assert_eq!(
            reply,
            Some("No pending approval found. Reply to the request or use the buttons.".to_owned())
        );
    }

    #[tokio::test]
    async fn send_task_after_stale_reap_reports_not_found() {
        let gateway = Gateway::new(test_config()).unwrap();
        let mut process = ProcessInfo::new("p1".into(), PathBuf::from("/srv/api"), 1);
        process.last_seen = Utc::now() - chrono::Duration::seconds(35);
        gateway.registry.register(process).await;

        let removed = gateway.registry.cleanup_stale(chrono::Duration::seconds(30)).await;
        assert_eq!(removed, vec!["api".to_owned()]);

        let msg = test_message("u1", "C1", "api run tests");
        let intent = Intent::new(IntentKind::SendTask, "api run tests")
            .with_target("api")
            .with_task("run tests");
        let session = gateway.sessions.get_or_create(Platform::Telegram, "u1", "C1").await;
        let reply = gateway.dispatch_intent(&msg, &session, intent).await;
        assert_eq!(reply, Some("Process `api` not found.".to_owned()));
    }

    #[tokio::test]
    async fn status_with_two_processes_reports_ambiguous() {
        let gateway = Gateway::new(test_config()).unwrap();
        gateway.registry.register(ProcessInfo::new("p1".into(), PathBuf::from("/srv/api"), 1)).await;
        gateway.registry.register(ProcessInfo::new("p2".into(), PathBuf::from("/srv/web"), 2)).await;

        let msg = test_message("u1", "C1", "status");
        let intent = Intent::new(IntentKind::QueryStatus, "status");
        let session = gateway.sessions.get_or_create(Platform::Telegram, "u1", "C1").await;
        let reply = gateway.dispatch_intent(&msg, &session, intent).await.unwrap();
        assert!(reply.contains("Multiple processes"));
    }
}
