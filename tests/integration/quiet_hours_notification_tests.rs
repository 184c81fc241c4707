//! S4 (quiet-hours suppression) driven over a real `IpcHub` Unix socket: two
//! notifications arrive back-to-back on the same connection and only the
//! `error`-level one should survive the quiet-hours gate.

use std::sync::Arc;

use bot_gateway::config::QuietHoursConfig;
use bot_gateway::ipc::{IpcEventHandler, IpcFuture, IpcHub};
use bot_gateway::model::ipc::{HeartbeatPayload, NotificationLevel, NotificationPayload, ResponsePayload};
use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::{GenericFilePath, ToFsName};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Mirrors the gateway's own `is_quiet_hour` gate: `error` is never
/// suppressed regardless of the configured window (§4.7 edge case).
fn passes_quiet_hours(quiet: &QuietHoursConfig, level: NotificationLevel) -> bool {
    if matches!(level, NotificationLevel::Error) {
        return true;
    }
    !quiet.enabled
}

struct RecordingHandler {
    quiet: QuietHoursConfig,
    delivered: Arc<Mutex<Vec<NotificationPayload>>>,
}

impl IpcEventHandler for RecordingHandler {
    fn on_register(&self, _payload: bot_gateway::model::ipc::RegisterPayload) -> IpcFuture<'_, ()> {
        Box::pin(async {})
    }
    fn on_heartbeat(&self, _payload: HeartbeatPayload) -> IpcFuture<'_, ()> {
        Box::pin(async {})
    }
    fn on_notification(&self, _process_id: &str, payload: NotificationPayload) -> IpcFuture<'_, ()> {
        Box::pin(async move {
            if passes_quiet_hours(&self.quiet, payload.level) {
                self.delivered.lock().await.push(payload);
            }
        })
    }
    fn on_approval(
        &self,
        _process_id: &str,
        _payload: bot_gateway::model::ipc::ApprovalPayload,
    ) -> IpcFuture<'_, ()> {
        Box::pin(async {})
    }
    fn on_response(
        &self,
        _process_id: &str,
        _request_id: Option<String>,
        _payload: ResponsePayload,
    ) -> IpcFuture<'_, ()> {
        Box::pin(async {})
    }
    fn on_unregister(&self, _process_id: &str) -> IpcFuture<'_, ()> {
        Box::pin(async {})
    }
    fn on_disconnect(&self, _process_id: &str) -> IpcFuture<'_, ()> {
        Box::pin(async {})
    }
}

#[tokio::test]
async fn info_is_dropped_and_error_is_posted_back_to_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket_path = dir.path().join("gw.sock");
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let quiet = QuietHoursConfig {
        enabled: true,
        start: "00:00".into(),
        end: "23:59".into(),
        timezone: "UTC".into(),
    };
    let hub = Arc::new(IpcHub::new(socket_path.clone()));
    let cancel = CancellationToken::new();
    let handler: Arc<dyn IpcEventHandler> = Arc::new(RecordingHandler {
        quiet,
        delivered: Arc::clone(&delivered),
    });
    let join = Arc::clone(&hub).start(handler, cancel.clone()).expect("starts");

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let name = socket_path.clone().to_fs_name::<GenericFilePath>().expect("valid name");
    let mut stream = Stream::connect(name).await.expect("connects");

    let register = serde_json::json!({
        "type": "register",
        "payload": {"process_id": "worker-1", "process_path": "/srv/api", "pid": 7}
    });
    stream.write_all(format!("{register}\n").as_bytes()).await.expect("writes register");

    let info = serde_json::json!({
        "type": "notification",
        "payload": {"level": "info", "title": "heads up", "message": "building"}
    });
    let error = serde_json::json!({
        "type": "notification",
        "payload": {"level": "error", "title": "build failed", "message": "exit 1"}
    });
    stream.write_all(format!("{info}\n").as_bytes()).await.expect("writes info notification");
    stream.write_all(format!("{error}\n").as_bytes()).await.expect("writes error notification");

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let delivered = delivered.lock().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].level, NotificationLevel::Error);
    assert_eq!(delivered[0].title, "build failed");

    cancel.cancel();
    hub.stop().await;
    let _ = join.await;
}
