//! S2 (approval flow via button) driven over a real `IpcHub` Unix socket
//! rather than in-process calls, paired with a real `ApprovalTracker`.

use std::sync::Arc;

use bot_gateway::approval::ApprovalTracker;
use bot_gateway::ipc::{IpcEventHandler, IpcFuture, IpcHub};
use bot_gateway::model::ipc::{
    ApprovalPayload, ApprovalResponsePayload, IpcMessageType, RegisterPayload,
};
use bot_gateway::model::{Platform, ReplyContext};
use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::{GenericFilePath, ToFsName};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Maps a generic-scheme button ID to the approve/reject it carries, mirroring
/// the gateway's own `approve_{id}` / `reject_{id}` encoding (§6).
fn approval_from_button(button_id: &str) -> Option<bool> {
    if button_id.starts_with("approve_") {
        Some(true)
    } else if button_id.starts_with("reject_") {
        Some(false)
    } else {
        None
    }
}

struct ApprovalHandler {
    tracker: Arc<ApprovalTracker>,
}

impl IpcEventHandler for ApprovalHandler {
    fn on_register(&self, _payload: RegisterPayload) -> IpcFuture<'_, ()> {
        Box::pin(async {})
    }
    fn on_heartbeat(&self, _payload: bot_gateway::model::ipc::HeartbeatPayload) -> IpcFuture<'_, ()> {
        Box::pin(async {})
    }
    fn on_notification(
        &self,
        _process_id: &str,
        _payload: bot_gateway::model::ipc::NotificationPayload,
    ) -> IpcFuture<'_, ()> {
        Box::pin(async {})
    }
    fn on_approval(&self, process_id: &str, payload: ApprovalPayload) -> IpcFuture<'_, ()> {
        let tracker = Arc::clone(&self.tracker);
        let process_id = process_id.to_owned();
        Box::pin(async move {
            let reply_context = ReplyContext {
                platform: Platform::Telegram,
                chat_id: "C1".into(),
                message_id: None,
                thread_id: None,
            };
            let approval = bot_gateway::model::PendingApproval::new(
                payload.id,
                process_id,
                reply_context,
                Some("M42".into()),
                payload.timeout.unwrap_or(0),
            );
            tracker.add(approval).await;
        })
    }
    fn on_response(
        &self,
        _process_id: &str,
        _request_id: Option<String>,
        _payload: bot_gateway::model::ipc::ResponsePayload,
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
async fn approve_a1_round_trips_approval_response_over_the_wire() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket_path = dir.path().join("gw.sock");
    let tracker = Arc::new(ApprovalTracker::new());
    let hub = Arc::new(IpcHub::new(socket_path.clone()));
    let cancel = CancellationToken::new();
    let handler: Arc<dyn IpcEventHandler> = Arc::new(ApprovalHandler {
        tracker: Arc::clone(&tracker),
    });
    let join = Arc::clone(&hub).start(handler, cancel.clone()).expect("starts");

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let name = socket_path.clone().to_fs_name::<GenericFilePath>().expect("valid name");
    let stream = Stream::connect(name).await.expect("connects");
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let register = serde_json::json!({
        "type": "register",
        "payload": {"process_id": "worker-1", "process_path": "/srv/api", "pid": 7}
    });
    write_half.write_all(format!("{register}\n").as_bytes()).await.expect("writes register");

    let approval = ApprovalPayload {
        id: "A1".into(),
        action: "delete files".into(),
        description: "Delete temp".into(),
        details: None,
        timeout: Some(300),
    };
    let frame = serde_json::json!({"type": "approval", "payload": approval});
    write_half.write_all(format!("{frame}\n").as_bytes()).await.expect("writes approval");

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let pending = tracker.get("A1").await.expect("approval tracked");
    assert_eq!(pending.process_id, "worker-1");

    // Simulate the user clicking the `approve_A1` button (§6 encoding) with
    // `data = "A1"` from user `u7`, then the resolution the gateway performs.
    let approved = approval_from_button("approve_A1").expect("known button prefix");
    assert!(approved);
    let response = ApprovalResponsePayload {
        request_id: pending.id.clone(),
        approved,
        comment: None,
        user_id: "u7".into(),
    };
    hub.send(&pending.process_id, IpcMessageType::ApprovalResponse, Some(pending.id.clone()), &response)
        .await
        .expect("sends approval_response back to worker");
    tracker.remove(&pending.id).await;

    let mut line = String::new();
    reader.read_line(&mut line).await.expect("reads approval_response frame");
    let received: serde_json::Value = serde_json::from_str(line.trim()).expect("valid json");
    assert_eq!(received["type"], "approval_response");
    assert_eq!(received["request_id"], "A1");
    assert_eq!(received["payload"]["request_id"], "A1");
    assert_eq!(received["payload"]["approved"], true);
    assert_eq!(received["payload"]["user_id"], "u7");

    assert!(tracker.get("A1").await.is_none());

    cancel.cancel();
    hub.stop().await;
    let _ = join.await;
}
