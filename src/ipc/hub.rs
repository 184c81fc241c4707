//! Unix-domain-socket listener, per-connection worker sessions, and the
//! `process_id -> connection` map (§4.6).

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::{GenericFilePath, ListenerOptions, ToFsName};
use serde::Serialize;
use tokio::io::{split, AsyncBufReadExt, AsyncWriteExt, BufReader, WriteHalf};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::model::ipc::{
    ApprovalPayload, CommandPayload, HeartbeatPayload, IpcFrame, IpcMessageType,
    NotificationPayload, RegisterPayload, ResponsePayload,
};
use crate::{AppError, Result};

/// Boxed future alias used to keep [`IpcEventHandler`] object-safe without
/// requiring `async_trait`.
pub type IpcFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callbacks the IPC Hub invokes as frames arrive. Implemented by the
/// Gateway Core so the hub itself stays free of routing/dispatch logic.
pub trait IpcEventHandler: Send + Sync {
    /// First frame on a connection: bind `process_id` to the Registry.
    fn on_register(&self, payload: RegisterPayload) -> IpcFuture<'_, ()>;
    /// Liveness/status update from a worker.
    fn on_heartbeat(&self, payload: HeartbeatPayload) -> IpcFuture<'_, ()>;
    /// Fire-and-forget notice bound for the default chat.
    fn on_notification(&self, process_id: &str, payload: NotificationPayload) -> IpcFuture<'_, ()>;
    /// A worker is requesting a human yes/no.
    fn on_approval(&self, process_id: &str, payload: ApprovalPayload) -> IpcFuture<'_, ()>;
    /// Result of a previously dispatched command.
    fn on_response(
        &self,
        process_id: &str,
        request_id: Option<String>,
        payload: ResponsePayload,
    ) -> IpcFuture<'_, ()>;
    /// Graceful disconnect notice from a worker.
    fn on_unregister(&self, process_id: &str) -> IpcFuture<'_, ()>;
    /// The connection closed or errored without an explicit `unregister`.
    fn on_disconnect(&self, process_id: &str) -> IpcFuture<'_, ()>;
}

type Writer = Arc<Mutex<WriteHalf<Stream>>>;

/// Owns the Unix-domain-socket listener and the live `process_id -> writer`
/// map. Reads are dispatched to an [`IpcEventHandler`]; writes go out via
/// [`IpcHub::send`].
pub struct IpcHub {
    socket_path: PathBuf,
    connections: RwLock<HashMap<String, Writer>>,
    conn_cancel: CancellationToken,
    conn_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl IpcHub {
    /// Construct a hub bound to `socket_path` (not yet listening).
    #[must_use]
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            connections: RwLock::new(HashMap::new()),
            conn_cancel: CancellationToken::new(),
            conn_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Remove any stale socket file, bind the listener, and spawn the accept
    /// loop. The returned handle completes once `cancel` fires and the loop
    /// has finished unwinding.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ipc` if the socket path is invalid or the listener
    /// cannot be created.
    pub fn start(
        self: Arc<Self>,
        handler: Arc<dyn IpcEventHandler>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        if self.socket_path.exists() {
            if let Err(err) = std::fs::remove_file(&self.socket_path) {
                warn!(path = %self.socket_path.display(), %err, "failed to remove stale ipc socket");
            }
        }

        let name = self
            .socket_path
            .clone()
            .to_fs_name::<GenericFilePath>()
            .map_err(|err| {
                AppError::Ipc(format!(
                    "invalid ipc socket path '{}': {err}",
                    self.socket_path.display()
                ))
            })?;

        let listener = ListenerOptions::new().name(name).create_tokio().map_err(|err| {
            AppError::Ipc(format!("failed to bind ipc listener: {err}"))
        })?;

        info!(path = %self.socket_path.display(), "ipc hub listening");

        let hub = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let span = info_span!("ipc_hub");
            async move {
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            info!("ipc hub shutting down");
                            break;
                        }
                        accepted = listener.accept() => {
                            match accepted {
                                Ok(stream) => {
                                    let conn_hub = Arc::clone(&hub);
                                    let conn_handler = Arc::clone(&handler);
                                    let conn_cancel = hub.conn_cancel.clone();
                                    let task = tokio::spawn(
                                        conn_hub.handle_connection(stream, conn_handler, conn_cancel),
                                    );
                                    hub.conn_tasks.lock().await.push(task);
                                }
                                Err(err) => warn!(%err, "ipc accept failed"),
                            }
                        }
                    }
                }
            }
            .instrument(span)
            .await;
        });

        Ok(handle)
    }

    /// Close every live connection, the listener, and remove the socket file.
    /// Signals every `handle_connection` task to stop reading and waits for
    /// all of them to finish before returning (§4.7/§5 wait-group guarantee).
    pub async fn stop(&self) {
        self.conn_cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.conn_tasks.lock().await);
        for task in tasks {
            if let Err(err) = task.await {
                warn!(%err, "ipc connection task panicked during shutdown");
            }
        }

        self.connections.write().await.clear();
        if self.socket_path.exists() {
            if let Err(err) = std::fs::remove_file(&self.socket_path) {
                warn!(path = %self.socket_path.display(), %err, "failed to remove ipc socket on shutdown");
            }
        }
    }

    /// Encode `payload` as one JSON-object frame and write it to
    /// `process_id`'s connection. Writes to a single connection are
    /// serialized by the connection's own mutex.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProcessNotConnected` if no live connection is
    /// registered for `process_id`.
    pub async fn send<P: Serialize>(
        &self,
        process_id: &str,
        msg_type: IpcMessageType,
        request_id: Option<String>,
        payload: &P,
    ) -> Result<()> {
        let writer = {
            let connections = self.connections.read().await;
            connections
                .get(process_id)
                .cloned()
                .ok_or_else(|| AppError::ProcessNotConnected(process_id.to_owned()))?
        };

        let frame = IpcFrame::new(msg_type, request_id, payload)
            .map_err(|err| AppError::Ipc(format!("failed to encode frame: {err}")))?;
        let mut line = serde_json::to_string(&frame)
            .map_err(|err| AppError::Ipc(format!("failed to serialize frame: {err}")))?;
        line.push('\n');

        let mut guard = writer.lock().await;
        guard
            .write_all(line.as_bytes())
            .await
            .map_err(|err| AppError::Ipc(format!("failed to write frame: {err}")))?;
        Ok(())
    }

    /// Command dispatch convenience wrapper over [`IpcHub::send`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProcessNotConnected` if the process is not live.
    pub async fn send_command(
        &self,
        process_id: &str,
        request_id: Option<String>,
        payload: &CommandPayload,
    ) -> Result<()> {
        self.send(process_id, IpcMessageType::Command, request_id, payload)
            .await
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: Stream,
        handler: Arc<dyn IpcEventHandler>,
        conn_cancel: CancellationToken,
    ) {
        let (read_half, write_half) = split(stream);
        let mut reader = BufReader::new(read_half);
        let writer: Writer = Arc::new(Mutex::new(write_half));
        let mut line = String::new();
        let mut process_id: Option<String> = None;

        // REGISTER must be the first frame on the connection.
        let first_frame = tokio::select! {
            () = conn_cancel.cancelled() => return,
            frame = read_frame(&mut reader, &mut line) => frame,
        };
        match first_frame {
            Ok(Some(frame)) if frame.msg_type == IpcMessageType::Register => {
                match serde_json::from_value::<RegisterPayload>(frame.payload) {
                    Ok(payload) => {
                        let id = payload.process_id.clone();
                        self.connections.write().await.insert(id.clone(), Arc::clone(&writer));
                        process_id = Some(id);
                        handler.on_register(payload).await;
                    }
                    Err(err) => {
                        warn!(%err, "malformed register payload, closing connection");
                        return;
                    }
                }
            }
            Ok(Some(_)) => {
                warn!("first frame on connection was not register, closing");
                return;
            }
            Ok(None) | Err(_) => return,
        }

        let Some(process_id) = process_id else { return };
        let span = info_span!("ipc_conn", process_id = %process_id);
        async {
            loop {
                let next_frame = tokio::select! {
                    () = conn_cancel.cancelled() => break,
                    frame = read_frame(&mut reader, &mut line) => frame,
                };
                match next_frame {
                    Ok(Some(frame)) => self.dispatch(&process_id, frame, &handler).await,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(%err, "ipc frame decode error, terminating session");
                        break;
                    }
                }
            }
        }
        .instrument(span)
        .await;

        self.connections.write().await.remove(&process_id);
        handler.on_disconnect(&process_id).await;
        info!(process_id = %process_id, "ipc connection closed");
    }

    async fn dispatch(&self, process_id: &str, frame: IpcFrame, handler: &Arc<dyn IpcEventHandler>) {
        match frame.msg_type {
            IpcMessageType::Heartbeat => match serde_json::from_value(frame.payload) {
                Ok(payload) => handler.on_heartbeat(payload).await,
                Err(err) => warn!(%err, "malformed heartbeat payload"),
            },
            IpcMessageType::Notification => match serde_json::from_value(frame.payload) {
                Ok(payload) => handler.on_notification(process_id, payload).await,
                Err(err) => warn!(%err, "malformed notification payload"),
            },
            IpcMessageType::Approval => match serde_json::from_value(frame.payload) {
                Ok(payload) => handler.on_approval(process_id, payload).await,
                Err(err) => warn!(%err, "malformed approval payload"),
            },
            IpcMessageType::Response => match serde_json::from_value(frame.payload) {
                Ok(payload) => handler.on_response(process_id, frame.request_id, payload).await,
                Err(err) => warn!(%err, "malformed response payload"),
            },
            IpcMessageType::Unregister => handler.on_unregister(process_id).await,
            IpcMessageType::Register | IpcMessageType::ApprovalResponse | IpcMessageType::Command => {
                warn!(msg_type = ?frame.msg_type, "unexpected frame direction from worker, ignoring");
            }
        }
    }
}

async fn read_frame(
    reader: &mut BufReader<tokio::io::ReadHalf<Stream>>,
    line: &mut String,
) -> Result<Option<IpcFrame>> {
    line.clear();
    let bytes_read = reader
        .read_line(line)
        .await
        .map_err(|err| AppError::Ipc(format!("ipc read error: {err}")))?;
    if bytes_read == 0 {
        return Ok(None);
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|err| AppError::Ipc(format!("malformed ipc frame: {err}")))
}

/// Resolve the default IPC socket path under the process temp directory.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join("zen-gateway.sock")
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tokio::io::AsyncWriteExt as _;

    use super::*;
    use crate::model::ipc::{CommandReplyTo, CommandUser};
    use crate::model::intent::{Intent, IntentKind};
    use crate::model::Platform;

    struct RecordingHandler;

    impl IpcEventHandler for RecordingHandler {
        fn on_register(&self, _payload: RegisterPayload) -> IpcFuture<'_, ()> {
            Box::pin(async {})
        }
        fn on_heartbeat(&self, _payload: HeartbeatPayload) -> IpcFuture<'_, ()> {
            Box::pin(async {})
        }
        fn on_notification(&self, _process_id: &str, _payload: NotificationPayload) -> IpcFuture<'_, ()> {
            Box::pin(async {})
        }
        fn on_approval(&self, _process_id: &str, _payload: ApprovalPayload) -> IpcFuture<'_, ()> {
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
    #[serial]
    async fn send_to_unknown_process_is_not_connected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hub = IpcHub::new(dir.path().join("gw.sock"));
        let payload = CommandPayload {
            intent: Intent::new(IntentKind::SendTask, "run"),
            user: CommandUser {
                id: "u1".into(),
                name: "u1".into(),
                platform: Platform::Telegram,
            },
            reply_to: CommandReplyTo {
                platform: Platform::Telegram,
                chat_id: "c1".into(),
                message_id: None,
                thread_id: None,
            },
        };
        let err = hub.send_command("ghost", None, &payload).await.unwrap_err();
        assert!(matches!(err, AppError::ProcessNotConnected(_)));
    }

    #[tokio::test]
    #[serial]
    async fn accept_loop_registers_and_dispatches_heartbeat() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket_path = dir.path().join("gw.sock");
        let hub = Arc::new(IpcHub::new(socket_path.clone()));
        let cancel = CancellationToken::new();
        let handler: Arc<dyn IpcEventHandler> = Arc::new(RecordingHandler);
        let join = Arc::clone(&hub).start(handler, cancel.clone()).expect("starts");

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let name = socket_path
            .clone()
            .to_fs_name::<GenericFilePath>()
            .expect("valid name");
        let mut stream = Stream::connect(name).await.expect("connects");
        let register = serde_json::json!({
            "type": "register",
            "payload": {"process_id": "p1", "process_path": "/srv/api", "pid": 1}
        });
        stream
            .write_all(format!("{register}\n").as_bytes())
            .await
            .expect("writes register");

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(hub.connections.read().await.contains_key("p1"));

        cancel.cancel();
        let _ = join.await;
    }
}
