//! Marshal/unmarshal round-trip coverage for the IPC wire frame (§6/§8).

use bot_gateway::model::intent::IntentKind;
use bot_gateway::model::ipc::{
    CommandPayload, CommandReplyTo, CommandUser, HeartbeatPayload, IpcFrame, IpcMessageType,
    RegisterPayload,
};
use bot_gateway::model::{Intent, Platform};

#[test]
fn register_frame_round_trips() {
    let payload = RegisterPayload {
        process_id: "p1".into(),
        process_path: "/srv/api".into(),
        socket_path: None,
        pid: 42,
    };
    let frame = IpcFrame::new(IpcMessageType::Register, None, &payload).expect("serializes");
    let line = serde_json::to_string(&frame).expect("json");
    let decoded: IpcFrame = serde_json::from_str(&line).expect("round trip");
    let decoded_payload: RegisterPayload = serde_json::from_value(decoded.payload).expect("payload decodes");
    assert_eq!(decoded_payload, payload);
}

#[test]
fn command_frame_carries_nested_intent() {
    let payload = CommandPayload {
        intent: Intent::new(IntentKind::SendTask, "run tests")
            .with_target("api")
            .with_task("run tests"),
        user: CommandUser {
            id: "u1".into(),
            name: "u1".into(),
            platform: Platform::Telegram,
        },
        reply_to: CommandReplyTo {
            platform: Platform::Telegram,
            chat_id: "c1".into(),
            message_id: Some("m1".into()),
            thread_id: None,
        },
    };
    let frame = IpcFrame::new(IpcMessageType::Command, Some("A1".into()), &payload).expect("serializes");
    let line = serde_json::to_string(&frame).expect("json");
    let decoded: IpcFrame = serde_json::from_str(&line).expect("round trip");
    let decoded_payload: CommandPayload = serde_json::from_value(decoded.payload).expect("payload decodes");
    assert_eq!(decoded_payload.intent.target.as_deref(), Some("api"));
    assert_eq!(decoded.request_id.as_deref(), Some("A1"));
}

#[test]
fn extra_unknown_fields_are_ignored() {
    let raw = r#"{"type":"heartbeat","payload":{"process_id":"p1","status":"idle","extra":"ignored"}}"#;
    let frame: IpcFrame = serde_json::from_str(raw).expect("decodes despite extra field");
    let payload: HeartbeatPayload =
        serde_json::from_value(frame.payload).expect("payload decodes despite extra field");
    assert_eq!(payload.process_id, "p1");
}
