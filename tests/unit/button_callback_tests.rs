//! Unit tests for the generic button callback-payload encoding (§6).

use bot_gateway::model::{Button, ButtonStyle};

#[test]
fn callback_round_trips_without_embedded_colon() {
    let button = Button::new("approve_A1", "Approve", ButtonStyle::Primary, "A1");
    let encoded = button.encode_callback();
    let (id, data) = Button::decode_callback(&encoded).expect("decodes");
    assert_eq!(id, "approve_A1");
    assert_eq!(data, "A1");
}

#[test]
fn only_first_colon_separates_button_id_from_data() {
    let encoded = "approve_A1:timestamp:2026-01-01T00:00:00Z";
    let (id, data) = Button::decode_callback(encoded).expect("decodes");
    assert_eq!(id, "approve_A1");
    assert_eq!(data, "timestamp:2026-01-01T00:00:00Z");
}
