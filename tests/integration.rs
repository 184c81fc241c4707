#![allow(clippy::expect_used, clippy::unwrap_used, missing_docs)]

mod integration {
    mod approval_button_flow_tests;
    mod cleanup_tests;
    mod quiet_hours_notification_tests;
}
