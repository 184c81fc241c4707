//! Domain model module declarations.

pub mod approval;
pub mod button;
pub mod intent;
pub mod ipc;
pub mod message;
pub mod platform;
pub mod process;
pub mod session;

pub use approval::PendingApproval;
pub use button::{Button, ButtonClick, ButtonStyle};
pub use intent::Intent;
pub use message::{InboundMessage, MessageFormat, OutboundMessage, ReplyContext};
pub use platform::Platform;
pub use process::{ProcessInfo, ProcessStatus};
pub use session::Session;
