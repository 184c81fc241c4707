#![forbid(unsafe_code)]

//! `bot-gateway` — local broker between worker processes and chat platforms.
//!
//! The gateway accepts worker connections over a Unix-domain-socket IPC hub
//! (see [`ipc`]), receives free-form chat messages from platform adapters
//! (see [`adapters`]), parses them into structured intents (see [`intent`]),
//! and routes commands to the bound worker while correlating approvals
//! between workers and chat buttons/replies (see [`gateway`]).

mod errors;

pub use errors::{AppError, Result};

pub mod adapters;
pub mod approval;
pub mod cleanup;
pub mod config;
pub mod config_watch;
pub mod gateway;
pub mod intent;
pub mod ipc;
pub mod model;
pub mod registry;
pub mod session;
