//! IPC Hub (C6): the Unix-domain-socket listener that accepts worker
//! connections and fans commands out to a specific worker.

pub mod hub;

pub use hub::{IpcEventHandler, IpcFuture, IpcHub};
