//! Transports carrying terminal bytes between remote clients and sessions.

pub mod host_keys;
pub mod ssh;
pub mod websocket;
