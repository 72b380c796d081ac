//! Usage: External login flow (identity backend client, callback listener,
//! coordinator, browser launch).

pub mod backend;
pub(crate) mod browser;
pub mod callback_server;
pub mod coordinator;
