//! Types shared between the fruit arena server and its clients.
//!
//! Every wire type derives `ts_rs::TS` so the browser client can import
//! generated TypeScript bindings instead of hand-maintaining them.

pub mod config;
pub mod protocol;
