//! # Voice Module
//!
//! Per-guild voice session management.
//!
//! - [`state`]: the per-guild aggregate (connect lock, queue, playback task, voice profile)
//!   and the registry that creates it on first use
//! - [`connection`]: connect / move / disconnect with retries, backoff and a final
//!   reconciliation read
//! - [`lifecycle`]: cleanup after the bot is dropped from its channel

pub mod connection;
pub mod lifecycle;
pub mod state;
