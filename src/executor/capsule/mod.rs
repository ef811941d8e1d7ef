//! Capsule (long-running subprocess, line-delimited JSON-RPC) executor
//! (spec §4.6).

pub mod manager;
pub mod protocol;

pub use manager::{CapsuleHandle, CapsuleState};
