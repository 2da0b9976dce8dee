//! Purpose: Shared library crate used by the `opdev` and `op-refresh` CLIs and tests.
//! Exports: `api` (host protocols), `core` (framing, errors), packaging and host helpers.
//! Role: Internal library backing the binaries; not a stable public SDK.
//! Invariants: Every socket is owned by a single call and closed when it returns.
//! Invariants: Modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod console;
pub mod core;
pub mod host_log;
pub mod package;
pub mod targets;
