//! Purpose: Define the public Rust API for talking to the host plugin.
//! Exports: Wire envelopes, the single-response client, and the refresh stream client.
//! Role: Public, additive-only surface; hides framing internals behind clients.
//! Invariants: Transport errors surface as typed `Error`s from `try_*` calls only.
//! Invariants: `call`/`run` fold failures into their loose result types.

mod client;
mod message;
pub mod refresh;

#[doc(hidden)]
pub use crate::core::error::EXIT_FAILURE;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::frame::{FrameReader, MAX_FRAME_LEN, encode_frame, write_frame};
pub use client::{ApiResult, HostClient, connect};
pub use message::{
    Notification, PluginKind, ROUTE_GET_DATA_FOLDER, ROUTE_LOAD_PLUGIN, RefreshCommand, Request,
    Response,
};
pub use refresh::{EventSink, LogCategory, RefreshClient, RefreshEvent, RefreshSession};
