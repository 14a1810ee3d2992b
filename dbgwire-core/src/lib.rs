//! # dbgwire-core
//!
//! Ships application debug events to a remote debug listener.
//!
//! This crate contains:
//! - **Frame**: length-prefixed frame layout (`0xCE` marker, 4-byte length)
//! - **Codec**: `FrameCodec` for framed reads and writes via `tokio_util`
//! - **Writer**: per-stream buffered writer task with exactly-once terminal notification
//! - **Slot**: the shared "current writer" reference
//! - **Discovery**: browse for listeners, connect, install the newest writer
//! - **Debugger**: `write(action, state, snapshot)` entry point
//! - **Error**: `DebugError`, a `thiserror`-based error type

pub mod codec;
pub mod config;
pub mod debugger;
pub mod discovery;
pub mod error;
pub mod event;
pub mod frame;
pub mod slot;
pub mod writer;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::FrameCodec;
pub use config::{DebuggerConfig, DiscoveryConfig, EncodingConfig};
pub use debugger::Debugger;
pub use discovery::{
    ChannelBrowser, Connector, DiscoveryHandle, DiscoveryService, DiscoveryStats, Endpoint,
    ServiceBrowser, StaticBrowser, TcpConnector,
};
pub use error::DebugError;
pub use event::{DebugEvent, EventFormat, SnapshotError, SnapshotProvider};
pub use frame::{FRAME_MARKER, FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use slot::WriterSlot;
pub use writer::{
    CHUNK_SIZE, CloseReason, StreamEvent, WriterBuilder, WriterHandle, WriterId, WriterState,
    WriterStats, spawn_writer,
};
