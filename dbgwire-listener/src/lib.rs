//! # dbgwire-listener
//!
//! Receiving end of a dbgwire stream. Accepts debugger connections,
//! decodes framed debug events and logs them, optionally saving each
//! snapshot image to disk.

pub mod config;
pub mod service;
