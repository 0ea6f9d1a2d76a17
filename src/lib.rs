//! connslot - fixed-size connection slot multiplexer
//!
//! Serves request/reply conversations over TCP and local sockets from a
//! single thread, with bounded per-connection memory.

pub mod buffer;
pub mod config;
pub mod handler;
pub mod http;
pub mod server;
