//! Sockets, readiness and the slot pool.

pub mod listener;
pub mod poll;
pub mod service;
pub mod slots;
pub mod stream;

pub use service::{ServeError, Server, Tick};
pub use slots::{ListenError, SlotError, Slots};
