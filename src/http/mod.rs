//! HTTP-like request/response plumbing.
//!
//! Nothing here is a general HTTP implementation. The layer only knows how
//! to find where a request ends and how to push a two-part reply (generated
//! header + body) back out.
//!
//! - **`framing`**: Locates the header terminator and the optional `Content-Length:`
//! - **`connection`**: Per-slot state machine driving reads and vectored writes
//! - **`request`**: Borrowed view of a complete request for handlers
//! - **`response`**: Status codes, responses and the tagged reply body
//! - **`writer`**: Serialises a response head into the reply header buffer
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │    Empty    │ ← Free slot, no descriptor
//!        └──────┬──────┘
//!               │ Accepted
//!               ▼
//!        ┌─────────────┐
//!        │   Reading   │ ← Accumulate bytes until framed
//!        └──────┬──────┘
//!               │ Terminator + body seen         (peer close → Empty)
//!               ▼
//!        ┌─────────────┐
//!        │    Ready    │ ← Handler fills in the reply
//!        └──────┬──────┘
//!               │ First write attempt
//!               ▼
//!        ┌─────────────┐
//!        │   Sending   │ ← Partial vectored writes
//!        └──────┬──────┘
//!               │ Reply flushed
//!               ├─ keep_alive → Reading (same descriptor)
//!               └─ otherwise  → Empty
//! ```

pub mod connection;
pub mod framing;
pub mod request;
pub mod response;
pub mod writer;
