//! Download engine
//!
//! One task per transfer:
//! - Streaming GET with a bounded connect time
//! - Bytes buffered into fixed-size chunks and written to a hidden temp file
//! - Progress routed through the registry after every chunk
//! - Cooperative cancellation checked at chunk boundaries and raced against
//!   every wait on the server, each of which is also bounded by the stall timeout
//! - Atomic rename into place on success, no leftovers on any other outcome

mod client;
mod download_task;

pub use client::*;
pub use download_task::*;
