//! Newline-delimited JSON request protocol.
//!
//! Each line a client sends is one JSON object with a `type` discriminator;
//! the daemon answers every line with exactly one JSON line, in order.
//! Malformed lines get `{"type":"error","message":...}` and the connection
//! stays open.

mod messages;
mod router;


pub use messages::{Request, Response, StatsPeriod};
pub use router::Router;
