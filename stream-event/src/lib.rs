//! Wire protocol for events flowing out of a World's event bus (§6).
//!
//! This crate defines the shape of one event on the wire: which channel it
//! belongs to, its typed payload, and the envelope (`seq`, `worldId`, `chatId`)
//! that every transport (WebSocket, IPC, SSE) attaches before framing it for a
//! client. It has no dependency on the runtime crate — the bus builds
//! [`payload`] values and the transport layer is the only thing that touches
//! [`Envelope`].

pub mod channel;
pub mod envelope;
pub mod payload;

pub use channel::Channel;
pub use envelope::{Envelope, WireEvent};
pub use payload::{MessagePayload, Role, SsePayload, SseStreamKind, SystemPayload, WorldPayload};
