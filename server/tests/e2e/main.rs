//! e2e test binary: one process per `cargo test`, connecting over a real
//! WebSocket to an in-process server bound to an ephemeral port (run in `once`
//! mode so the server exits after the first connection closes).

mod common;

mod invalid_json;
mod ping;
mod subscribe_replays_backlog;
mod world_and_chat_lifecycle;
