mod common;
mod help;
mod world_roundtrip;
