//! # runtime
//!
//! Core of the Agent World runtime: a process hosting any number of Worlds, each an
//! independent collection of LLM-backed agents that converse over one or more chats.
//!
//! ## Main modules
//!
//! - [`model`]: [`model::World`], [`model::Agent`], [`model::Chat`], [`model::AgentMessage`],
//!   [`model::Event`], [`model::ShellExecutionRecord`], [`model::SkillRegistryEntry`] — the
//!   persisted data shapes.
//! - [`error`]: [`error::WorldError`], [`error::ToolError`], [`error::ApprovalError`].
//! - [`storage`]: the [`storage::Storage`] trait a concrete backend implements.
//! - [`bus`]: [`bus::EventBus`] — per-world pub/sub with gap-free sequencing and replay.
//! - [`registry`]: [`registry::WorldRegistry`], [`registry::WorldRuntime`] — live per-world state.
//! - [`llm`]: [`llm::LlmClient`] trait, provider adapters, [`llm::queue::LlmQueue`].
//! - [`tools`]: the built-in [`tools::Tool`] table and [`tools::ToolRegistry`].
//! - [`execution`]: [`execution::ToolExecutionManager`], [`execution::ShellExecutionRegistry`].
//! - [`approval`]: [`approval::ApprovalGate`] and the natural-language grammar.
//! - [`skills`]: [`skills::SkillRegistry`].
//! - [`hitl`]: [`hitl::HitlCoordinator`] pairing a `hitl_request` call with its reply.
//! - [`orchestrator`]: mention resolution, eligibility, the processing pipeline.
//! - [`queue`]: the per-chat user-message queue.
//! - [`subscription`]: [`subscription::SubscriptionManager`] tying the bus to client connections.

pub mod approval;
pub mod bus;
pub mod error;
pub mod execution;
pub mod hitl;
pub mod llm;
pub mod model;
pub mod orchestrator;
pub mod queue;
pub mod registry;
pub mod skills;
pub mod storage;
pub mod subscription;
pub mod tools;

pub use bus::{EventBus, SubscriptionHandle};
pub use error::{ApprovalError, ToolError, WorldError, WorldResult};
pub use registry::{WorldRegistry, WorldRuntime};
pub use storage::Storage;
