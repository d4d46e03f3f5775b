//! Provider adapters sharing the [`super::LlmClient`] interface (§4.2, §2).

pub mod anthropic;
pub mod google;
pub mod mock;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use google::GoogleClient;
pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
