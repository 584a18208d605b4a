//! LLM integration for exercise-forge.
//!
//! Problem drafts and guided hints are produced by an external chat model.
//! The generator talks to it through [`LlmProvider`], so tests can script
//! responses without a network.
//!
//! ```ignore
//! use exercise_forge::llm::{complete_text, LiteLlmClient};
//!
//! let client = LiteLlmClient::from_env()?;
//! let raw = complete_text(&client, "You are ...", "Generate ...", "", 0.3, 5000).await?;
//! ```

pub mod litellm;

pub use litellm::{
    complete_text, Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider,
    Message, Usage, DEFAULT_MODEL,
};
