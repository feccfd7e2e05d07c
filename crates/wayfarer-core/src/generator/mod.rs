//! Plan generator port and connectors.
//!
//! A [`PlanGenerator`] turns a [`Prompt`] into itinerary text. The lifecycle
//! service owns the deadline; connectors report their own failures as
//! [`GeneratorError`] and know nothing about plans or notes.

pub mod mock;
pub mod openrouter;
pub mod prompt;

use async_trait::async_trait;

pub use mock::MockGenerator;
pub use openrouter::{OpenRouterConfig, OpenRouterGenerator};
pub use prompt::{Message, Prompt, PromptOptions, Role, build_travel_prompt};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeneratorError {
    /// The connector gave up waiting for the upstream service.
    #[error("request timed out")]
    Timeout,

    /// Upstream is unreachable, overloaded or refusing our credentials.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Anything else, including an empty completion.
    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait PlanGenerator: Send + Sync {
    /// Short identifier for logs (e.g. "openrouter", "mock").
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<String, GeneratorError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn PlanGenerator) {}
};
