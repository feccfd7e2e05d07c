//! Offline generator returning a canned itinerary.

use std::time::Duration;

use async_trait::async_trait;

use super::{GeneratorError, PlanGenerator, Prompt};

/// Sleeps for `delay`, then returns a fixed three-day plan that quotes the
/// last user message.
#[derive(Debug, Clone)]
pub struct MockGenerator {
    delay: Duration,
}

impl MockGenerator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// No delay at all.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl PlanGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, GeneratorError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let request = prompt.last_user_message().unwrap_or_default();
        Ok(canned_plan(request))
    }
}

fn canned_plan(request: &str) -> String {
    format!(
        "# Travel Plan\n\
         Based on: {request}\n\
         \n\
         ## Day 1\n\
         * Morning: Visit the main attractions\n\
         * Afternoon: Cultural exploration\n\
         * Evening: Local dining experience\n\
         \n\
         ## Day 2\n\
         * Morning: Guided tour\n\
         * Afternoon: Free time for shopping\n\
         * Evening: Entertainment\n\
         \n\
         ## Day 3\n\
         * Morning: Relaxation\n\
         * Afternoon: Museum visit\n\
         * Evening: Farewell dinner\n\
         \n\
         Travel Tips:\n\
         - Local transportation available\n\
         - Book accommodations in advance"
    )
}
