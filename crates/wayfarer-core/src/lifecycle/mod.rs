//! Plan lifecycle service: generation, acceptance, hybrid merge, manual
//! creation, editing, retrieval and note deletion.
//!
//! Every operation takes the acting user explicitly and checks note
//! ownership first; a note owned by someone else is reported exactly like a
//! missing one.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wayfarer_db::models::{Note, Plan, PlanStatus};

use crate::error::{Missing, PlanError, ValidationError};
use crate::generator::{GeneratorError, PlanGenerator, PromptOptions, build_travel_prompt};
use crate::registry::{NoteRegistry, PreferenceProvider};
use crate::repository::{Activation, PlanRepository, ReplacePolicy, RepositoryError};
use crate::state::{PlanEvent, PlanStateMachine};

/// Attempts an edit makes before giving up on a contended plan.
pub const EDIT_ATTEMPTS: usize = 3;

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Hard deadline for one generator call.
    pub generation_timeout: Duration,
    /// Applied when a manual plan is created while another is active.
    pub replace_policy: ReplacePolicy,
    pub prompt: PromptOptions,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            replace_policy: ReplacePolicy::default(),
            prompt: PromptOptions::default(),
        }
    }
}

/// Body of a create-or-accept call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequest {
    #[serde(default)]
    pub generation_id: Option<Uuid>,
    #[serde(default)]
    pub plan_text: Option<String>,
}

/// What a [`PlanRequest`] asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Intent {
    Accept(Uuid),
    Hybrid(Uuid, String),
    Manual(String),
}

impl PlanRequest {
    fn into_intent(self) -> Result<Intent, ValidationError> {
        match (self.generation_id, self.plan_text) {
            (Some(generation_id), None) => Ok(Intent::Accept(generation_id)),
            (Some(generation_id), Some(text)) => {
                ValidationError::check_plan_text(&text)?;
                Ok(Intent::Hybrid(generation_id, text))
            }
            (None, Some(text)) => {
                ValidationError::check_plan_text(&text)?;
                Ok(Intent::Manual(text))
            }
            (None, None) => Err(ValidationError::MissingContent),
        }
    }
}

/// A freshly stored AI proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedProposal {
    pub generation_id: Uuid,
    pub plan_text: String,
    pub status: PlanStatus,
}

pub struct PlanLifecycleService {
    notes: Arc<dyn NoteRegistry>,
    preferences: Arc<dyn PreferenceProvider>,
    generator: Arc<dyn PlanGenerator>,
    plans: Arc<dyn PlanRepository>,
    config: LifecycleConfig,
}

impl PlanLifecycleService {
    pub fn new(
        notes: Arc<dyn NoteRegistry>,
        preferences: Arc<dyn PreferenceProvider>,
        generator: Arc<dyn PlanGenerator>,
        plans: Arc<dyn PlanRepository>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            notes,
            preferences,
            generator,
            plans,
            config,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Ask the generator for a new proposal and store it as `PENDING_AI`.
    ///
    /// Nothing is written unless generation succeeds within the deadline.
    pub async fn generate(&self, note_id: Uuid, acting_user: Uuid) -> Result<GeneratedProposal, PlanError> {
        let note = self.owned_note(note_id, acting_user).await?;
        let preferences = self
            .preferences
            .get_preferences(acting_user)
            .await
            .map_err(|e| storage_failure(note_id, e))?;

        let prompt = build_travel_prompt(&note, preferences.as_ref(), &self.config.prompt);
        let timeout = self.config.generation_timeout;

        tracing::info!(
            note_id = %note_id,
            generator = self.generator.name(),
            timeout_ms = timeout.as_millis() as u64,
            "starting plan generation"
        );

        // Dropping the generator future on expiry abandons the request.
        let outcome = tokio::time::timeout(timeout, self.generator.generate(&prompt)).await;
        let text = match outcome {
            Ok(Ok(text)) => text,
            Err(_) | Ok(Err(GeneratorError::Timeout)) => {
                tracing::warn!(note_id = %note_id, timeout_ms = timeout.as_millis() as u64, "plan generation timed out");
                return Err(PlanError::AiServiceTimeout { timeout });
            }
            Ok(Err(GeneratorError::Unavailable(message))) => {
                tracing::warn!(note_id = %note_id, %message, "AI service unavailable");
                return Err(PlanError::AiServiceUnavailable(message));
            }
            Ok(Err(GeneratorError::Failed(message))) => {
                tracing::warn!(note_id = %note_id, %message, "plan generation failed");
                return Err(PlanError::PlanGeneration { note_id, message });
            }
        };

        if let Err(invalid) = ValidationError::check_plan_text(&text) {
            tracing::warn!(note_id = %note_id, error = %invalid, "generated plan rejected");
            return Err(PlanError::PlanGeneration {
                note_id,
                message: format!("generated plan is unusable: {invalid}"),
            });
        }

        let generation_id = Uuid::new_v4();
        let plan = self
            .plans
            .insert_proposal(note_id, generation_id, &text)
            .await
            .map_err(|e| storage_failure(note_id, e))?;

        tracing::info!(
            note_id = %note_id,
            generation_id = %generation_id,
            plan_length = plan.plan_text.chars().count(),
            word_count = plan.plan_text.split_whitespace().count(),
            "plan generation succeeded"
        );

        Ok(GeneratedProposal {
            generation_id,
            plan_text: plan.plan_text,
            status: plan.status,
        })
    }

    /// Accept a proposal, derive a hybrid plan from one, or create a manual
    /// plan, depending on which fields `request` carries.
    pub async fn create_or_accept(
        &self,
        note_id: Uuid,
        acting_user: Uuid,
        request: PlanRequest,
    ) -> Result<Plan, PlanError> {
        let intent = request.into_intent()?;
        self.owned_note(note_id, acting_user).await?;

        let (activation, mode) = match intent {
            Intent::Accept(generation_id) => (Activation::accept(generation_id), "accept"),
            Intent::Hybrid(generation_id, text) => (Activation::hybrid(generation_id, text), "hybrid"),
            Intent::Manual(text) => (Activation::manual(text, self.config.replace_policy), "manual"),
        };

        let outcome = self
            .plans
            .activate(note_id, &activation)
            .await
            .map_err(|e| storage_failure(note_id, e))?;

        tracing::info!(
            note_id = %note_id,
            plan_id = %outcome.active.id,
            plan_type = %outcome.active.plan_type,
            generation_id = ?outcome.active.generation_id,
            superseded = outcome.superseded.len(),
            mode,
            "plan activated"
        );

        Ok(outcome.active)
    }

    /// Replace the text of the active plan in place.
    pub async fn edit(&self, note_id: Uuid, acting_user: Uuid, plan_text: &str) -> Result<Plan, PlanError> {
        ValidationError::check_plan_text(plan_text)?;
        self.owned_note(note_id, acting_user).await?;

        for attempt in 1..=EDIT_ATTEMPTS {
            let current = self
                .plans
                .latest_active(note_id)
                .await
                .map_err(|e| storage_failure(note_id, e))?
                .ok_or(PlanError::NotFound(Missing::ActivePlan(note_id)))?;

            PlanStateMachine::next_status(current.status, PlanEvent::Edit)
                .map_err(|e| PlanError::Conflict(e.to_string()))?;
            let new_type = PlanStateMachine::type_after_edit(current.plan_type);
            let updated = self
                .plans
                .update_active_text(current.id, current.plan_type, plan_text, new_type)
                .await
                .map_err(|e| storage_failure(note_id, e))?;

            if let Some(plan) = updated {
                tracing::info!(
                    note_id = %note_id,
                    plan_id = %plan.id,
                    from_type = %current.plan_type,
                    plan_type = %plan.plan_type,
                    "plan edited"
                );
                return Ok(plan);
            }

            tracing::warn!(
                note_id = %note_id,
                plan_id = %current.id,
                attempt,
                "active plan changed during edit, retrying"
            );
        }

        Err(PlanError::Conflict(format!(
            "active plan of note {note_id} kept changing during edit"
        )))
    }

    /// The note's active plan, or `None` when it has none yet.
    pub async fn get_active(&self, note_id: Uuid, acting_user: Uuid) -> Result<Option<Plan>, PlanError> {
        self.owned_note(note_id, acting_user).await?;
        self.plans
            .latest_active(note_id)
            .await
            .map_err(|e| storage_failure(note_id, e))
    }

    /// Delete a note and every plan attached to it.
    pub async fn delete_note(&self, note_id: Uuid, acting_user: Uuid) -> Result<(), PlanError> {
        let removed = self
            .notes
            .delete_owned_note(note_id, acting_user)
            .await
            .map_err(|e| storage_failure(note_id, e))?
            .ok_or(PlanError::NotFound(Missing::Note(note_id)))?;

        tracing::info!(note_id = %note_id, plans_removed = removed, "note deleted");
        Ok(())
    }

    async fn owned_note(&self, note_id: Uuid, acting_user: Uuid) -> Result<Note, PlanError> {
        self.notes
            .get_owned_note(note_id, acting_user)
            .await
            .map_err(|e| storage_failure(note_id, e))?
            .ok_or(PlanError::NotFound(Missing::Note(note_id)))
    }
}

fn storage_failure(note_id: Uuid, err: RepositoryError) -> PlanError {
    if let RepositoryError::Backend(inner) = &err {
        tracing::error!(note_id = %note_id, error = %format!("{inner:#}"), "storage failure");
    }
    err.into()
}
