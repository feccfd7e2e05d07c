//! Domain errors surfaced by [`crate::PlanLifecycleService`].
//!
//! Port errors ([`crate::repository::RepositoryError`],
//! [`crate::generator::GeneratorError`]) are translated into [`PlanError`]
//! at the service boundary; no storage or HTTP client type escapes it.

use std::time::Duration;

use uuid::Uuid;

use wayfarer_db::models::PLAN_TEXT_MAX_CHARS;

use crate::repository::RepositoryError;

/// Everything a lifecycle operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Also used when the note exists but belongs to someone else.
    #[error("{0}")]
    NotFound(Missing),

    #[error("{0}")]
    Conflict(String),

    #[error("AI service request timed out after {} seconds", .timeout.as_secs_f32())]
    AiServiceTimeout { timeout: Duration },

    #[error("AI service is currently unavailable: {0}")]
    AiServiceUnavailable(String),

    #[error("error occurred during plan generation for note {note_id}: {message}")]
    PlanGeneration { note_id: Uuid, message: String },

    #[error("storage failure")]
    Storage(#[source] anyhow::Error),
}

/// What a [`PlanError::NotFound`] refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Note(Uuid),
    Proposal { note_id: Uuid, generation_id: Uuid },
    ActivePlan(Uuid),
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Note(id) => write!(f, "note {id} not found"),
            Self::Proposal {
                note_id,
                generation_id,
            } => write!(
                f,
                "no pending plan with generation {generation_id} for note {note_id}"
            ),
            Self::ActivePlan(note_id) => write!(f, "note {note_id} has no active plan"),
        }
    }
}

/// Shape or length problems with caller-supplied plan content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("at least one of generation_id or plan_text must be provided")]
    MissingContent,

    #[error("plan_text must not be blank")]
    BlankText,

    #[error("plan_text is {len} characters long, the maximum is {max}")]
    TextTooLong { len: usize, max: usize },
}

impl ValidationError {
    /// Check plan text against the column limit, counting characters rather
    /// than bytes.
    pub fn check_plan_text(text: &str) -> Result<(), Self> {
        if text.trim().is_empty() {
            return Err(Self::BlankText);
        }
        let len = text.chars().count();
        if len > PLAN_TEXT_MAX_CHARS {
            return Err(Self::TextTooLong {
                len,
                max: PLAN_TEXT_MAX_CHARS,
            });
        }
        Ok(())
    }
}

impl From<RepositoryError> for PlanError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NoteNotFound(id) => Self::NotFound(Missing::Note(id)),
            RepositoryError::ProposalNotFound {
                note_id,
                generation_id,
            } => Self::NotFound(Missing::Proposal {
                note_id,
                generation_id,
            }),
            RepositoryError::ActivePlanExists(note_id) => {
                Self::Conflict(format!("note {note_id} already has an active plan"))
            }
            RepositoryError::Backend(err) => Self::Storage(err),
        }
    }
}
