//! Plan storage port and its adapters.
//!
//! [`PlanRepository`] is the only way the lifecycle service reads or writes
//! plans. Every multi-row change goes through [`PlanRepository::activate`],
//! which adapters must apply atomically and serialized per note, so that
//! at most one plan per note is ever `ACTIVE`.

pub mod memory;
pub mod postgres;

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wayfarer_db::models::{ParseEnumError, Plan, PlanStatus, PlanType};

use crate::state::{PlanEvent, PlanStateMachine, TransitionError};

pub use memory::InMemoryStore;
pub use postgres::PgPlanStore;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("note {0} not found")]
    NoteNotFound(Uuid),

    #[error("no pending plan with generation {generation_id} for note {note_id}")]
    ProposalNotFound { note_id: Uuid, generation_id: Uuid },

    #[error("note {0} already has an active plan")]
    ActivePlanExists(Uuid),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<TransitionError> for RepositoryError {
    fn from(err: TransitionError) -> Self {
        Self::Backend(err.into())
    }
}

/// What happens to an existing `ACTIVE` plan when a new one is activated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacePolicy {
    /// Archive the current active plan.
    #[default]
    Archive,
    /// Refuse with [`RepositoryError::ActivePlanExists`].
    Reject,
}

impl ReplacePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Reject => "reject",
        }
    }
}

impl std::fmt::Display for ReplacePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplacePolicy {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "archive" => Ok(Self::Archive),
            "reject" => Ok(Self::Reject),
            other => Err(ParseEnumError {
                kind: "replace policy",
                value: other.to_owned(),
            }),
        }
    }
}

/// Consumption of a pending proposal during activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalUse {
    pub generation_id: Uuid,
    /// [`PlanEvent::Accept`] or [`PlanEvent::Absorb`].
    pub event: PlanEvent,
}

impl ProposalUse {
    /// Status the pending proposal moves to.
    pub fn target_status(&self) -> Result<PlanStatus, TransitionError> {
        PlanStateMachine::next_status(PlanStatus::PendingAi, self.event)
    }
}

/// Status an `ACTIVE` plan takes when a newer plan replaces it.
pub fn superseded_status() -> Result<PlanStatus, TransitionError> {
    PlanStateMachine::next_status(PlanStatus::Active, PlanEvent::Supersede)
}

/// Reject an edit that would change the plan type along an illegal edge.
pub fn check_type_change(from: PlanType, to: PlanType) -> Result<(), RepositoryError> {
    if PlanStateMachine::is_valid_type_change(from, to) {
        Ok(())
    } else {
        Err(anyhow::anyhow!("plan type cannot change from {from} to {to}").into())
    }
}

/// A new row inserted directly as `ACTIVE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivePlan {
    pub plan_text: String,
    pub plan_type: PlanType,
    pub generation_id: Option<Uuid>,
}

/// One atomic change that leaves exactly one `ACTIVE` plan on a note.
///
/// Applied in order:
///
/// 1. Lock the note (fails with `NoteNotFound`).
/// 2. Lock the pending proposal named by `proposal` (fails with
///    `ProposalNotFound`).
/// 3. Apply `replace` to the current active plan.
/// 4. Move the proposal to [`ProposalUse::target_status`].
/// 5. Insert `insert` as `ACTIVE`.
///
/// Exactly one of "proposal becomes `ACTIVE`" and "`insert` is present"
/// must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub proposal: Option<ProposalUse>,
    pub insert: Option<NewActivePlan>,
    pub replace: ReplacePolicy,
}

impl Activation {
    /// Promote a pending proposal as-is.
    pub fn accept(generation_id: Uuid) -> Self {
        Self {
            proposal: Some(ProposalUse {
                generation_id,
                event: PlanEvent::Accept,
            }),
            insert: None,
            replace: ReplacePolicy::Archive,
        }
    }

    /// Archive a pending proposal and activate user-edited text in its place.
    pub fn hybrid(generation_id: Uuid, plan_text: String) -> Self {
        Self {
            proposal: Some(ProposalUse {
                generation_id,
                event: PlanEvent::Absorb,
            }),
            insert: Some(NewActivePlan {
                plan_text,
                plan_type: PlanType::Hybrid,
                generation_id: Some(generation_id),
            }),
            replace: ReplacePolicy::Archive,
        }
    }

    pub fn manual(plan_text: String, replace: ReplacePolicy) -> Self {
        Self {
            proposal: None,
            insert: Some(NewActivePlan {
                plan_text,
                plan_type: PlanType::Manual,
                generation_id: None,
            }),
            replace,
        }
    }

    /// Check the "exactly one activated row" rule.
    pub fn is_well_formed(&self) -> bool {
        let promotes = self
            .proposal
            .is_some_and(|p| p.target_status() == Ok(PlanStatus::Active));
        promotes != self.insert.is_some()
    }
}

/// Result of a successful [`PlanRepository::activate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationOutcome {
    /// The plan that is now `ACTIVE`.
    pub active: Plan,
    /// Plans archived because they were superseded.
    pub superseded: Vec<Uuid>,
}

/// Persistence port for plans.
///
/// Adapters must make [`Self::activate`] atomic and serialized per note;
/// [`Self::update_active_text`] is an optimistic compare-and-swap.
#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Store a fresh `PENDING_AI` proposal.
    async fn insert_proposal(
        &self,
        note_id: Uuid,
        generation_id: Uuid,
        plan_text: &str,
    ) -> Result<Plan, RepositoryError>;

    /// Most recently updated `ACTIVE` plan of a note.
    async fn latest_active(&self, note_id: Uuid) -> Result<Option<Plan>, RepositoryError>;

    /// The `PENDING_AI` plan of `note_id` carrying `generation_id`.
    async fn find_proposal(
        &self,
        note_id: Uuid,
        generation_id: Uuid,
    ) -> Result<Option<Plan>, RepositoryError>;

    async fn activate(
        &self,
        note_id: Uuid,
        activation: &Activation,
    ) -> Result<ActivationOutcome, RepositoryError>;

    /// Replace the text of plan `plan_id` if it is still `ACTIVE` with type
    /// `expected_type`. Returns `None` when the row no longer matches.
    async fn update_active_text(
        &self,
        plan_id: Uuid,
        expected_type: PlanType,
        plan_text: &str,
        new_type: PlanType,
    ) -> Result<Option<Plan>, RepositoryError>;

    /// All plans of a note, newest first.
    async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<Plan>, RepositoryError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn PlanRepository) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_are_well_formed() {
        let g = Uuid::new_v4();
        assert!(Activation::accept(g).is_well_formed());
        assert!(Activation::hybrid(g, "text".into()).is_well_formed());
        assert!(Activation::manual("text".into(), ReplacePolicy::Reject).is_well_formed());
    }

    #[test]
    fn activation_needs_exactly_one_active_row() {
        let g = Uuid::new_v4();
        let mut both = Activation::accept(g);
        both.insert = Some(NewActivePlan {
            plan_text: "x".into(),
            plan_type: PlanType::Manual,
            generation_id: None,
        });
        assert!(!both.is_well_formed());

        let neither = Activation {
            proposal: Some(ProposalUse {
                generation_id: g,
                event: PlanEvent::Absorb,
            }),
            insert: None,
            replace: ReplacePolicy::Archive,
        };
        assert!(!neither.is_well_formed());
    }

    #[test]
    fn hybrid_keeps_generation_id() {
        let g = Uuid::new_v4();
        let activation = Activation::hybrid(g, "edited".into());
        let insert = activation.insert.unwrap();
        assert_eq!(insert.plan_type, PlanType::Hybrid);
        assert_eq!(insert.generation_id, Some(g));
        assert_eq!(activation.proposal.unwrap().target_status(), Ok(PlanStatus::Archived));
    }

    #[test]
    fn proposal_targets_come_from_the_state_machine() {
        let g = Uuid::new_v4();
        assert_eq!(
            Activation::accept(g).proposal.unwrap().target_status(),
            Ok(PlanStatus::Active)
        );
        assert_eq!(superseded_status(), Ok(PlanStatus::Archived));

        // A proposal cannot be superseded or edited; it is not active yet.
        let odd = ProposalUse {
            generation_id: g,
            event: PlanEvent::Edit,
        };
        assert!(odd.target_status().is_err());
        let misuse = Activation {
            proposal: Some(odd),
            insert: None,
            replace: ReplacePolicy::Archive,
        };
        assert!(!misuse.is_well_formed());
    }

    #[test]
    fn type_changes_are_checked() {
        assert!(check_type_change(PlanType::Ai, PlanType::Hybrid).is_ok());
        assert!(check_type_change(PlanType::Manual, PlanType::Manual).is_ok());
        assert!(matches!(
            check_type_change(PlanType::Hybrid, PlanType::Ai),
            Err(RepositoryError::Backend(_))
        ));
        assert!(check_type_change(PlanType::Manual, PlanType::Hybrid).is_err());
    }

    #[test]
    fn replace_policy_parses() {
        assert_eq!("archive".parse::<ReplacePolicy>().unwrap(), ReplacePolicy::Archive);
        assert_eq!("reject".parse::<ReplacePolicy>().unwrap(), ReplacePolicy::Reject);
        assert!("replace".parse::<ReplacePolicy>().is_err());
        assert_eq!(ReplacePolicy::default(), ReplacePolicy::Archive);
        assert_eq!(ReplacePolicy::Reject.to_string(), "reject");
    }
}
