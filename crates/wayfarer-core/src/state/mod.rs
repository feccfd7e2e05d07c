//! Plan state machine.
//!
//! Pure transition rules for plan status and plan type. The storage
//! adapters apply these with optimistic `UPDATE ... WHERE status = $from`
//! statements; nothing here touches the database.

use wayfarer_db::models::{PlanStatus, PlanType};

/// Something that happens to a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanEvent {
    /// The user accepted a pending proposal as-is.
    Accept,
    /// A pending proposal was used as the basis of a hybrid plan.
    Absorb,
    /// A newer plan became active for the same note.
    Supersede,
    /// The user rewrote the text of the active plan.
    Edit,
}

impl std::fmt::Display for PlanEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Accept => "accept",
            Self::Absorb => "absorb",
            Self::Supersede => "supersede",
            Self::Edit => "edit",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {event} a plan in status {from}")]
pub struct TransitionError {
    pub from: PlanStatus,
    pub event: PlanEvent,
}

/// The plan state machine.
///
/// Status graph:
///
/// ```text
/// PENDING_AI -> ACTIVE    (accept)
/// PENDING_AI -> ARCHIVED  (absorb into a hybrid plan)
/// ACTIVE     -> ARCHIVED  (superseded)
/// ACTIVE     -> ACTIVE    (edit)
/// ```
///
/// `ARCHIVED` is terminal. Type changes only ever go `AI -> HYBRID`, on edit.
pub struct PlanStateMachine;

impl PlanStateMachine {
    pub fn is_valid_transition(from: PlanStatus, to: PlanStatus) -> bool {
        matches!(
            (from, to),
            (PlanStatus::PendingAi, PlanStatus::Active)
                | (PlanStatus::PendingAi, PlanStatus::Archived)
                | (PlanStatus::Active, PlanStatus::Archived)
                | (PlanStatus::Active, PlanStatus::Active)
        )
    }

    /// Status a plan ends up in after `event`.
    pub fn next_status(from: PlanStatus, event: PlanEvent) -> Result<PlanStatus, TransitionError> {
        let to = match (from, event) {
            (PlanStatus::PendingAi, PlanEvent::Accept) => PlanStatus::Active,
            (PlanStatus::PendingAi, PlanEvent::Absorb) => PlanStatus::Archived,
            (PlanStatus::Active, PlanEvent::Supersede) => PlanStatus::Archived,
            (PlanStatus::Active, PlanEvent::Edit) => PlanStatus::Active,
            _ => return Err(TransitionError { from, event }),
        };
        debug_assert!(Self::is_valid_transition(from, to));
        Ok(to)
    }

    /// Type a plan takes after its text is edited by the user.
    pub fn type_after_edit(current: PlanType) -> PlanType {
        match current {
            PlanType::Ai => PlanType::Hybrid,
            other => other,
        }
    }

    /// Whether a stored plan may change type from `from` to `to`.
    pub fn is_valid_type_change(from: PlanType, to: PlanType) -> bool {
        from == to || (from == PlanType::Ai && to == PlanType::Hybrid)
    }
}
