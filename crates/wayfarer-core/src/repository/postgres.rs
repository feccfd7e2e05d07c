//! PostgreSQL adapter for the plan, note and preference ports.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use wayfarer_db::models::{Note, Plan, PlanStatus, PlanType};
use wayfarer_db::queries::plans::{self, NewPlan};
use wayfarer_db::queries::{notes, profiles};

use super::{
    Activation, ActivationOutcome, PlanRepository, ReplacePolicy, RepositoryError, check_type_change,
    superseded_status,
};
use crate::registry::{NoteRegistry, PreferenceProvider, Preferences};

/// Plan, note and profile storage backed by a [`PgPool`].
///
/// Activations run in one transaction that starts with
/// `SELECT ... FOR UPDATE` on the note row; the partial unique index
/// `plans_one_active_per_note` backs this up at the schema level.
#[derive(Debug, Clone)]
pub struct PgPlanStore {
    pool: PgPool,
}

impl PgPlanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// SQLSTATE `foreign_key_violation`.
const FOREIGN_KEY_VIOLATION: &str = "23503";

fn is_foreign_key_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .and_then(|db| db.code())
            .is_some_and(|code| code == FOREIGN_KEY_VIOLATION)
    })
}

#[async_trait]
impl PlanRepository for PgPlanStore {
    async fn insert_proposal(
        &self,
        note_id: Uuid,
        generation_id: Uuid,
        plan_text: &str,
    ) -> Result<Plan, RepositoryError> {
        let plan = plans::insert_plan(
            &self.pool,
            &NewPlan {
                note_id,
                plan_text,
                plan_type: PlanType::Ai,
                status: PlanStatus::PendingAi,
                generation_id: Some(generation_id),
            },
        )
        .await
        .map_err(|err| {
            // The note vanished between the ownership check and the insert.
            if is_foreign_key_violation(&err) {
                RepositoryError::NoteNotFound(note_id)
            } else {
                RepositoryError::Backend(err)
            }
        })?;
        Ok(plan)
    }

    async fn latest_active(&self, note_id: Uuid) -> Result<Option<Plan>, RepositoryError> {
        Ok(plans::latest_with_status(&self.pool, note_id, PlanStatus::Active).await?)
    }

    async fn find_proposal(
        &self,
        note_id: Uuid,
        generation_id: Uuid,
    ) -> Result<Option<Plan>, RepositoryError> {
        let plan =
            plans::find_by_generation(&self.pool, note_id, generation_id, PlanStatus::PendingAi, false)
                .await?;
        Ok(plan)
    }

    async fn activate(
        &self,
        note_id: Uuid,
        activation: &Activation,
    ) -> Result<ActivationOutcome, RepositoryError> {
        if !activation.is_well_formed() {
            return Err(anyhow!("activation for note {note_id} must produce exactly one active plan").into());
        }

        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        if !notes::lock_note(&mut *tx, note_id).await? {
            return Err(RepositoryError::NoteNotFound(note_id));
        }

        let proposal = match activation.proposal {
            Some(usage) => {
                let plan = plans::find_by_generation(
                    &mut *tx,
                    note_id,
                    usage.generation_id,
                    PlanStatus::PendingAi,
                    true,
                )
                .await?
                .ok_or(RepositoryError::ProposalNotFound {
                    note_id,
                    generation_id: usage.generation_id,
                })?;
                Some((plan, usage.target_status()?))
            }
            None => None,
        };

        let superseded = match activation.replace {
            ReplacePolicy::Archive => {
                plans::retire_active(&mut *tx, note_id, superseded_status()?).await?
            }
            ReplacePolicy::Reject => {
                if plans::latest_with_status(&mut *tx, note_id, PlanStatus::Active)
                    .await?
                    .is_some()
                {
                    return Err(RepositoryError::ActivePlanExists(note_id));
                }
                Vec::new()
            }
        };

        let mut active = None;

        if let Some((plan, becomes)) = proposal {
            let moved = plans::transition_plan_status(&mut *tx, plan.id, PlanStatus::PendingAi, becomes)
                .await?
                .ok_or_else(|| anyhow!("pending plan {} changed while locked", plan.id))?;
            if moved.status == PlanStatus::Active {
                active = Some(moved);
            }
        }

        if let Some(new) = &activation.insert {
            let inserted = plans::insert_plan(
                &mut *tx,
                &NewPlan {
                    note_id,
                    plan_text: &new.plan_text,
                    plan_type: new.plan_type,
                    status: PlanStatus::Active,
                    generation_id: new.generation_id,
                },
            )
            .await?;
            active = Some(inserted);
        }

        let active = active.ok_or_else(|| anyhow!("activation for note {note_id} produced no active plan"))?;

        tx.commit().await.context("failed to commit activation")?;

        debug!(
            note_id = %note_id,
            plan_id = %active.id,
            superseded = superseded.len(),
            "plan activated"
        );

        Ok(ActivationOutcome { active, superseded })
    }

    async fn update_active_text(
        &self,
        plan_id: Uuid,
        expected_type: PlanType,
        plan_text: &str,
        new_type: PlanType,
    ) -> Result<Option<Plan>, RepositoryError> {
        check_type_change(expected_type, new_type)?;
        let plan =
            plans::update_active_text(&self.pool, plan_id, expected_type, plan_text, new_type).await?;
        Ok(plan)
    }

    async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<Plan>, RepositoryError> {
        Ok(plans::list_plans_for_note(&self.pool, note_id).await?)
    }
}

#[async_trait]
impl NoteRegistry for PgPlanStore {
    async fn get_owned_note(&self, note_id: Uuid, owner_id: Uuid) -> Result<Option<Note>, RepositoryError> {
        Ok(notes::get_owned_note(&self.pool, note_id, owner_id).await?)
    }

    async fn delete_owned_note(&self, note_id: Uuid, owner_id: Uuid) -> Result<Option<u64>, RepositoryError> {
        Ok(notes::delete_note_with_plans(&self.pool, note_id, owner_id).await?)
    }
}

#[async_trait]
impl PreferenceProvider for PgPlanStore {
    async fn get_preferences(&self, user_id: Uuid) -> Result<Option<Preferences>, RepositoryError> {
        let profile = profiles::get_profile(&self.pool, user_id).await?;
        Ok(profile.map(Preferences::from))
    }
}
